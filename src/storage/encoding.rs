//! Compact, dictionary-keyed encoding of observations
//!
//! Strings are replaced by [`StringIdMap`] keys. Any key created while
//! encoding is handed to a [`PersistSink`] before the encoded observation is
//! returned, so a file replayed front to back always defines a key before the
//! first observation that uses it.

use super::dictionary::{DictionaryError, IntString, Interned, StringIdMap};
use super::record::{write_record, RecordError, RecordKind};
use super::varint::{put_uvarint, put_varint, PayloadReader};
use crate::data::Observation;
use chrono::{DateTime, Utc};
use std::time::Duration;

const FLAG_OK: u8 = 0b01;
const FLAG_DURATION: u8 = 0b10;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Payload ended early")]
    Truncated,

    #[error("Varint does not fit its target type")]
    VarintOverflow,

    #[error("String field is not valid UTF-8")]
    InvalidUtf8,

    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),

    #[error("Unknown observation flags {0:#04x}")]
    UnknownFlags(u8),

    #[error("Timestamp out of range")]
    TimestampOutOfRange,
}

/// Destination for dictionary entries created during encoding
pub trait PersistSink {
    fn persist(&mut self, entry: &IntString) -> Result<(), RecordError>;
}

impl PersistSink for std::fs::File {
    fn persist(&mut self, entry: &IntString) -> Result<(), RecordError> {
        write_record(self, RecordKind::StringId, &entry.to_bytes())
    }
}

impl PersistSink for Vec<u8> {
    fn persist(&mut self, entry: &IntString) -> Result<(), RecordError> {
        write_record(self, RecordKind::StringId, &entry.to_bytes())
    }
}

/// Dictionary-keyed counterpart of [`Observation`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntObservation {
    pub timestamp_secs: i64,
    pub timestamp_nanos: u32,
    pub duration: Option<Duration>,
    pub ok: bool,
    pub job_id: u64,
    pub src_host: u64,
    pub dest_host: u64,
    pub result: u64,
}

impl IntObservation {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(24);

        let mut flags = 0u8;
        if self.ok {
            flags |= FLAG_OK;
        }
        if self.duration.is_some() {
            flags |= FLAG_DURATION;
        }
        out.push(flags);

        put_varint(&mut out, self.timestamp_secs);
        put_uvarint(&mut out, self.timestamp_nanos as u64);
        if let Some(duration) = self.duration {
            put_uvarint(&mut out, duration.as_secs());
            put_uvarint(&mut out, duration.subsec_nanos() as u64);
        }

        put_uvarint(&mut out, self.job_id);
        put_uvarint(&mut out, self.src_host);
        put_uvarint(&mut out, self.dest_host);
        put_uvarint(&mut out, self.result);
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, CodecError> {
        let mut reader = PayloadReader::new(data);

        let flags = reader.u8()?;
        if flags & !(FLAG_OK | FLAG_DURATION) != 0 {
            return Err(CodecError::UnknownFlags(flags));
        }

        let timestamp_secs = reader.varint()?;
        let timestamp_nanos = reader.u32()?;
        let duration = if flags & FLAG_DURATION != 0 {
            let secs = reader.uvarint()?;
            let nanos = reader.u32()?;
            if nanos >= 1_000_000_000 {
                return Err(CodecError::VarintOverflow);
            }
            Some(Duration::new(secs, nanos))
        } else {
            None
        };

        let obs = Self {
            timestamp_secs,
            timestamp_nanos,
            duration,
            ok: flags & FLAG_OK != 0,
            job_id: reader.uvarint()?,
            src_host: reader.uvarint()?,
            dest_host: reader.uvarint()?,
            result: reader.uvarint()?,
        };
        reader.finish()?;
        Ok(obs)
    }

    pub fn timestamp(&self) -> Result<DateTime<Utc>, CodecError> {
        DateTime::from_timestamp(self.timestamp_secs, self.timestamp_nanos)
            .ok_or(CodecError::TimestampOutOfRange)
    }
}

/// Encode an observation, persisting new dictionary entries through `sink`.
/// If persisting fails, every key assigned by this call is rolled back.
pub fn encode_observation<S: PersistSink + ?Sized>(
    obs: &Observation,
    dictionary: &mut StringIdMap,
    sink: &mut S,
) -> Result<IntObservation, RecordError> {
    let checkpoint = dictionary.checkpoint();
    let result = encode_with(obs, dictionary, sink);
    if result.is_err() {
        dictionary.rollback(checkpoint);
    }
    result
}

fn encode_with<S: PersistSink + ?Sized>(
    obs: &Observation,
    dictionary: &mut StringIdMap,
    sink: &mut S,
) -> Result<IntObservation, RecordError> {
    let mut intern = |value: &str| -> Result<u64, RecordError> {
        match dictionary.lookup_or_assign(value) {
            Interned::Existing(key) => Ok(key),
            Interned::Created(entry) => {
                sink.persist(&entry)?;
                Ok(entry.key)
            }
        }
    };

    Ok(IntObservation {
        timestamp_secs: obs.timestamp.timestamp(),
        timestamp_nanos: obs.timestamp.timestamp_subsec_nanos(),
        duration: obs.duration,
        ok: obs.ok,
        job_id: intern(&obs.job_id)?,
        src_host: intern(&obs.src_host)?,
        dest_host: intern(&obs.dest_host)?,
        result: intern(&obs.result)?,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error(transparent)]
    Dictionary(#[from] DictionaryError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Resolve every key of an encoded observation against `dictionary`
pub fn decode_observation(
    obs: &IntObservation,
    dictionary: &StringIdMap,
) -> Result<Observation, DecodeError> {
    Ok(Observation {
        timestamp: obs.timestamp()?,
        duration: obs.duration,
        ok: obs.ok,
        job_id: dictionary.resolve(obs.job_id)?.to_string(),
        src_host: dictionary.resolve(obs.src_host)?.to_string(),
        dest_host: dictionary.resolve(obs.dest_host)?.to_string(),
        result: dictionary.resolve(obs.result)?.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::record::{read_record, Record};
    use chrono::TimeZone;
    use std::io::Cursor;

    /// Collects persisted entries in memory
    #[derive(Default)]
    struct CollectingSink {
        entries: Vec<IntString>,
    }

    impl PersistSink for CollectingSink {
        fn persist(&mut self, entry: &IntString) -> Result<(), RecordError> {
            self.entries.push(entry.clone());
            Ok(())
        }
    }

    struct FailingSink;

    impl PersistSink for FailingSink {
        fn persist(&mut self, _entry: &IntString) -> Result<(), RecordError> {
            Err(RecordError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )))
        }
    }

    fn sample() -> Observation {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 10, 15, 30).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        Observation::new(ts, "tcp-n2n", "node-a", "node-b", false)
            .with_duration(Duration::new(2, 5_000_000))
            .with_result("dial tcp: i/o timeout")
    }

    #[test]
    fn test_roundtrip_through_bytes() {
        let obs = sample();
        let mut dict = StringIdMap::new();
        let mut sink = CollectingSink::default();

        let encoded = encode_observation(&obs, &mut dict, &mut sink).unwrap();
        let bytes = encoded.to_bytes();
        let parsed = IntObservation::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, encoded);

        let decoded = decode_observation(&parsed, &dict).unwrap();
        assert_eq!(decoded, obs);
    }

    #[test]
    fn test_new_keys_are_persisted_once() {
        let mut dict = StringIdMap::new();
        let mut sink = CollectingSink::default();

        let first = sample();
        encode_observation(&first, &mut dict, &mut sink).unwrap();
        assert_eq!(sink.entries.len(), 4);

        let mut second = sample();
        second.dest_host = "node-c".to_string();
        second.result = String::new();
        encode_observation(&second, &mut dict, &mut sink).unwrap();

        assert_eq!(sink.entries.len(), 5);
        assert_eq!(sink.entries[4], IntString::new(5, "node-c"));
    }

    #[test]
    fn test_entries_precede_observation_in_stream() {
        let mut dict = StringIdMap::new();
        let mut stream: Vec<u8> = Vec::new();

        let encoded = encode_observation(&sample(), &mut dict, &mut stream).unwrap();
        write_record(&mut stream, RecordKind::Observation, &encoded.to_bytes()).unwrap();

        // Replaying in order resolves everything with a fresh dictionary
        let mut replay = StringIdMap::new();
        let mut cursor = Cursor::new(stream);
        let mut decoded = Vec::new();
        while let Some(Record { kind, payload }) = read_record(&mut cursor).unwrap() {
            match kind {
                RecordKind::StringId => replay.append(IntString::from_bytes(&payload).unwrap()).unwrap(),
                RecordKind::Observation => {
                    let obs = IntObservation::from_bytes(&payload).unwrap();
                    decoded.push(decode_observation(&obs, &replay).unwrap());
                }
                RecordKind::Open => {}
            }
        }
        assert_eq!(decoded, vec![sample()]);
    }

    #[test]
    fn test_sink_failure_propagates() {
        let mut dict = StringIdMap::new();
        let result = encode_observation(&sample(), &mut dict, &mut FailingSink);
        assert!(matches!(result, Err(RecordError::Io(_))));
    }

    /// Fails the first `failures` persists, then appends to `bytes`
    struct FlakySink {
        failures: usize,
        bytes: Vec<u8>,
    }

    impl PersistSink for FlakySink {
        fn persist(&mut self, entry: &IntString) -> Result<(), RecordError> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(RecordError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )));
            }
            self.bytes.persist(entry)
        }
    }

    fn replay(stream: Vec<u8>) -> Result<Vec<Observation>, DecodeError> {
        let mut dict = StringIdMap::new();
        let mut cursor = Cursor::new(stream);
        let mut decoded = Vec::new();
        while let Some(Record { kind, payload }) = read_record(&mut cursor).unwrap() {
            match kind {
                RecordKind::StringId => dict.append(IntString::from_bytes(&payload)?)?,
                RecordKind::Observation => {
                    let obs = IntObservation::from_bytes(&payload)?;
                    decoded.push(decode_observation(&obs, &dict)?);
                }
                RecordKind::Open => {}
            }
        }
        Ok(decoded)
    }

    #[test]
    fn test_failed_persist_does_not_leak_keys() {
        let obs = sample();
        let mut dict = StringIdMap::new();
        let mut sink = FlakySink {
            failures: 1,
            bytes: Vec::new(),
        };

        assert!(encode_observation(&obs, &mut dict, &mut sink).is_err());
        assert!(dict.is_empty());

        // Both retries must define every key they reference
        for _ in 0..2 {
            let encoded = encode_observation(&obs, &mut dict, &mut sink).unwrap();
            write_record(&mut sink.bytes, RecordKind::Observation, &encoded.to_bytes()).unwrap();
        }

        assert_eq!(replay(sink.bytes).unwrap(), vec![obs.clone(), obs]);
    }

    #[test]
    fn test_failure_after_partial_persist_reassigns() {
        let obs = sample();
        let mut dict = StringIdMap::new();
        let mut stream = Vec::new();

        // Job entry reaches the stream, then the source entry fails
        struct FailSecond<'a> {
            calls: usize,
            bytes: &'a mut Vec<u8>,
        }
        impl PersistSink for FailSecond<'_> {
            fn persist(&mut self, entry: &IntString) -> Result<(), RecordError> {
                self.calls += 1;
                if self.calls == 2 {
                    return Err(RecordError::Io(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "short write",
                    )));
                }
                self.bytes.persist(entry)
            }
        }

        let mut failing = FailSecond {
            calls: 0,
            bytes: &mut stream,
        };
        assert!(encode_observation(&obs, &mut dict, &mut failing).is_err());
        assert!(dict.is_empty());

        let encoded = encode_observation(&obs, &mut dict, &mut stream).unwrap();
        write_record(&mut stream, RecordKind::Observation, &encoded.to_bytes()).unwrap();

        // The job entry appears twice with the same key; replay accepts it
        assert_eq!(replay(stream).unwrap(), vec![obs]);
    }

    #[test]
    fn test_decode_unknown_key() {
        let mut dict = StringIdMap::new();
        let mut sink = CollectingSink::default();
        let encoded = encode_observation(&sample(), &mut dict, &mut sink).unwrap();

        let empty = StringIdMap::new();
        assert!(matches!(
            decode_observation(&encoded, &empty),
            Err(DecodeError::Dictionary(DictionaryError::UnknownKey(1)))
        ));
    }

    #[test]
    fn test_no_duration_and_pre_epoch() {
        let ts = Utc.with_ymd_and_hms(1969, 12, 31, 23, 59, 59).unwrap();
        let obs = Observation::new(ts, "j", "", "b", true);
        let mut dict = StringIdMap::new();
        let mut sink = CollectingSink::default();

        let encoded = encode_observation(&obs, &mut dict, &mut sink).unwrap();
        assert_eq!(encoded.src_host, 0);
        let parsed = IntObservation::from_bytes(&encoded.to_bytes()).unwrap();
        assert_eq!(decode_observation(&parsed, &dict).unwrap(), obs);
    }

    #[test]
    fn test_rejects_bad_payloads() {
        assert!(matches!(
            IntObservation::from_bytes(&[]),
            Err(CodecError::Truncated)
        ));
        assert!(matches!(
            IntObservation::from_bytes(&[0x80]),
            Err(CodecError::UnknownFlags(0x80))
        ));

        let mut bytes = IntObservation {
            timestamp_secs: 1,
            timestamp_nanos: 0,
            duration: None,
            ok: true,
            job_id: 1,
            src_host: 2,
            dest_host: 3,
            result: 0,
        }
        .to_bytes();
        bytes.push(0);
        assert!(matches!(
            IntObservation::from_bytes(&bytes),
            Err(CodecError::TrailingBytes(1))
        ));
    }
}
