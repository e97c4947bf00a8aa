//! Record framing for observation files
//!
//! A file is a plain concatenation of records:
//!
//! ```text
//! +--------+----------------+-------------------+
//! | marker | length (u16 LE)| payload (length)  |
//! +--------+----------------+-------------------+
//! ```
//!
//! There is no header or trailer. End of stream exactly at a record boundary
//! is the normal end of data; end of stream inside a record is truncation.

use std::io::{self, Read, Write};

/// Largest payload a record can carry
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Record kind, stored as the marker byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordKind {
    /// Dictionary entry
    StringId = 1,
    /// Encoded observation
    Observation = 2,
    /// Diagnostic marker written on every open, ignored on replay
    Open = 127,
}

impl RecordKind {
    pub fn marker(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for RecordKind {
    type Error = RecordError;

    fn try_from(marker: u8) -> Result<Self, Self::Error> {
        match marker {
            1 => Ok(RecordKind::StringId),
            2 => Ok(RecordKind::Observation),
            127 => Ok(RecordKind::Open),
            other => Err(RecordError::UnknownMarker(other)),
        }
    }
}

/// One framed unit read from a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub kind: RecordKind,
    pub payload: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Payload of {0} bytes exceeds the record limit of 65535")]
    PayloadTooLarge(usize),

    #[error("Unknown record marker {0}")]
    UnknownMarker(u8),

    #[error("Truncated record: {0}")]
    Truncated(&'static str),
}

/// Write one record. The frame is assembled first and emitted with a single
/// `write_all` so append-mode readers rarely observe a partial record.
pub fn write_record<W: Write + ?Sized>(w: &mut W, kind: RecordKind, payload: &[u8]) -> Result<(), RecordError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(RecordError::PayloadTooLarge(payload.len()));
    }

    let mut frame = Vec::with_capacity(3 + payload.len());
    frame.push(kind.marker());
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(payload);

    w.write_all(&frame)?;
    Ok(())
}

/// Read one record. Returns `Ok(None)` when the stream ends before a marker byte.
pub fn read_record<R: Read>(r: &mut R) -> Result<Option<Record>, RecordError> {
    let mut marker = [0u8; 1];
    loop {
        match r.read(&mut marker) {
            Ok(0) => return Ok(None),
            Ok(_) => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    let kind = RecordKind::try_from(marker[0])?;

    let mut length = [0u8; 2];
    read_exact_or_truncated(r, &mut length, "missing length")?;

    let mut payload = vec![0u8; u16::from_le_bytes(length) as usize];
    read_exact_or_truncated(r, &mut payload, "incomplete payload")?;

    Ok(Some(Record { kind, payload }))
}

fn read_exact_or_truncated<R: Read>(r: &mut R, buf: &mut [u8], what: &'static str) -> Result<(), RecordError> {
    r.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => RecordError::Truncated(what),
        _ => RecordError::Io(e),
    })
}

/// Iterator over the records of a stream, ending at the first clean end of data.
/// After an error the iterator is exhausted.
pub struct RecordReader<R> {
    inner: R,
    done: bool,
}

impl<R: Read> RecordReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, done: false }
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<Record, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match read_record(&mut self.inner) {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
