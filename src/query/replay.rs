//! Sequential replay of one hourly file
//!
//! Each replay builds a dictionary private to the file from its `StringId`
//! records as they are encountered, then decodes `Observation` records
//! against it. `Open` records are skipped.

use crate::data::Observation;
use crate::storage::{
    decode_observation, IntObservation, IntString, RecordError, RecordKind, RecordReader,
    StoreError, StringIdMap,
};
use std::fs::File;
use std::io::BufReader;
use std::ops::ControlFlow;
use std::path::Path;

/// How to treat a record cut off by end of file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailPolicy {
    /// Truncation is corruption
    Strict,
    /// Truncation is where the writer has got to; stop there
    TolerateTruncated,
}

/// Replay `path`, handing every observation to `visitor` in file order until
/// it breaks or the file ends.
pub fn iterate_record_file<F>(path: &Path, tail: TailPolicy, mut visitor: F) -> Result<(), StoreError>
where
    F: FnMut(Observation) -> ControlFlow<()>,
{
    let file = File::open(path)?;
    let mut dictionary = StringIdMap::new();

    for record in RecordReader::new(BufReader::new(file)) {
        let record = match record {
            Ok(record) => record,
            Err(RecordError::Truncated(what)) if tail == TailPolicy::TolerateTruncated => {
                tracing::debug!(path = %path.display(), what, "stopping at truncated tail");
                break;
            }
            Err(e) => return Err(e.into()),
        };

        match record.kind {
            RecordKind::StringId => {
                dictionary.append(IntString::from_bytes(&record.payload)?)?;
            }
            RecordKind::Observation => {
                let encoded = IntObservation::from_bytes(&record.payload)?;
                let obs = decode_observation(&encoded, &dictionary)?;
                if visitor(obs).is_break() {
                    break;
                }
            }
            RecordKind::Open => {}
        }
    }

    Ok(())
}
