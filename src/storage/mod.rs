//! Persistent observation store
//!
//! Observations are appended to one file per UTC hour. Each file carries its
//! own string dictionary, so any file can be replayed on its own.

pub mod active;
pub mod config;
pub mod dictionary;
pub mod encoding;
pub mod engine;
pub mod files;
pub mod record;
pub mod varint;
pub mod writer;

pub use active::{ActiveFileInfo, HourlyFileManager, WriteFile};
pub use config::StoreConfig;
pub use dictionary::{DictionaryError, IntString, Interned, StringIdMap};
pub use encoding::{
    decode_observation, encode_observation, CodecError, DecodeError, IntObservation, PersistSink,
};
pub use engine::ObservationStore;
pub use files::{all_record_files, record_file_name, record_files_between, start_of_hour};
pub use record::{read_record, write_record, Record, RecordError, RecordKind, RecordReader};
pub use writer::{system_clock, Clock, ObservationWriter};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Dictionary error: {0}")]
    Dictionary(#[from] DictionaryError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("{} is not a file", .0.display())]
    NotAFile(PathBuf),
}
