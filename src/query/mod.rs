//! Read path: replaying hourly files into filtered, ordered listings

pub mod aggregates;
pub mod executor;
pub mod replay;

pub use aggregates::{
    aggregate, aggregate_observations, AggregateOptions, AggregatedObservation, JobSummary,
};
pub use executor::{
    clamp_window, list_observations, ListOptions, ObservationFilter, TimeWindow, DEFAULT_LIMIT,
};
pub use replay::{iterate_record_file, TailPolicy};

use crate::storage::StoreError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Replaying {} failed: {source}", .path.display())]
    Replay {
        path: PathBuf,
        #[source]
        source: StoreError,
    },
}
