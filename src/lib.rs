//! probestore: persistent store for network probe observations
//!
//! Probe results are appended by a single background writer to one file per
//! UTC hour. Each file is self-describing: strings are interned into a
//! per-file dictionary whose entries are written ahead of the observations
//! that use them. Old files are removed by a retention sweep, and queries
//! replay the files of a time window with optional filters.
//!
//! # Example
//!
//! ```no_run
//! use probestore::data::Observation;
//! use probestore::query::ListOptions;
//! use probestore::storage::{ObservationStore, StoreConfig};
//! use chrono::{Duration, Utc};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = ObservationStore::open(StoreConfig::new("/var/lib/probestore"))?;
//!
//! store
//!     .submit(Observation::new(Utc::now(), "tcp-n2api-ext", "node-a", "api.example", true))
//!     .await;
//! store.stop().await;
//!
//! let recent = store.list_observations(&ListOptions::since(Utc::now() - Duration::hours(1)))?;
//! for obs in recent {
//!     println!("{}", obs);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod compaction;
pub mod data;
pub mod query;
pub mod storage;

// Re-export commonly used types
pub use data::Observation;
pub use query::{ListOptions, QueryError};
pub use storage::{ObservationStore, StoreConfig, StoreError};
