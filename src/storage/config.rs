use std::path::{Path, PathBuf};
use std::time::Duration;

/// Observation store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the hourly files
    pub directory: PathBuf,
    /// File name prefix, e.g. `observations` for `observations-2024-05-01-10.records`
    pub prefix: String,
    /// How many hours of files to keep (values below 1 mean 1)
    pub retention_hours: i64,
    /// Interval between durability flushes of the active file
    pub sync_interval: Duration,
    /// Capacity of the writer inbox
    pub inbox_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./records"),
            prefix: "observations".to_string(),
            retention_hours: 24,
            sync_interval: Duration::from_secs(5),
            inbox_capacity: 100,
        }
    }
}

impl StoreConfig {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Create config from environment variables
    /// PROBESTORE_DIR=/var/lib/probestore
    /// PROBESTORE_PREFIX=observations
    /// PROBESTORE_RETENTION_HOURS=24
    /// PROBESTORE_SYNC_INTERVAL_SECS=5
    /// PROBESTORE_INBOX_CAPACITY=100
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            directory: std::env::var("PROBESTORE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.directory),
            prefix: std::env::var("PROBESTORE_PREFIX").unwrap_or(defaults.prefix),
            retention_hours: std::env::var("PROBESTORE_RETENTION_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.retention_hours),
            sync_interval: std::env::var("PROBESTORE_SYNC_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.sync_interval),
            inbox_capacity: std::env::var("PROBESTORE_INBOX_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.inbox_capacity),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_retention_hours(mut self, hours: i64) -> Self {
        self.retention_hours = hours;
        self
    }

    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    pub fn with_inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = capacity;
        self
    }

    /// Retention window with the one-hour floor applied
    pub fn effective_retention_hours(&self) -> i64 {
        self.retention_hours.max(1)
    }
}
