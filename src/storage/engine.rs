use super::active::ActiveFileInfo;
use super::writer::{system_clock, Clock, ObservationWriter};
use super::{StoreConfig, StoreError};
use crate::data::Observation;
use crate::query::{
    aggregate_observations, list_observations, AggregateOptions, AggregatedObservation,
    ListOptions, QueryError,
};

/// The observation store: one background writer plus on-demand queries
/// over the same directory.
pub struct ObservationStore {
    config: StoreConfig,
    clock: Clock,
    writer: ObservationWriter,
}

impl ObservationStore {
    /// Open the store and start its writer. Must be called inside a tokio runtime.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        Self::open_with_clock(config, system_clock())
    }

    pub fn open_with_clock(config: StoreConfig, clock: Clock) -> Result<Self, StoreError> {
        let writer = ObservationWriter::start_with_clock(&config, clock.clone())?;
        Ok(Self {
            config,
            clock,
            writer,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub async fn submit(&self, obs: Observation) {
        self.writer.submit(obs).await;
    }

    pub fn blocking_submit(&self, obs: Observation) {
        self.writer.blocking_submit(obs);
    }

    /// Snapshot of the file currently being written
    pub fn active_file(&self) -> Option<ActiveFileInfo> {
        self.writer.active_file()
    }

    /// Blocking; call from a blocking context when inside the runtime.
    pub fn list_observations(&self, options: &ListOptions) -> Result<Vec<Observation>, QueryError> {
        list_observations(&self.config.directory, &self.config.prefix, options, (self.clock)())
    }

    /// Blocking, like [`list_observations`](Self::list_observations).
    pub fn aggregated_observations(
        &self,
        options: &AggregateOptions,
    ) -> Result<Vec<AggregatedObservation>, QueryError> {
        aggregate_observations(&self.config.directory, &self.config.prefix, options, (self.clock)())
    }

    /// Drain and stop the writer
    pub async fn stop(&self) {
        self.writer.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
    }

    fn store_at(dir: &TempDir, start: DateTime<Utc>) -> (Arc<Mutex<DateTime<Utc>>>, ObservationStore) {
        let now = Arc::new(Mutex::new(start));
        let handle = Arc::clone(&now);
        let config = StoreConfig::new(dir.path())
            .with_prefix("obs")
            .with_retention_hours(24 * 365 * 100);
        let store = ObservationStore::open_with_clock(config, Arc::new(move || *handle.lock())).unwrap();
        (now, store)
    }

    async fn wait_until_written(store: &ObservationStore) {
        for _ in 0..100 {
            if store.active_file().is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_rotation_then_query_returns_all() {
        let dir = TempDir::new().unwrap();
        let (now, store) = store_at(&dir, at(10, 0));

        let first = Observation::new(at(10, 0), "ping", "a", "b", true)
            .with_duration(std::time::Duration::from_millis(12));
        let second = Observation::new(at(10, 30), "ping", "a", "b", false).with_result("timeout");
        let third = Observation::new(at(11, 30), "http", "a", "c", true);

        store.submit(first.clone()).await;
        wait_until_written(&store).await;
        *now.lock() = at(10, 30);
        store.submit(second.clone()).await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        *now.lock() = at(11, 30);
        store.submit(third.clone()).await;
        store.stop().await;

        let mut files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        files.sort();
        assert_eq!(files, vec!["obs-2024-05-01-10.records", "obs-2024-05-01-11.records"]);

        *now.lock() = at(12, 0);
        let options = ListOptions::since(at(9, 0));
        let listed = store.list_observations(&options).unwrap();
        assert_eq!(listed, vec![first, second, third]);

        let failures = store.list_observations(&options.clone().failures_only()).unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].result, "timeout");
    }

    #[tokio::test]
    async fn test_restart_appends_to_same_hour() {
        let dir = TempDir::new().unwrap();
        {
            let (_now, store) = store_at(&dir, at(10, 5));
            store.submit(Observation::new(at(10, 5), "ping", "a", "b", true)).await;
            store.stop().await;
        }

        let (_now, store) = store_at(&dir, at(10, 40));
        store.submit(Observation::new(at(10, 40), "ping", "a", "b", true)).await;
        store.stop().await;

        let listed = store
            .list_observations(&ListOptions::since(at(10, 40) - Duration::hours(1)))
            .unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn test_aggregated_through_store() {
        let dir = TempDir::new().unwrap();
        let (_now, store) = store_at(&dir, at(10, 10));
        for ok in [true, true, false] {
            store.submit(Observation::new(at(10, 10), "ping", "a", "b", ok)).await;
        }
        store.stop().await;

        let aggregated = store
            .aggregated_observations(&AggregateOptions::new(ListOptions::since(at(10, 0))))
            .unwrap();
        assert_eq!(aggregated.len(), 1);
        assert_eq!(aggregated[0].jobs["ping"].ok_count, 2);
        assert_eq!(aggregated[0].jobs["ping"].not_ok_count, 1);
    }
}
