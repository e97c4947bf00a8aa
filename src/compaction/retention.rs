use crate::storage::files::start_of_hour;
use crate::storage::StoreConfig;
use chrono::{DateTime, Duration, Utc};
use std::path::PathBuf;

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Files removed
    pub deleted: usize,
    /// Files already gone when we tried to remove them
    pub skipped: usize,
    /// Files that could not be inspected or removed
    pub failed: usize,
}

/// Deletes hourly files whose modification time is older than the retention horizon.
/// Sweeps are best-effort: every error is logged and none is returned.
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    directory: PathBuf,
    prefix: String,
    retention_hours: i64,
}

impl RetentionSweeper {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            directory: config.directory.clone(),
            prefix: config.prefix.clone(),
            retention_hours: config.effective_retention_hours(),
        }
    }

    /// Files last modified before this instant are deleted
    /// Saturates to the earliest representable instant for huge retentions.
    pub fn horizon(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        Duration::try_hours(self.retention_hours)
            .and_then(|retention| now.checked_sub_signed(retention))
            .map(start_of_hour)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Run one sweep synchronously
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepStats {
        let horizon = self.horizon(now);
        let mut stats = SweepStats::default();

        let entries = match std::fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    directory = %self.directory.display(),
                    error = %e,
                    "cannot read directory for retention sweep"
                );
                stats.failed += 1;
                return stats;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "cannot read directory entry");
                    stats.failed += 1;
                    continue;
                }
            };

            if !entry.file_name().to_string_lossy().starts_with(&self.prefix) {
                continue;
            }

            let modified = match entry.metadata().and_then(|m| {
                if m.is_dir() {
                    Ok(None)
                } else {
                    m.modified().map(Some)
                }
            }) {
                Ok(Some(modified)) => DateTime::<Utc>::from(modified),
                Ok(None) => continue,
                // Removed by an overlapping sweep
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    stats.skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "cannot stat file");
                    stats.failed += 1;
                    continue;
                }
            };

            if modified >= horizon {
                continue;
            }

            let path = entry.path();
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    tracing::info!(path = %path.display(), "deleted expired file");
                    stats.deleted += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    stats.skipped += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "cannot delete file");
                    stats.failed += 1;
                }
            }
        }

        stats
    }

    /// Start a sweep in the background and return immediately.
    /// Runs on the tokio blocking pool when called inside a runtime, otherwise
    /// on a detached thread. Concurrent sweeps may overlap.
    pub fn trigger(&self, now: DateTime<Utc>) {
        let sweeper = self.clone();
        let run = move || {
            let stats = sweeper.sweep(now);
            if stats.deleted > 0 || stats.failed > 0 {
                tracing::info!(
                    deleted = stats.deleted,
                    failed = stats.failed,
                    "retention sweep finished"
                );
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(run);
            }
            Err(_) => {
                if let Err(e) = std::thread::Builder::new()
                    .name("retention-sweep".to_string())
                    .spawn(run)
                {
                    tracing::warn!(error = %e, "cannot start retention sweep");
                }
            }
        }
    }
}
