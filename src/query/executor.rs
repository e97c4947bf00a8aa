use super::replay::{iterate_record_file, TailPolicy};
use super::QueryError;
use crate::data::Observation;
use crate::storage::files::{record_file_path, record_files_between, start_of_hour};
use chrono::{DateTime, Duration, Utc};
use fxhash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

/// Result limit used when a query asks for 0
pub const DEFAULT_LIMIT: usize = 10_000;

/// Queries never look further back than this
pub const MAX_LOOKBACK_HOURS: i64 = 24;

/// Parameters of an observation listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListOptions {
    /// Window start; missing means the oldest allowed instant
    pub start: Option<DateTime<Utc>>,
    /// Window end; missing means now
    pub end: Option<DateTime<Utc>>,
    /// Maximum number of observations, 0 for [`DEFAULT_LIMIT`]
    pub limit: usize,
    /// Only these jobs (empty = all)
    pub job_ids: Vec<String>,
    /// Only these source hosts (empty = all)
    pub src_hosts: Vec<String>,
    /// Only these destination hosts (empty = all)
    pub dest_hosts: Vec<String>,
    /// Skip successful observations
    pub failures_only: bool,
}

impl ListOptions {
    pub fn since(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            ..Default::default()
        }
    }

    pub fn with_end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_job_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.job_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_src_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.src_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dest_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dest_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn failures_only(mut self) -> Self {
        self.failures_only = true;
        self
    }

    fn effective_limit(&self) -> usize {
        if self.limit == 0 {
            DEFAULT_LIMIT
        } else {
            self.limit
        }
    }
}

/// Inclusive time window after clamping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t <= self.end
    }
}

/// Clamp a requested window to the last [`MAX_LOOKBACK_HOURS`] before `now`.
/// Returns `None` when nothing of the window remains.
pub fn clamp_window(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<TimeWindow> {
    let floor = now - Duration::hours(MAX_LOOKBACK_HOURS);
    let start = start.unwrap_or(floor).clamp(floor, now);
    let end = end.unwrap_or(now);

    if end < start || end < floor {
        return None;
    }
    Some(TimeWindow { start, end })
}

fn key_set(keys: &[String]) -> FxHashSet<String> {
    keys.iter().cloned().collect()
}

/// Per-observation acceptance test, applied in a fixed order:
/// window, failures-only, then job/source/destination membership.
#[derive(Debug)]
pub struct ObservationFilter {
    window: TimeWindow,
    failures_only: bool,
    job_ids: FxHashSet<String>,
    src_hosts: FxHashSet<String>,
    dest_hosts: FxHashSet<String>,
}

impl ObservationFilter {
    pub fn new(options: &ListOptions, window: TimeWindow) -> Self {
        Self {
            window,
            failures_only: options.failures_only,
            job_ids: key_set(&options.job_ids),
            src_hosts: key_set(&options.src_hosts),
            dest_hosts: key_set(&options.dest_hosts),
        }
    }

    pub fn accepts(&self, obs: &Observation) -> bool {
        if !self.window.contains(obs.timestamp) {
            return false;
        }
        if self.failures_only && obs.ok {
            return false;
        }
        member(&self.job_ids, &obs.job_id)
            && member(&self.src_hosts, &obs.src_host)
            && member(&self.dest_hosts, &obs.dest_host)
    }
}

fn member(set: &FxHashSet<String>, value: &str) -> bool {
    set.is_empty() || set.contains(value)
}

/// Files the writer may still be appending to: the current hour's and,
/// within the rotation grace, the previous hour's.
fn live_files(directory: &Path, prefix: &str, now: DateTime<Utc>) -> [PathBuf; 2] {
    let hour = start_of_hour(now);
    [
        record_file_path(directory, prefix, hour),
        record_file_path(directory, prefix, hour - Duration::hours(1)),
    ]
}

/// List observations stored under `directory` matching `options`, as of `now`.
/// Files are replayed in hour order until the limit is reached; the result is
/// then sorted by timestamp, ties keeping replay order.
pub fn list_observations(
    directory: &Path,
    prefix: &str,
    options: &ListOptions,
    now: DateTime<Utc>,
) -> Result<Vec<Observation>, QueryError> {
    let Some(window) = clamp_window(options.start, options.end, now) else {
        return Ok(Vec::new());
    };

    let limit = options.effective_limit();
    let filter = ObservationFilter::new(options, window);
    let files = record_files_between(directory, prefix, window.start, window.end)?;
    let live = live_files(directory, prefix, now);

    let mut result = Vec::new();
    for path in files {
        if result.len() >= limit {
            break;
        }

        let tail = if live.contains(&path) {
            TailPolicy::TolerateTruncated
        } else {
            TailPolicy::Strict
        };

        iterate_record_file(&path, tail, |obs| {
            if filter.accepts(&obs) {
                result.push(obs);
            }
            if result.len() >= limit {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .map_err(|source| QueryError::Replay {
            path: path.clone(),
            source,
        })?;
    }

    result.sort_by_key(|obs| obs.timestamp);
    tracing::debug!(count = result.len(), "listed observations");
    Ok(result)
}
