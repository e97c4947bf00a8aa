//! Windowed per-link summaries of observations

use super::executor::{list_observations, ListOptions, MAX_LOOKBACK_HOURS};
use super::QueryError;
use crate::data::observation::duration_serde;
use crate::data::Observation;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Wider windows are narrowed to the longest span a query can cover
pub const MAX_WINDOW: Duration = Duration::from_secs(MAX_LOOKBACK_HOURS as u64 * 3600);

fn default_window() -> Duration {
    DEFAULT_WINDOW
}

/// Listing parameters plus the bucket width
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateOptions {
    #[serde(flatten)]
    pub list: ListOptions,
    #[serde(default = "default_window", with = "duration_serde")]
    pub window: Duration,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            list: ListOptions::default(),
            window: DEFAULT_WINDOW,
        }
    }
}

impl AggregateOptions {
    pub fn new(list: ListOptions) -> Self {
        Self {
            list,
            ..Default::default()
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    fn window_millis(&self) -> i64 {
        if self.window.is_zero() {
            return DEFAULT_WINDOW.as_millis() as i64;
        }
        self.window.min(MAX_WINDOW).as_millis().max(1) as i64
    }
}

/// Counts for one job within one bucket
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub ok_count: u64,
    pub not_ok_count: u64,
    /// Mean duration over the successful observations that measured one
    #[serde(default, with = "duration_serde::option")]
    pub mean_ok_duration: Option<Duration>,
}

/// All observations of one source/destination pair within one window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedObservation {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub src_host: String,
    pub dest_host: String,
    pub jobs: BTreeMap<String, JobSummary>,
}

#[derive(Default)]
struct JobAccumulator {
    ok: u64,
    not_ok: u64,
    duration_sum: Duration,
    duration_count: u32,
}

impl JobAccumulator {
    fn add(&mut self, obs: &Observation) {
        if !obs.ok {
            self.not_ok += 1;
            return;
        }
        self.ok += 1;
        if let Some(d) = obs.duration {
            self.duration_sum += d;
            self.duration_count += 1;
        }
    }

    fn finish(self) -> JobSummary {
        JobSummary {
            ok_count: self.ok,
            not_ok_count: self.not_ok,
            mean_ok_duration: (self.duration_count > 0).then(|| self.duration_sum / self.duration_count),
        }
    }
}

type BucketKey = (DateTime<Utc>, String, String);

/// Group `observations` into windows of `window_millis` aligned to the epoch,
/// clamped to at most [`MAX_WINDOW`].
/// Output is ordered by period start, source, then destination.
pub fn aggregate(observations: &[Observation], window_millis: i64) -> Vec<AggregatedObservation> {
    let window_millis = window_millis.clamp(1, MAX_WINDOW.as_millis() as i64);
    let width = chrono::Duration::milliseconds(window_millis);
    let mut buckets: BTreeMap<BucketKey, BTreeMap<String, JobAccumulator>> = BTreeMap::new();

    for obs in observations {
        let ts = obs.timestamp.timestamp_millis();
        let start_ms = ts.div_euclid(window_millis) * window_millis;
        let Some(period_start) = Utc.timestamp_millis_opt(start_ms).single() else {
            continue;
        };
        if period_start.checked_add_signed(width).is_none() {
            continue;
        }

        buckets
            .entry((period_start, obs.src_host.clone(), obs.dest_host.clone()))
            .or_default()
            .entry(obs.job_id.clone())
            .or_default()
            .add(obs);
    }

    buckets
        .into_iter()
        .map(|((period_start, src_host, dest_host), jobs)| AggregatedObservation {
            period_start,
            period_end: period_start + width,
            src_host,
            dest_host,
            jobs: jobs.into_iter().map(|(job, acc)| (job, acc.finish())).collect(),
        })
        .collect()
}

/// List matching observations and summarise them per window
pub fn aggregate_observations(
    directory: &Path,
    prefix: &str,
    options: &AggregateOptions,
    now: DateTime<Utc>,
) -> Result<Vec<AggregatedObservation>, QueryError> {
    let observations = list_observations(directory, prefix, &options.list, now)?;
    Ok(aggregate(&observations, options.window_millis()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, m, s).unwrap()
    }

    #[test]
    fn test_buckets_by_window_and_link() {
        let observations = vec![
            Observation::new(at(0, 10), "ping", "a", "b", true).with_duration(Duration::from_millis(10)),
            Observation::new(at(0, 40), "ping", "a", "b", true).with_duration(Duration::from_millis(30)),
            Observation::new(at(0, 50), "ping", "a", "b", false),
            Observation::new(at(0, 55), "http", "a", "b", true),
            Observation::new(at(0, 20), "ping", "a", "c", false),
            Observation::new(at(1, 5), "ping", "a", "b", true),
        ];

        let result = aggregate(&observations, 60_000);
        assert_eq!(result.len(), 3);

        let first = &result[0];
        assert_eq!((first.period_start, first.period_end), (at(0, 0), at(1, 0)));
        assert_eq!((first.src_host.as_str(), first.dest_host.as_str()), ("a", "b"));
        assert_eq!(
            first.jobs["ping"],
            JobSummary {
                ok_count: 2,
                not_ok_count: 1,
                mean_ok_duration: Some(Duration::from_millis(20)),
            }
        );
        assert_eq!(first.jobs["http"].ok_count, 1);
        assert_eq!(first.jobs["http"].mean_ok_duration, None);

        assert_eq!(result[1].dest_host, "c");
        assert_eq!(result[1].jobs["ping"].not_ok_count, 1);
        assert_eq!(result[2].period_start, at(1, 0));
    }

    #[test]
    fn test_zero_window_uses_default() {
        let options = AggregateOptions::default().with_window(Duration::ZERO);
        assert_eq!(options.window_millis(), 60_000);
    }

    #[test]
    fn test_huge_window_is_capped() {
        let options: AggregateOptions =
            serde_json::from_str(r#"{"window": {"secs": 18446744073709551615}}"#).unwrap();
        assert_eq!(options.window_millis(), MAX_WINDOW.as_millis() as i64);

        let observations = vec![
            Observation::new(at(0, 10), "ping", "a", "b", true),
            Observation::new(at(59, 0), "ping", "a", "b", false),
        ];
        let result = aggregate(&observations, options.window_millis());
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].period_end - result[0].period_start, chrono::Duration::hours(24));

        // Callers passing a raw width get the same cap
        assert_eq!(aggregate(&observations, i64::MAX), result);
    }

    #[test]
    fn test_options_json_flattened() {
        let options: AggregateOptions =
            serde_json::from_str(r#"{"limit": 5, "job_ids": ["ping"], "window": {"secs": 300}}"#).unwrap();
        assert_eq!(options.list.limit, 5);
        assert_eq!(options.list.job_ids, vec!["ping".to_string()]);
        assert_eq!(options.window, Duration::from_secs(300));

        let defaulted: AggregateOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(defaulted, AggregateOptions::default());
    }
}
