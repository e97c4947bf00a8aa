use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Result of a single probe run, as produced by a probe and returned by queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// When the probe ran
    pub timestamp: DateTime<Utc>,
    /// How long the probe took, if it measured it
    #[serde(default, with = "duration_serde::option")]
    pub duration: Option<Duration>,
    /// Whether the probe succeeded
    pub ok: bool,
    /// Identifier of the probe job, e.g. `tcp-n2api-ext`
    pub job_id: String,
    /// Host the probe ran on
    pub src_host: String,
    /// Host the probe targeted
    pub dest_host: String,
    /// Probe output or error message
    #[serde(default)]
    pub result: String,
}

impl Observation {
    pub fn new(
        timestamp: DateTime<Utc>,
        job_id: impl Into<String>,
        src_host: impl Into<String>,
        dest_host: impl Into<String>,
        ok: bool,
    ) -> Self {
        Self {
            timestamp,
            duration: None,
            ok,
            job_id: job_id.into(),
            src_host: src_host.into(),
            dest_host: dest_host.into(),
            result: String::new(),
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = result.into();
        self
    }
}

/// One line per observation, the format printed by listing tools:
/// `2024-05-01T10:00:00.000Z src=a dest=b jobid=j duration=12ms status=ok`
impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} src={} dest={} jobid={}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.src_host,
            self.dest_host,
            self.job_id
        )?;
        if let Some(duration) = self.duration {
            write!(f, " duration={}ms", duration.as_millis())?;
        }
        let status = if self.ok { "ok" } else { "failed" };
        write!(f, " status={}", status)
    }
}

pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    #[derive(Serialize, Deserialize)]
    struct DurationHelper {
        secs: u64,
        #[serde(default)]
        nanos: u32,
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        DurationHelper {
            secs: duration.as_secs(),
            nanos: duration.subsec_nanos(),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let helper = DurationHelper::deserialize(deserializer)?;
        Ok(Duration::new(helper.secs, helper.nanos))
    }

    pub mod option {
        use super::DurationHelper;
        use serde::{Deserialize, Deserializer, Serialize, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            duration
                .map(|d| DurationHelper {
                    secs: d.as_secs(),
                    nanos: d.subsec_nanos(),
                })
                .serialize(serializer)
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let helper = Option::<DurationHelper>::deserialize(deserializer)?;
            Ok(helper.map(|h| Duration::new(h.secs, h.nanos)))
        }
    }
}
