//! Job model shared by the scheduler, the queue backends and the dispatcher.

use serde::{Deserialize, Serialize};

use crate::types::Version;

/// Job name: ingest a single version.
pub const VERSION_JOB: &str = "version";
/// Job name: read the head version and schedule missing versions.
pub const FETCH_LATEST_VERSION_JOB: &str = "fetchLatestVersion";

/// Deterministic job id for a version job.
///
/// Submitting the same version twice yields the same id, which the queue
/// de-duplicates.
pub fn version_job_id(version: Version) -> String {
    format!("__version__{version}")
}

/// Job payload. Only `version` jobs carry data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
}

/// A job submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub name: String,
    pub payload: JobPayload,
    /// De-duplication id. `None` = never de-duplicated.
    pub id: Option<String>,
}

impl NewJob {
    /// A `version` job with its deterministic id.
    pub fn version(version: Version) -> Self {
        Self {
            name: VERSION_JOB.to_string(),
            payload: JobPayload {
                version: Some(version),
            },
            id: Some(version_job_id(version)),
        }
    }

    /// A `fetchLatestVersion` job (no id: one per timer tick).
    pub fn fetch_latest_version() -> Self {
        Self {
            name: FETCH_LATEST_VERSION_JOB.to_string(),
            payload: JobPayload::default(),
            id: None,
        }
    }
}

/// A job claimed from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Queue-internal key: the id if one was given, else a generated key.
    pub key: String,
    pub id: Option<String>,
    pub name: String,
    pub payload: JobPayload,
    /// 1-based number of the current delivery.
    pub attempts: u32,
}

/// Lifecycle state of a job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_job_has_deterministic_id() {
        let a = NewJob::version(1234);
        let b = NewJob::version(1234);
        assert_eq!(a, b);
        assert_eq!(a.id.as_deref(), Some("__version__1234"));
        assert_eq!(a.name, "version");
    }

    #[test]
    fn payload_json_shape() {
        let p = JobPayload { version: Some(5) };
        assert_eq!(serde_json::to_string(&p).unwrap(), r#"{"version":5}"#);
        let empty: JobPayload = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.version, None);
    }

    #[test]
    fn status_parse_roundtrip() {
        for s in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(JobStatus::parse("stuck"), None);
    }
}
