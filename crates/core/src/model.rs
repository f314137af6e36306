use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A local clone produced by a [`GitCollector`](crate::GitCollector).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoHandle {
    pub link: String,
    /// Absolute path of the (bare) repository.
    pub path: PathBuf,
}

/// Metadata extracted from a local clone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoMetrics {
    pub link: String,
    pub contributor_count: i32,
    /// Commits per week over the last year.
    pub commit_frequency: f64,
    pub org_count: i32,
    /// Top languages by tracked bytes, largest first.
    pub languages: Vec<String>,
    pub created_since: DateTime<Utc>,
    pub updated_since: DateTime<Utc>,
}

/// Result of one clone/update attempt, as written by the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloneOutcome {
    pub link: String,
    /// Path relative to the storage root.
    pub file_path: String,
    pub success: bool,
    /// Error plus captured progress on failure, `None` on success.
    pub message: Option<String>,
    pub update_time: DateTime<Utc>,
    pub take_time_ms: i64,
    /// Bytes on disk after a successful clone.
    pub take_storage: Option<i64>,
}

/// Persisted clone history for a link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloneRecord {
    pub link: String,
    pub file_path: Option<String>,
    pub success: bool,
    pub message: Option<String>,
    pub update_time: Option<DateTime<Utc>>,
    pub failed_times: i32,
    pub last_success: Option<DateTime<Utc>>,
    pub take_time_ms: Option<i64>,
    pub take_storage: Option<i64>,
}

impl CloneRecord {
    /// Fold an attempt into the record: success resets the failure counter,
    /// failure increments it and keeps `last_success`.
    pub fn apply(previous: Option<&CloneRecord>, outcome: &CloneOutcome) -> CloneRecord {
        let failed_times = match (outcome.success, previous) {
            (true, _) => 0,
            (false, Some(prev)) => prev.failed_times + 1,
            (false, None) => 1,
        };
        let last_success = if outcome.success {
            Some(outcome.update_time)
        } else {
            previous.and_then(|p| p.last_success)
        };
        CloneRecord {
            link: outcome.link.clone(),
            file_path: Some(outcome.file_path.clone()),
            success: outcome.success,
            message: outcome.message.clone(),
            update_time: Some(outcome.update_time),
            failed_times,
            last_success,
            take_time_ms: Some(outcome.take_time_ms),
            take_storage: outcome.take_storage.or_else(|| previous.and_then(|p| p.take_storage)),
        }
    }
}
