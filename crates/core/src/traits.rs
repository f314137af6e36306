//! Collaborator seams consumed by the scheduler and the collection executor.
//!
//! All methods are blocking: they are called from worker threads, never from
//! an async context, and never while a scheduler lock is held.

use std::path::Path;

use crate::context::TaskContext;
use crate::error::{CollectError, ParseError, SourceError, StoreError};
use crate::model::{CloneOutcome, CloneRecord, RepoHandle, RepoMetrics};
use crate::progress::ProgressBuffer;

/// Ranked source of candidate links.
///
/// Ordering contract: never-attempted links first, then failed links whose
/// exponential backoff has elapsed, then stale successes. The scheduler keeps
/// the returned order as-is.
pub trait TaskSource: Send + Sync {
    /// Return up to `limit` links, most urgent first.
    fn query(&self, limit: usize) -> Result<Vec<String>, SourceError>;
}

/// Clones a repository the first time and updates it afterwards.
pub trait GitCollector: Send + Sync {
    /// Bring the repository for `link` up to date at `path`, streaming
    /// progress output into `progress`.
    fn collect_or_update(
        &self,
        link: &str,
        path: &Path,
        progress: &ProgressBuffer,
        ctx: &TaskContext,
    ) -> Result<RepoHandle, CollectError>;
}

/// Extracts contributor, activity and language metadata from a clone.
pub trait MetadataParser: Send + Sync {
    fn parse(&self, repo: &RepoHandle, ctx: &TaskContext) -> Result<RepoMetrics, ParseError>;
}

/// Persistence for clone history and metric snapshots.
pub trait OutcomeStore: Send + Sync {
    /// Latest clone record for `link`, if it was ever attempted.
    fn clone_record(&self, link: &str) -> Result<Option<CloneRecord>, StoreError>;

    /// Upsert the clone record for `outcome.link`.
    fn record_clone(&self, outcome: &CloneOutcome) -> Result<(), StoreError>;

    /// Store a new metric snapshot; the latest snapshot per link wins.
    fn record_metrics(&self, metrics: &RepoMetrics) -> Result<(), StoreError>;
}
