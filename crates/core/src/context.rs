//! Per-task cancellation and deadline handle passed to collaborators.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// Cancellation scope for one collection task.
///
/// Collaborators that block on external processes should poll
/// [`TaskContext::is_expired`] and abandon work once it returns `true`.
/// The default context never expires.
#[derive(Debug, Clone, Default)]
pub struct TaskContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl TaskContext {
    /// A context with no deadline.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// A context that expires `timeout` from now, or never when `None`.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// True once cancelled or past the deadline.
    pub fn is_expired(&self) -> bool {
        self.is_cancelled() || self.deadline_passed()
    }
}
