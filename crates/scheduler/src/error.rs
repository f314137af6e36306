use harvest_core::{CollectError, LinkError, ParseError};
use thiserror::Error;

/// Errors returned to scheduler callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("scheduler is shut down")]
    Shutdown,
}

/// Why a single collection task did not complete.
#[derive(Error, Debug)]
pub enum TaskError {
    /// No storage path could be derived; nothing was recorded.
    #[error("cannot resolve storage path: {0}")]
    PathResolution(#[from] LinkError),

    #[error("clone failed: {0}")]
    Clone(#[from] CollectError),

    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    /// Short label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskError::PathResolution(_) => "path_resolution",
            TaskError::Clone(_) => "clone",
            TaskError::Parse(_) => "parse",
            TaskError::Panicked(_) => "panic",
        }
    }
}
