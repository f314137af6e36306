use std::time::Duration;

use thiserror::Error;

/// A link that cannot be mapped onto a storage path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("unparseable url: {0}")]
    Unparseable(String),

    #[error("url has no host: {0}")]
    MissingHost(String),

    #[error("bad pathname: {0}")]
    BadPathname(String),
}

/// Errors from the priority task source.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("task source query failed: {0}")]
    Query(String),

    #[error("task source unavailable: {0}")]
    Unavailable(String),
}

/// Errors from cloning or updating a repository.
#[derive(Error, Debug)]
pub enum CollectError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("git exited with {status}")]
    GitFailed { status: String },

    #[error("collection cancelled")]
    Cancelled,

    #[error("collection timed out after {0:?}")]
    TimedOut(Duration),

    #[error("{0}")]
    Other(String),
}

/// Errors from walking a local clone for metadata.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("repository has no commits")]
    EmptyHistory,

    #[error("malformed git output: {0}")]
    Malformed(String),

    #[error("parse cancelled")]
    Cancelled,
}

/// Errors from the persistence layer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("store lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("{0}")]
    Other(String),
}
