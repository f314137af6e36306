use std::time::Duration;

use thiserror::Error;

/// Errors that can occur on the control plane.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame exceeds {0} byte limit")]
    FrameTooLarge(usize),

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("reply for seq {got}, expected {expected}")]
    SeqMismatch { expected: u64, got: u64 },

    /// The server handled the call and reported an error.
    #[error("{0}")]
    Remote(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}
