//! Admission errors returned synchronously from the producer-facing API.
//!
//! Business-level refusals are not errors: they surface asynchronously as
//! `Reject` log records (see [`crate::log::RejectReason`]).

use thiserror::Error;

use crate::ring::RingError;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine is shutting down; no further commands are admitted
    #[error("order book is shutting down")]
    ShuttingDown,

    /// The command is malformed at the boundary (e.g. empty order id)
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The payload could not be encoded
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No ring-buffer slot could be claimed
    #[error("no slot available in the command buffer")]
    NoSlot,

    /// The consumer did not drain before the shutdown deadline
    #[error("shutdown deadline exceeded")]
    ShutdownTimeout,

    /// The consumer thread could not be spawned
    #[error("failed to spawn consumer thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl From<RingError> for EngineError {
    fn from(err: RingError) -> Self {
        match err {
            RingError::NoSlot => EngineError::NoSlot,
            RingError::ShutdownTimeout => EngineError::ShutdownTimeout,
        }
    }
}
