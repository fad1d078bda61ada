//! Error types for the engine.

use thiserror::Error;

use crate::task::TaskStatus;

/// Engine errors.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Topology unavailable: no devices were loaded.
    #[error("engine not initialised: no devices loaded")]
    NotInitialized,

    /// Submission for a user id absent from the topology.
    #[error("unknown user: {0}")]
    UnknownUser(u64),

    /// Rejected argument (non-positive data size, unknown scheduler mode).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation against a missing task id.
    #[error("unknown task: {0}")]
    UnknownTask(String),

    /// The state machine rejected the move.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    /// Cancel on a completed or failed task.
    #[error("task {0} is already terminal")]
    AlreadyTerminal(String),

    /// Topology source failure at startup.
    #[error("topology source error: {0}")]
    Source(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
