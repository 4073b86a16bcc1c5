//! Error types for the scheduler core.

use thiserror::Error;

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the scheduler core to its callers.
#[derive(Debug, Error)]
pub enum Error {
    /// A cron expression could not be parsed.
    #[error("invalid cron expression: {0}")]
    InvalidCron(String),

    /// No agent with the given id exists in the `AgentStore`.
    #[error("agent not found: {0}")]
    NotFound(String),

    /// No `ScheduledTask` exists in the `TaskTable` for the given id.
    #[error("agent not scheduled: {0}")]
    NotScheduled(String),

    /// `runNow` was invoked on an agent that is already in flight.
    #[error("agent already running: {0}")]
    AlreadyRunning(String),

    /// `pauseJob` was invoked on a task that is currently dispatching.
    #[error("cannot pause while running: {0}")]
    Conflict(String),

    /// `resumeJob` was invoked on a task that is not paused.
    #[error("agent not paused: {0}")]
    NotPaused(String),

    /// The persistence layer returned an error; callers may retry.
    #[error("store failure: {0}")]
    StoreFailure(String),

    /// Serialization error from a bundled store implementation.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
