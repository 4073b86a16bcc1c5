//! `AgentRunner`: the opaque execution backend the core invokes.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Outcome of one execution attempt.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl RunOutcome {
    pub fn success(duration_ms: u64) -> Self {
        Self {
            success: true,
            error: None,
            duration_ms,
        }
    }

    pub fn failure(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            duration_ms,
        }
    }
}

/// Executes a named agent and reports success/failure. Implementations
/// must be safe to invoke concurrently for different agent ids; the core
/// never calls `run` concurrently for the same id (invariant 2, spec §3).
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(&self, agent_id: &str, cancel: CancellationToken) -> RunOutcome;
}
