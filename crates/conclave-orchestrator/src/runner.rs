use crate::context::SharedContext;
use crate::types::AgentConfig;
use async_trait::async_trait;
use conclave_core::{ConclaveError, ConclaveResult};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// What a runner hands back for a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    /// Final text produced by the agent.
    pub response: String,
    /// Tokens consumed by the run.
    pub tokens_used: u64,
}

impl RunOutput {
    /// Build an output from a response and a token count.
    pub fn new(response: impl Into<String>, tokens_used: u64) -> Self {
        Self {
            response: response.into(),
            tokens_used,
        }
    }
}

/// The capability that actually performs an agent's work.
///
/// Implementations must return promptly once `cancel` fires, preferably
/// with [`ConclaveError::Cancelled`]. The orchestrator records any error
/// returned after cancellation as a cancelled run.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Perform the agent's task on `input`, reading and writing `context` as needed.
    async fn run(
        &self,
        cancel: CancellationToken,
        agent_id: Uuid,
        config: &AgentConfig,
        input: &str,
        context: Arc<SharedContext>,
    ) -> ConclaveResult<RunOutput>;
}

/// Offline runner that answers with `[role] input`.
///
/// Useful for dry runs of orchestration topologies. The token count is the
/// number of whitespace-separated words in the response.
#[derive(Debug, Clone, Default)]
pub struct EchoRunner {
    delay: Duration,
}

impl EchoRunner {
    /// An echo runner that answers immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before answering, observing cancellation meanwhile.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl AgentRunner for EchoRunner {
    async fn run(
        &self,
        cancel: CancellationToken,
        _agent_id: Uuid,
        config: &AgentConfig,
        input: &str,
        _context: Arc<SharedContext>,
    ) -> ConclaveResult<RunOutput> {
        if !self.delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ConclaveError::Cancelled),
                _ = tokio::time::sleep(self.delay) => {}
            }
        } else if cancel.is_cancelled() {
            return Err(ConclaveError::Cancelled);
        }

        let response = format!("[{}] {}", config.role, input);
        let tokens = response.split_whitespace().count() as u64;
        Ok(RunOutput::new(response, tokens))
    }
}
