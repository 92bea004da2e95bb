use super::PatternResult;
use crate::engine::Orchestrator;
use crate::types::{AgentConfig, AgentResult};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Send one message to a fresh agent per config and collect every result.
#[derive(Debug, Clone, Default)]
pub struct FanOut {
    agents: Vec<AgentConfig>,
}

impl FanOut {
    /// Fan out to one new agent per config.
    pub fn new(agents: Vec<AgentConfig>) -> Self {
        Self { agents }
    }

    /// Run the fan-out.
    ///
    /// Results come back in config order. Agents that have not finished
    /// within `timeout` are reported with their current status; they keep
    /// running in the background.
    pub async fn run(
        &self,
        orchestrator: &Orchestrator,
        cancel: &CancellationToken,
        message: &str,
        timeout: Duration,
    ) -> PatternResult<Vec<AgentResult>> {
        if self.agents.is_empty() {
            return Ok(Vec::new());
        }

        info!(agents = self.agents.len(), "FanOut: dispatching");

        let mut ids = Vec::with_capacity(self.agents.len());
        for config in &self.agents {
            ids.push(orchestrator.create_agent(config.clone()).await?);
        }
        for id in &ids {
            orchestrator.send_to_agent(cancel, *id, message).await?;
        }

        let results = orchestrator.collect_results_for(&ids, timeout).await;
        info!(
            completed = results.iter().filter(|r| r.is_completed()).count(),
            total = results.len(),
            "FanOut: collected"
        );
        Ok(results)
    }
}
