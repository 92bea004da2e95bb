use super::{require_completed, PatternFailure, PatternResult};
use crate::engine::Orchestrator;
use crate::types::{AgentConfig, AgentResult};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Rewrites a stage's input before it is sent.
pub type TransformFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// One pipeline stage: the agent to create plus an optional input rewrite.
#[derive(Clone)]
pub struct PipelineStage {
    /// Agent created for this stage.
    pub config: AgentConfig,
    transform_input: Option<TransformFn>,
}

impl PipelineStage {
    /// A stage that forwards the previous output unchanged.
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            transform_input: None,
        }
    }

    /// Apply `transform` to the incoming text before sending it to this stage.
    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.transform_input = Some(Arc::new(transform));
        self
    }

    fn input_for(&self, previous: &str) -> String {
        match &self.transform_input {
            Some(transform) => transform(previous),
            None => previous.to_string(),
        }
    }
}

impl std::fmt::Debug for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineStage")
            .field("config", &self.config)
            .field("transform_input", &self.transform_input.is_some())
            .finish()
    }
}

/// Output of a successful pipeline.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineResult {
    /// One result per stage, in stage order.
    pub stage_results: Vec<AgentResult>,
    /// Response of the last stage.
    pub final_output: String,
}

/// Strictly ordered chain of agents, each fed the previous stage's response.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<PipelineStage>,
}

impl Pipeline {
    /// Build a pipeline from stages in execution order.
    pub fn new(stages: Vec<PipelineStage>) -> Self {
        Self { stages }
    }

    /// Run every stage in order, waiting up to `timeout` for each.
    ///
    /// The first stage that does not complete aborts the pipeline. The
    /// returned [`PatternFailure`] names it (`pipeline stage <index>`, 0-based,
    /// followed by its 1-based position) and carries the results of the
    /// stages that completed before it.
    pub async fn run(
        &self,
        orchestrator: &Orchestrator,
        cancel: &CancellationToken,
        input: &str,
        timeout: Duration,
    ) -> PatternResult<PipelineResult> {
        if self.stages.is_empty() {
            return Ok(PipelineResult::default());
        }

        let total = self.stages.len();
        info!(stages = total, "Pipeline: starting");

        // Stops a stage left running by a timeout once the pipeline returns.
        let scope = cancel.child_token();
        let _scope_guard = scope.clone().drop_guard();

        let mut stage_results: Vec<AgentResult> = Vec::with_capacity(total);
        let mut current = input.to_string();

        for (index, stage) in self.stages.iter().enumerate() {
            let stage_input = stage.input_for(&current);

            let result = match self
                .run_stage(orchestrator, &scope, stage, stage_input, timeout)
                .await
            {
                Ok(result) => result,
                Err(e) => return Err(PatternFailure::new(e, stage_results)),
            };

            let result = match require_completed(
                result,
                || format!("pipeline stage {index} ({}/{total})", index + 1),
                timeout,
            ) {
                Ok(result) => result,
                Err(e) => {
                    warn!(stage = index, error = %e, "Pipeline: aborting");
                    return Err(PatternFailure::new(e, stage_results));
                }
            };

            info!(stage = index, role = %stage.config.role, "Pipeline: stage completed");
            current = result.response.clone();
            stage_results.push(result);
        }

        Ok(PipelineResult {
            stage_results,
            final_output: current,
        })
    }

    async fn run_stage(
        &self,
        orchestrator: &Orchestrator,
        scope: &CancellationToken,
        stage: &PipelineStage,
        input: String,
        timeout: Duration,
    ) -> conclave_core::ConclaveResult<AgentResult> {
        let id = orchestrator.create_agent(stage.config.clone()).await?;
        orchestrator.send_to_agent(scope, id, input).await?;
        orchestrator.wait_for_agent(id, timeout).await
    }
}
