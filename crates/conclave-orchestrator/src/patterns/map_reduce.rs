use super::{require_completed, PatternFailure, PatternResult};
use crate::engine::Orchestrator;
use crate::types::{AgentConfig, AgentResult};
use conclave_core::ConclaveResult;
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Output of a finished map-reduce.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MapReduceResult {
    /// One result per input, in input order.
    pub map_results: Vec<AgentResult>,
    /// `None` when there were no inputs.
    pub reduce_result: Option<AgentResult>,
    /// Response of the reducer; empty when there were no inputs.
    pub final_output: String,
}

/// One mapper agent per input, all built from the same template, then a single reducer.
///
/// Mappers may also leave structured data for the reducer in a shared
/// context: give both configs the same group, or use the global context.
#[derive(Debug, Clone)]
pub struct MapReduce {
    mapper: AgentConfig,
    reducer: AgentConfig,
}

impl MapReduce {
    /// Use `mapper` as the template for every mapper agent.
    pub fn new(mapper: AgentConfig, reducer: AgentConfig) -> Self {
        Self { mapper, reducer }
    }

    /// Map every input concurrently, then reduce the numbered mapper outputs.
    ///
    /// The first mapper to fail aborts the run; the remaining mappers are
    /// cancelled and only results gathered so far are returned with the error.
    pub async fn run<S: AsRef<str>>(
        &self,
        orchestrator: &Orchestrator,
        cancel: &CancellationToken,
        inputs: &[S],
        timeout: Duration,
    ) -> PatternResult<MapReduceResult> {
        if inputs.is_empty() {
            return Ok(MapReduceResult::default());
        }

        info!(inputs = inputs.len(), "MapReduce: mapping");

        let scope = cancel.child_token();
        let _scope_guard = scope.clone().drop_guard();

        let mut ids = Vec::with_capacity(inputs.len());
        for _ in inputs {
            ids.push(orchestrator.create_agent(self.mapper.clone()).await?);
        }
        for (id, input) in ids.iter().zip(inputs) {
            orchestrator.send_to_agent(&scope, *id, input.as_ref()).await?;
        }

        let mut waiting: FuturesUnordered<_> = ids
            .iter()
            .enumerate()
            .map(|(index, id)| async move {
                (index, orchestrator.wait_for_agent(*id, timeout).await)
            })
            .collect();

        let mut slots: Vec<Option<AgentResult>> = vec![None; ids.len()];
        while let Some((index, outcome)) = waiting.next().await {
            let checked = outcome.and_then(|result| {
                require_completed(result, || format!("mapper {}", index + 1), timeout)
            });
            match checked {
                Ok(result) => slots[index] = Some(result),
                Err(e) => {
                    warn!(mapper = index + 1, error = %e, "MapReduce: aborting");
                    let partial = slots.into_iter().flatten().collect();
                    return Err(PatternFailure::new(e, partial));
                }
            }
        }
        drop(waiting);

        let map_results: Vec<AgentResult> = slots.into_iter().flatten().collect();
        info!(mapped = map_results.len(), "MapReduce: reducing");

        let prompt = reduce_prompt(&map_results);
        let reduce_result = match self.reduce(orchestrator, &scope, prompt, timeout).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "MapReduce: reducer failed");
                return Err(PatternFailure::new(e, map_results));
            }
        };

        Ok(MapReduceResult {
            final_output: reduce_result.response.clone(),
            map_results,
            reduce_result: Some(reduce_result),
        })
    }

    async fn reduce(
        &self,
        orchestrator: &Orchestrator,
        scope: &CancellationToken,
        prompt: String,
        timeout: Duration,
    ) -> ConclaveResult<AgentResult> {
        let id = orchestrator.create_agent(self.reducer.clone()).await?;
        orchestrator.send_to_agent(scope, id, prompt).await?;
        let result = orchestrator.wait_for_agent(id, timeout).await?;
        require_completed(result, || "reducer".to_string(), timeout)
    }
}

fn reduce_prompt(map_results: &[AgentResult]) -> String {
    let mut prompt = String::from("Combine the following results into a single answer:\n\n");
    for (index, result) in map_results.iter().enumerate() {
        prompt.push_str(&format!("[{}] {}\n\n", index + 1, result.response));
    }
    prompt
}
