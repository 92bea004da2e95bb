//! Execution patterns composed from the [`Orchestrator`](crate::Orchestrator) API.
//!
//! Each pattern creates its own agents, dispatches work and waits for the
//! participants it needs. None keeps state beyond a single call.
//!
//! - [`FanOut`] — same message to many agents, collect everything.
//! - [`Pipeline`] — strictly ordered stages, each fed the previous output.
//! - [`Debate`] — pro/con rounds followed by a synthesis.
//! - [`MapReduce`] — one mapper per input, a single reducer over all outputs.
//!
//! Failures are wrapped with the position of the participant that failed
//! and returned as a [`PatternFailure`] together with the results gathered
//! before the failure.

mod debate;
mod fan_out;
mod map_reduce;
mod pipeline;

pub use debate::{Debate, DebateResult};
pub use fan_out::FanOut;
pub use map_reduce::{MapReduce, MapReduceResult};
pub use pipeline::{Pipeline, PipelineResult, PipelineStage, TransformFn};

use crate::types::{AgentResult, AgentStatus};
use conclave_core::ConclaveError;
use std::time::Duration;

/// Result alias for pattern helpers.
pub type PatternResult<T> = Result<T, PatternFailure>;

/// A failed pattern run: the error plus the participant results gathered before it.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct PatternFailure {
    /// The first error, naming the failed participant.
    #[source]
    pub error: ConclaveError,
    /// Results of participants that completed before the failure.
    pub partial: Vec<AgentResult>,
}

impl PatternFailure {
    /// Pair an error with the results gathered so far.
    pub fn new(error: ConclaveError, partial: Vec<AgentResult>) -> Self {
        Self { error, partial }
    }
}

impl From<ConclaveError> for PatternFailure {
    fn from(error: ConclaveError) -> Self {
        Self::new(error, Vec::new())
    }
}

/// Turn a non-completed participant result into a positional error.
fn require_completed(
    result: AgentResult,
    participant: impl FnOnce() -> String,
    timeout: Duration,
) -> Result<AgentResult, ConclaveError> {
    match result.status {
        AgentStatus::Completed => Ok(result),
        AgentStatus::Running => Err(ConclaveError::Timeout(format!(
            "{} timed out after {}ms",
            participant(),
            timeout.as_millis()
        ))),
        _ => Err(ConclaveError::participant(participant(), result.failure_reason())),
    }
}
