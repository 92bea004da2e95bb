use thiserror::Error;
use uuid::Uuid;

/// A convenience `Result` alias using [`ConclaveError`].
pub type ConclaveResult<T> = Result<T, ConclaveError>;

/// Top-level error type for the Conclave workspace.
#[derive(Error, Debug)]
pub enum ConclaveError {
    /// The orchestrator has been shut down and accepts no more work.
    #[error("orchestrator is shut down")]
    OrchestratorShutdown,

    /// No agent is registered under the given id.
    #[error("agent not found: {0}")]
    AgentNotFound(Uuid),

    /// The agent already has a run in flight.
    #[error("agent is busy: {0}")]
    AgentBusy(Uuid),

    /// The run observed cancellation of its context.
    #[error("operation cancelled")]
    Cancelled,

    /// An opaque failure surfaced by an agent runner.
    #[error("Agent error: {0}")]
    Agent(String),

    /// A pattern participant (stage, debate side, mapper, reducer) did not complete.
    #[error("{participant} failed: {reason}")]
    ParticipantFailed {
        /// Positional name of the participant, e.g. `debate round 2 con`.
        participant: String,
        /// The underlying failure.
        reason: String,
    },

    /// A participant was still running when its bounded wait elapsed.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid or unreadable configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// A value could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConclaveError {
    /// Whether this error reports a cancelled run rather than a genuine failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ConclaveError::Cancelled)
    }

    /// Wrap a failure with the positional name of the participant that produced it.
    pub fn participant(participant: impl Into<String>, reason: impl ToString) -> Self {
        ConclaveError::ParticipantFailed {
            participant: participant.into(),
            reason: reason.to_string(),
        }
    }
}
