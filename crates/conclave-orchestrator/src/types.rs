use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Immutable description of an agent, handed to the runner on every run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Role label, e.g. `researcher` or `critic`.
    pub role: String,
    /// Instructions given to the agent before any input.
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Group whose shared context the agent runs with. `None` selects the global context.
    #[serde(default)]
    pub group: Option<String>,
    /// Runner-specific fields.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentConfig {
    /// A config with the given role and nothing else set.
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            ..Self::default()
        }
    }

    /// Set the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Set the model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Run the agent with the shared context of `group`.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Attach one metadata entry.
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Lifecycle state of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Created, never sent a message.
    Idle,
    /// A run is in flight.
    Running,
    /// The latest run returned a response.
    Completed,
    /// The latest run returned an error or panicked.
    Failed,
    /// The latest run observed cancellation.
    Cancelled,
}

impl AgentStatus {
    /// `Completed`, `Failed` and `Cancelled` are terminal.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AgentStatus::Completed | AgentStatus::Failed | AgentStatus::Cancelled
        )
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Idle => write!(f, "idle"),
            AgentStatus::Running => write!(f, "running"),
            AgentStatus::Completed => write!(f, "completed"),
            AgentStatus::Failed => write!(f, "failed"),
            AgentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome of one agent run, or a best-effort view of an agent that has not finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    /// Agent that produced this result.
    pub agent_id: Uuid,
    /// Status the agent was in when the result was taken.
    pub status: AgentStatus,
    /// Runner response; meaningful only for `Completed`.
    #[serde(default)]
    pub response: String,
    /// Tokens consumed by the run.
    #[serde(default)]
    pub tokens_used: u64,
    /// Failure description for `Failed` and `Cancelled`.
    #[serde(default)]
    pub error: Option<String>,
    /// Run duration in milliseconds.
    #[serde(default)]
    pub duration_ms: u64,
    /// Set once the run has returned.
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl AgentResult {
    /// Placeholder for an agent that has not reached a terminal state.
    pub fn pending(agent_id: Uuid, status: AgentStatus) -> Self {
        Self {
            agent_id,
            status,
            response: String::new(),
            tokens_used: 0,
            error: None,
            duration_ms: 0,
            finished_at: None,
        }
    }

    /// Whether the run completed successfully.
    pub fn is_completed(&self) -> bool {
        self.status == AgentStatus::Completed
    }

    /// Human-readable reason this result is not a success.
    pub fn failure_reason(&self) -> String {
        match &self.error {
            Some(err) => err.clone(),
            None => format!("agent {} ended {}", self.agent_id, self.status),
        }
    }
}

/// Lightweight listing entry for an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSummary {
    /// Agent id.
    pub id: Uuid,
    /// Role from the agent's config.
    pub role: String,
    /// Current status.
    pub status: AgentStatus,
    /// Group whose context the agent uses, if any.
    pub group: Option<String>,
    /// When the agent was created.
    pub created_at: DateTime<Utc>,
}
