use crate::types::{AgentResult, AgentStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Cumulative metrics for all runs of agents sharing a role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMetrics {
    /// Finished runs.
    pub runs: u64,
    /// Runs that completed.
    pub completed: u64,
    /// Runs that failed.
    pub failed: u64,
    /// Runs that were cancelled.
    pub cancelled: u64,
    /// Tokens reported across all runs.
    pub tokens_used: u64,
    /// Wall-clock time spent across all runs.
    pub duration_ms: u64,
}

/// Point-in-time agent counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorStats {
    /// Agents ever created.
    pub total_agents: usize,
    /// Agents never sent a message.
    pub idle: usize,
    /// Agents with a run in flight.
    pub running: usize,
    /// Agents whose latest run completed.
    pub completed: usize,
    /// Agents whose latest run failed.
    pub failed: usize,
    /// Agents whose latest run was cancelled.
    pub cancelled: usize,
    /// Tokens reported by the latest run of each agent.
    pub tokens_used: u64,
}

impl OrchestratorStats {
    pub(crate) fn record(&mut self, status: AgentStatus, result: Option<&AgentResult>) {
        self.total_agents += 1;
        match status {
            AgentStatus::Idle => self.idle += 1,
            AgentStatus::Running => self.running += 1,
            AgentStatus::Completed => self.completed += 1,
            AgentStatus::Failed => self.failed += 1,
            AgentStatus::Cancelled => self.cancelled += 1,
        }
        if let Some(result) = result {
            self.tokens_used += result.tokens_used;
        }
    }
}

/// Tracks run history per agent role.
///
/// Unlike agent results, which are overwritten by each new run, these
/// counters accumulate for the lifetime of the orchestrator.
pub struct AgentMonitor {
    roles: Arc<RwLock<HashMap<String, RoleMetrics>>>,
}

impl AgentMonitor {
    /// Create an empty monitor.
    pub fn new() -> Self {
        Self {
            roles: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Record a finished run.
    pub async fn record_run(&self, role: &str, result: &AgentResult) {
        let mut roles = self.roles.write().await;
        let metrics = roles.entry(role.to_string()).or_default();
        metrics.runs += 1;
        metrics.tokens_used += result.tokens_used;
        metrics.duration_ms += result.duration_ms;
        match result.status {
            AgentStatus::Completed => metrics.completed += 1,
            AgentStatus::Failed => metrics.failed += 1,
            AgentStatus::Cancelled => metrics.cancelled += 1,
            AgentStatus::Idle | AgentStatus::Running => {}
        }
    }

    /// Metrics for one role, if any run of it has finished.
    pub async fn get(&self, role: &str) -> Option<RoleMetrics> {
        self.roles.read().await.get(role).cloned()
    }

    /// All roles with their metrics, sorted by role.
    pub async fn snapshot(&self) -> Vec<(String, RoleMetrics)> {
        let roles = self.roles.read().await;
        let mut all: Vec<(String, RoleMetrics)> = roles
            .iter()
            .map(|(role, metrics)| (role.clone(), metrics.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Sum over every role.
    pub async fn aggregate(&self) -> RoleMetrics {
        let roles = self.roles.read().await;
        let mut total = RoleMetrics::default();
        for metrics in roles.values() {
            total.runs += metrics.runs;
            total.completed += metrics.completed;
            total.failed += metrics.failed;
            total.cancelled += metrics.cancelled;
            total.tokens_used += metrics.tokens_used;
            total.duration_ms += metrics.duration_ms;
        }
        total
    }

    /// Serialize the current metrics as JSON (for dashboards).
    pub async fn to_json(&self) -> serde_json::Value {
        let roles: serde_json::Map<String, serde_json::Value> = self
            .snapshot()
            .await
            .into_iter()
            .map(|(role, metrics)| (role, serde_json::json!(metrics)))
            .collect();
        let aggregate = self.aggregate().await;
        serde_json::json!({
            "roles": roles,
            "aggregate": aggregate,
        })
    }
}

impl Default for AgentMonitor {
    fn default() -> Self {
        Self::new()
    }
}
