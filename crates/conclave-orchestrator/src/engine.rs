use crate::config::OrchestratorConfig;
use crate::context::SharedContext;
use crate::monitor::{AgentMonitor, OrchestratorStats};
use crate::runner::{AgentRunner, RunOutput};
use crate::types::{AgentConfig, AgentResult, AgentStatus, AgentSummary};
use chrono::{DateTime, Utc};
use conclave_core::{ConclaveError, ConclaveResult};
use futures_util::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Registry entry for one agent.
struct AgentRecord {
    config: Arc<AgentConfig>,
    status: AgentStatus,
    /// Outcome of the most recent run; `None` until a run has returned.
    result: Option<AgentResult>,
    /// Cancellation handle of the in-flight run.
    cancel: Option<CancellationToken>,
    context: Arc<SharedContext>,
    created_at: DateTime<Utc>,
}

impl AgentRecord {
    fn view(&self, id: Uuid) -> AgentResult {
        match (&self.result, self.status.is_terminal()) {
            (Some(result), true) => result.clone(),
            _ => AgentResult::pending(id, self.status),
        }
    }
}

#[derive(Default)]
struct Registry {
    agents: HashMap<Uuid, AgentRecord>,
    /// Creation order.
    order: Vec<Uuid>,
    shut_down: bool,
}

/// Owns the agent registry, drives agent runs and wires shared contexts.
///
/// Every run is a spawned task holding a child of the caller's cancellation
/// token. Status and result live behind a single lock so observers never see
/// a terminal status without its result.
pub struct Orchestrator {
    runner: Arc<dyn AgentRunner>,
    config: OrchestratorConfig,
    registry: Arc<RwLock<Registry>>,
    monitor: Arc<AgentMonitor>,
    global: Arc<SharedContext>,
    groups: parking_lot::Mutex<HashMap<String, Arc<SharedContext>>>,
}

impl Orchestrator {
    /// Create an orchestrator with default configuration.
    pub fn new(runner: Arc<dyn AgentRunner>) -> Self {
        Self::with_config(runner, OrchestratorConfig::default())
    }

    /// Create an orchestrator with explicit settings.
    pub fn with_config(runner: Arc<dyn AgentRunner>, config: OrchestratorConfig) -> Self {
        Self {
            runner,
            config,
            registry: Arc::new(RwLock::new(Registry::default())),
            monitor: Arc::new(AgentMonitor::new()),
            global: Arc::new(SharedContext::global()),
            groups: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Settings this orchestrator was built with.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Per-role run metrics.
    pub fn monitor(&self) -> &Arc<AgentMonitor> {
        &self.monitor
    }

    /// Register a new agent in `Idle` state.
    ///
    /// The agent runs with the shared context of `config.group`, or the
    /// global context when no group is set.
    pub async fn create_agent(&self, config: AgentConfig) -> ConclaveResult<Uuid> {
        let mut registry = self.registry.write().await;
        if registry.shut_down {
            return Err(ConclaveError::OrchestratorShutdown);
        }

        let context = match &config.group {
            Some(group) => self.group_context(group),
            None => Arc::clone(&self.global),
        };

        let id = Uuid::new_v4();
        debug!(agent_id = %id, role = %config.role, scope = %context.scope(), "Agent created");
        registry.agents.insert(
            id,
            AgentRecord {
                config: Arc::new(config),
                status: AgentStatus::Idle,
                result: None,
                cancel: None,
                context,
                created_at: Utc::now(),
            },
        );
        registry.order.push(id);
        Ok(id)
    }

    /// Start a run of `agent_id` on `message` and return without waiting for it.
    ///
    /// The run observes a child of `parent`; cancelling `parent` cancels the run.
    pub async fn send_to_agent(
        &self,
        parent: &CancellationToken,
        agent_id: Uuid,
        message: impl Into<String>,
    ) -> ConclaveResult<()> {
        let message = message.into();

        let (cancel, config, context) = {
            let mut registry = self.registry.write().await;
            if registry.shut_down {
                return Err(ConclaveError::OrchestratorShutdown);
            }
            let record = registry
                .agents
                .get_mut(&agent_id)
                .ok_or(ConclaveError::AgentNotFound(agent_id))?;
            if record.status == AgentStatus::Running {
                return Err(ConclaveError::AgentBusy(agent_id));
            }

            let cancel = parent.child_token();
            record.status = AgentStatus::Running;
            record.result = None;
            record.cancel = Some(cancel.clone());
            (cancel, Arc::clone(&record.config), Arc::clone(&record.context))
        };

        info!(agent_id = %agent_id, role = %config.role, "Dispatching message to agent");

        let runner = Arc::clone(&self.runner);
        let registry = Arc::clone(&self.registry);
        let monitor = Arc::clone(&self.monitor);

        tokio::spawn(async move {
            let started = Instant::now();
            let outcome = AssertUnwindSafe(runner.run(
                cancel.clone(),
                agent_id,
                &config,
                &message,
                context,
            ))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(ConclaveError::Agent("agent runner panicked".to_string())));

            let duration_ms = started.elapsed().as_millis() as u64;
            let result = settle(agent_id, outcome, cancel.is_cancelled(), duration_ms);

            match result.status {
                AgentStatus::Completed => {
                    info!(agent_id = %agent_id, role = %config.role, duration_ms, "Agent completed");
                }
                AgentStatus::Cancelled => {
                    info!(agent_id = %agent_id, role = %config.role, "Agent cancelled");
                }
                _ => {
                    warn!(
                        agent_id = %agent_id,
                        role = %config.role,
                        error = result.error.as_deref().unwrap_or_default(),
                        "Agent failed"
                    );
                }
            }

            monitor.record_run(&config.role, &result).await;

            let mut registry = registry.write().await;
            match registry.agents.get_mut(&agent_id) {
                Some(record) => {
                    let status = result.status;
                    record.result = Some(result);
                    record.status = status;
                    record.cancel = None;
                }
                None => error!(agent_id = %agent_id, "Finished run for unregistered agent"),
            }
        });

        Ok(())
    }

    /// Current status of one agent.
    pub async fn agent_status(&self, agent_id: Uuid) -> ConclaveResult<AgentStatus> {
        let registry = self.registry.read().await;
        registry
            .agents
            .get(&agent_id)
            .map(|record| record.status)
            .ok_or(ConclaveError::AgentNotFound(agent_id))
    }

    /// Result of the agent's latest finished run, `None` while it has none.
    pub async fn agent_result(&self, agent_id: Uuid) -> ConclaveResult<Option<AgentResult>> {
        let registry = self.registry.read().await;
        registry
            .agents
            .get(&agent_id)
            .map(|record| record.result.clone())
            .ok_or(ConclaveError::AgentNotFound(agent_id))
    }

    /// Block until the agent is no longer `Running` or `timeout` elapses.
    ///
    /// Returns the agent's result, or a placeholder carrying its current
    /// status if it is still running when the timeout expires.
    pub async fn wait_for_agent(
        &self,
        agent_id: Uuid,
        timeout: Duration,
    ) -> ConclaveResult<AgentResult> {
        let deadline = deadline_after(timeout);
        loop {
            {
                let registry = self.registry.read().await;
                let record = registry
                    .agents
                    .get(&agent_id)
                    .ok_or(ConclaveError::AgentNotFound(agent_id))?;
                if record.status != AgentStatus::Running || Instant::now() >= deadline {
                    return Ok(record.view(agent_id));
                }
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    /// Best-effort results for every agent, in creation order.
    ///
    /// Waits up to `timeout` for running agents to finish; agents still
    /// running (or never started) are reported with their current status and
    /// no response. Never fails on timeout.
    pub async fn collect_results(&self, timeout: Duration) -> Vec<AgentResult> {
        self.collect(None, timeout).await
    }

    /// Like [`Orchestrator::collect_results`], restricted to `ids`. Unknown ids are skipped.
    pub async fn collect_results_for(&self, ids: &[Uuid], timeout: Duration) -> Vec<AgentResult> {
        self.collect(Some(ids), timeout).await
    }

    async fn collect(&self, ids: Option<&[Uuid]>, timeout: Duration) -> Vec<AgentResult> {
        let deadline = deadline_after(timeout);
        loop {
            {
                let registry = self.registry.read().await;
                let selected: &[Uuid] = ids.unwrap_or(registry.order.as_slice());
                let records: Vec<(Uuid, &AgentRecord)> = selected
                    .iter()
                    .filter_map(|id| registry.agents.get(id).map(|record| (*id, record)))
                    .collect();

                let running = records
                    .iter()
                    .filter(|(_, record)| record.status == AgentStatus::Running)
                    .count();
                if running == 0 || Instant::now() >= deadline {
                    if running > 0 {
                        debug!(running, "Collecting results before all agents finished");
                    }
                    return records.iter().map(|(id, record)| record.view(*id)).collect();
                }
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    /// Cancel the in-flight run of one agent. Returns whether a run was cancelled.
    pub async fn cancel_agent(&self, agent_id: Uuid) -> ConclaveResult<bool> {
        let registry = self.registry.read().await;
        let record = registry
            .agents
            .get(&agent_id)
            .ok_or(ConclaveError::AgentNotFound(agent_id))?;
        match (&record.cancel, record.status) {
            (Some(cancel), AgentStatus::Running) => {
                cancel.cancel();
                info!(agent_id = %agent_id, "Agent cancellation requested");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Write `key` into the global context, visible to every agent.
    pub async fn broadcast_context(
        &self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> ConclaveResult<()> {
        if self.registry.read().await.shut_down {
            return Err(ConclaveError::OrchestratorShutdown);
        }
        self.global.set(key, value);
        Ok(())
    }

    /// The context shared by every agent without a group.
    pub fn global_context(&self) -> Arc<SharedContext> {
        Arc::clone(&self.global)
    }

    /// The context shared by agents of `group`, created on first use.
    pub fn group_context(&self, group: &str) -> Arc<SharedContext> {
        let mut groups = self.groups.lock();
        let context = groups
            .entry(group.to_string())
            .or_insert_with(|| Arc::new(SharedContext::group(group)));
        Arc::clone(context)
    }

    /// Number of agents ever created, terminal ones included.
    pub async fn agent_count(&self) -> usize {
        self.registry.read().await.agents.len()
    }

    /// All agents in creation order.
    pub async fn list_agents(&self) -> Vec<AgentSummary> {
        let registry = self.registry.read().await;
        registry
            .order
            .iter()
            .filter_map(|id| {
                registry.agents.get(id).map(|record| AgentSummary {
                    id: *id,
                    role: record.config.role.clone(),
                    status: record.status,
                    group: record.config.group.clone(),
                    created_at: record.created_at,
                })
            })
            .collect()
    }

    /// Agent counts per status and token totals of the latest runs.
    pub async fn stats(&self) -> OrchestratorStats {
        let registry = self.registry.read().await;
        let mut stats = OrchestratorStats::default();
        for record in registry.agents.values() {
            stats.record(record.status, record.result.as_ref());
        }
        stats
    }

    /// Stop accepting work and cancel every running agent.
    ///
    /// Only the first call has an effect; later calls return
    /// [`ConclaveError::OrchestratorShutdown`].
    pub async fn shutdown(&self) -> ConclaveResult<()> {
        let mut registry = self.registry.write().await;
        if registry.shut_down {
            return Err(ConclaveError::OrchestratorShutdown);
        }
        registry.shut_down = true;

        let mut cancelled = 0usize;
        for record in registry.agents.values() {
            if let (Some(cancel), AgentStatus::Running) = (&record.cancel, record.status) {
                cancel.cancel();
                cancelled += 1;
            }
        }

        info!(agents = registry.agents.len(), cancelled, "Orchestrator shut down");
        Ok(())
    }
}

/// `now + timeout`, saturating for effectively unbounded timeouts.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(60 * 60 * 24 * 365))
}

/// Map a runner outcome to the agent's terminal result.
fn settle(
    agent_id: Uuid,
    outcome: ConclaveResult<RunOutput>,
    cancelled: bool,
    duration_ms: u64,
) -> AgentResult {
    let mut result = AgentResult::pending(agent_id, AgentStatus::Completed);
    result.duration_ms = duration_ms;
    result.finished_at = Some(Utc::now());

    match outcome {
        Ok(output) => {
            result.response = output.response;
            result.tokens_used = output.tokens_used;
        }
        Err(e) if cancelled || e.is_cancellation() => {
            result.status = AgentStatus::Cancelled;
            result.error = Some(e.to_string());
        }
        Err(e) => {
            result.status = AgentStatus::Failed;
            result.error = Some(e.to_string());
        }
    }
    result
}
