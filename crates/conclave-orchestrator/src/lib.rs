//! Multi-agent orchestration engine.
//!
//! Creates independent agents, dispatches work to them concurrently, tracks
//! their lifecycle (idle → running → completed / failed / cancelled) and lets
//! them communicate through versioned shared contexts. On top of that sit
//! composition patterns: fan-out, pipeline, debate and map-reduce.
//!
//! The work itself is done by an injected [`AgentRunner`].
//!
//! # Main types
//!
//! - [`Orchestrator`] — Agent registry, lifecycle and cancellation.
//! - [`SharedContext`] — Versioned key/value store with change listeners.
//! - [`AgentRunner`] — The capability that performs an agent's task.
//! - [`FanOut`], [`Pipeline`], [`Debate`], [`MapReduce`] — Execution patterns.
//! - [`AgentMonitor`] — Per-role run metrics.
//! - [`OrchestratorConfig`] — Polling and timeout settings.

/// Orchestrator settings loaded from TOML.
pub mod config;
/// Shared, versioned key/value context.
pub mod context;
/// Agent registry, lifecycle and cancellation.
pub mod engine;
/// Run metrics and status counts.
pub mod monitor;
/// Fan-out, pipeline, debate and map-reduce.
pub mod patterns;
/// The agent runner seam and the built-in echo runner.
pub mod runner;
/// Agent configuration, status and result types.
pub mod types;

pub use config::OrchestratorConfig;
pub use context::{ChangeEvent, ChangeListener, ChangeType, ContextScope, SharedContext};
pub use engine::Orchestrator;
pub use monitor::{AgentMonitor, OrchestratorStats, RoleMetrics};
pub use patterns::{
    Debate, DebateResult, FanOut, MapReduce, MapReduceResult, PatternFailure, PatternResult,
    Pipeline, PipelineResult, PipelineStage, TransformFn,
};
pub use runner::{AgentRunner, EchoRunner, RunOutput};
pub use types::{AgentConfig, AgentResult, AgentStatus, AgentSummary};

pub use tokio_util::sync::CancellationToken;
