use anyhow::Context;
use clap::{Parser, Subcommand};
use conclave_orchestrator::{
    AgentConfig, AgentRunner, CancellationToken, Debate, EchoRunner, FanOut, MapReduce,
    Orchestrator, OrchestratorConfig, PatternFailure, Pipeline, PipelineStage,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "conclave.toml";

#[derive(Parser, Debug)]
#[command(name = "conclave", about = "Conclave: multi-agent orchestration dry runs")]
struct Cli {
    /// Path to config file (defaults to ./conclave.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Per-participant timeout in seconds (overrides config)
    #[arg(long)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send one message to several agents at once
    FanOut {
        /// Role of each agent; repeat for more agents
        #[arg(long = "role", required = true)]
        roles: Vec<String>,
        message: String,
    },
    /// Chain agents, feeding each stage the previous response
    Pipeline {
        /// Role of each stage, in order
        #[arg(long = "stage", required = true)]
        stages: Vec<String>,
        input: String,
    },
    /// Pro/con rounds followed by a synthesis
    Debate {
        /// Number of rounds (overrides config)
        #[arg(long)]
        rounds: Option<u32>,
        #[arg(long, default_value = "pro")]
        pro: String,
        #[arg(long, default_value = "con")]
        con: String,
        #[arg(long, default_value = "synthesizer")]
        judge: String,
        topic: String,
    },
    /// Map every input with its own agent, then reduce
    MapReduce {
        #[arg(long, default_value = "mapper")]
        mapper: String,
        #[arg(long, default_value = "reducer")]
        reducer: String,
        #[arg(required = true)]
        inputs: Vec<String>,
    },
}

#[derive(Deserialize, Debug, Default)]
struct ConclaveConfig {
    #[serde(default)]
    log: LogConfig,
    #[serde(default)]
    runner: RunnerConfig,
    #[serde(default)]
    orchestrator: OrchestratorConfig,
}

#[derive(Deserialize, Debug)]
struct LogConfig {
    #[serde(default = "default_log_level")]
    level: String,
    #[serde(default)]
    format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Deserialize, Debug, Default)]
struct RunnerConfig {
    /// Artificial latency of the echo runner.
    #[serde(default)]
    delay_ms: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ConclaveConfig> {
    let (path, required) = match path {
        Some(path) => (path, true),
        None => (Path::new(DEFAULT_CONFIG), false),
    };
    if !required && !path.exists() {
        return Ok(ConclaveConfig::default());
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    let config: ConclaveConfig = toml::from_str(&raw)
        .with_context(|| format!("Invalid config file '{}'", path.display()))?;
    config.orchestrator.validate()?;
    Ok(config)
}

fn init_tracing(log: &LogConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print what was gathered before the failure, then surface the error.
fn report_failure(failure: PatternFailure) -> anyhow::Result<()> {
    if !failure.partial.is_empty() {
        print_json(&failure.partial)?;
    }
    Err(failure.into())
}

async fn execute(
    command: Commands,
    orchestrator: &Orchestrator,
    cancel: &CancellationToken,
    timeout: Duration,
) -> anyhow::Result<()> {
    match command {
        Commands::FanOut { roles, message } => {
            let agents = roles.into_iter().map(AgentConfig::new).collect();
            match FanOut::new(agents)
                .run(orchestrator, cancel, &message, timeout)
                .await
            {
                Ok(results) => print_json(&results),
                Err(failure) => report_failure(failure),
            }
        }
        Commands::Pipeline { stages, input } => {
            let stages = stages
                .into_iter()
                .map(|role| PipelineStage::new(AgentConfig::new(role)))
                .collect();
            match Pipeline::new(stages)
                .run(orchestrator, cancel, &input, timeout)
                .await
            {
                Ok(result) => print_json(&result),
                Err(failure) => report_failure(failure),
            }
        }
        Commands::Debate {
            rounds,
            pro,
            con,
            judge,
            topic,
        } => {
            let rounds = rounds.unwrap_or(orchestrator.config().debate_rounds);
            let debate = Debate::new(
                AgentConfig::new(pro),
                AgentConfig::new(con),
                AgentConfig::new(judge),
            )
            .with_rounds(rounds);
            match debate.run(orchestrator, cancel, &topic, timeout).await {
                Ok(result) => print_json(&result),
                Err(failure) => report_failure(failure),
            }
        }
        Commands::MapReduce {
            mapper,
            reducer,
            inputs,
        } => {
            let map_reduce = MapReduce::new(AgentConfig::new(mapper), AgentConfig::new(reducer));
            match map_reduce.run(orchestrator, cancel, inputs.as_slice(), timeout).await {
                Ok(result) => print_json(&result),
                Err(failure) => report_failure(failure),
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config.log);

    let timeout = cli
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.orchestrator.default_timeout());

    let runner: Arc<dyn AgentRunner> =
        Arc::new(EchoRunner::new().with_delay(Duration::from_millis(config.runner.delay_ms)));
    let orchestrator = Orchestrator::with_config(runner, config.orchestrator);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling running agents");
            on_interrupt.cancel();
        }
    });

    let outcome = execute(cli.command, &orchestrator, &cancel, timeout).await;

    let stats = orchestrator.stats().await;
    info!(
        agents = stats.total_agents,
        completed = stats.completed,
        failed = stats.failed,
        cancelled = stats.cancelled,
        tokens = stats.tokens_used,
        "Run finished"
    );
    orchestrator.shutdown().await?;

    outcome
}
