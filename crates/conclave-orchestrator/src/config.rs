use conclave_core::{ConclaveError, ConclaveResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables for an [`Orchestrator`](crate::Orchestrator) and its patterns.
///
/// Read from the `[orchestrator]` table of `conclave.toml`:
///
/// ```toml
/// [orchestrator]
/// poll_interval_ms = 10
/// default_timeout_secs = 300
/// debate_rounds = 2
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// How often waiting helpers re-check agent status.
    pub poll_interval_ms: u64,
    /// Timeout used when a caller does not supply one.
    pub default_timeout_secs: u64,
    /// Rounds used by the CLI debate command when none is given.
    pub debate_rounds: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            default_timeout_secs: 300,
            debate_rounds: 1,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    orchestrator: OrchestratorConfig,
}

impl OrchestratorConfig {
    /// Parse the `[orchestrator]` table out of a TOML document.
    pub fn from_toml_str(raw: &str) -> ConclaveResult<Self> {
        let file: ConfigFile =
            toml::from_str(raw).map_err(|e| ConclaveError::Config(e.to_string()))?;
        file.orchestrator.validate()?;
        Ok(file.orchestrator)
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> ConclaveResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Reject zero intervals, timeouts and round counts.
    pub fn validate(&self) -> ConclaveResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(ConclaveError::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.default_timeout_secs == 0 {
            return Err(ConclaveError::Config(
                "default_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.debate_rounds == 0 {
            return Err(ConclaveError::Config(
                "debate_rounds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Default per-participant timeout as a [`Duration`].
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}
