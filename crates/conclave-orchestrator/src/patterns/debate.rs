use super::{require_completed, PatternFailure, PatternResult};
use crate::engine::Orchestrator;
use crate::types::{AgentConfig, AgentResult};
use conclave_core::{ConclaveError, ConclaveResult};
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Output of a finished debate.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DebateResult {
    /// Pro responses, one per round.
    pub pro_arguments: Vec<String>,
    /// Con responses, one per round.
    pub con_arguments: Vec<String>,
    /// Response of the synthesizer.
    pub synthesis: String,
    /// Every participant result: pro and con per round, then the synthesizer.
    pub results: Vec<AgentResult>,
}

/// Pro and con agents argue for a number of rounds, then a synthesizer weighs both sides.
#[derive(Debug, Clone)]
pub struct Debate {
    pro: AgentConfig,
    con: AgentConfig,
    synthesizer: AgentConfig,
    rounds: u32,
}

impl Debate {
    /// A single-round debate.
    pub fn new(pro: AgentConfig, con: AgentConfig, synthesizer: AgentConfig) -> Self {
        Self {
            pro,
            con,
            synthesizer,
            rounds: 1,
        }
    }

    /// Number of rounds; values below 1 run one round.
    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.rounds = rounds.max(1);
        self
    }

    /// Number of rounds this debate runs.
    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    /// Run the debate on `topic`, waiting up to `timeout` for each participant.
    ///
    /// Each round uses fresh pro and con agents that run concurrently. Any
    /// participant that does not complete aborts the debate with an error
    /// naming its side and round.
    pub async fn run(
        &self,
        orchestrator: &Orchestrator,
        cancel: &CancellationToken,
        topic: &str,
        timeout: Duration,
    ) -> PatternResult<DebateResult> {
        info!(rounds = self.rounds, "Debate: starting");

        let scope = cancel.child_token();
        let _scope_guard = scope.clone().drop_guard();

        let mut outcome = DebateResult::default();

        for round in 1..=self.rounds {
            let prompt = match (outcome.pro_arguments.last(), outcome.con_arguments.last()) {
                (Some(pro), Some(con)) => rebuttal_prompt(topic, pro, con),
                _ => topic.to_string(),
            };

            let (pro, con) = match self
                .run_round(orchestrator, &scope, round, &prompt, timeout)
                .await
            {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(round, error = %e, "Debate: aborting");
                    return Err(PatternFailure::new(e, outcome.results));
                }
            };

            info!(round, "Debate: round completed");
            outcome.pro_arguments.push(pro.response.clone());
            outcome.con_arguments.push(con.response.clone());
            outcome.results.push(pro);
            outcome.results.push(con);
        }

        let prompt = synthesis_prompt(topic, &outcome.pro_arguments, &outcome.con_arguments);
        let synthesis = match self
            .run_synthesizer(orchestrator, &scope, prompt, timeout)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Debate: synthesis failed");
                return Err(PatternFailure::new(e, outcome.results));
            }
        };

        outcome.synthesis = synthesis.response.clone();
        outcome.results.push(synthesis);
        info!("Debate: synthesis completed");
        Ok(outcome)
    }

    async fn run_round(
        &self,
        orchestrator: &Orchestrator,
        scope: &CancellationToken,
        round: u32,
        prompt: &str,
        timeout: Duration,
    ) -> ConclaveResult<(AgentResult, AgentResult)> {
        let pro_id = orchestrator.create_agent(self.pro.clone()).await?;
        let con_id = orchestrator.create_agent(self.con.clone()).await?;
        orchestrator.send_to_agent(scope, pro_id, prompt).await?;
        orchestrator.send_to_agent(scope, con_id, prompt).await?;

        let (pro, con) = tokio::join!(
            orchestrator.wait_for_agent(pro_id, timeout),
            orchestrator.wait_for_agent(con_id, timeout),
        );

        let pro = require_completed(pro?, || format!("debate round {round} pro"), timeout)?;
        let con = require_completed(con?, || format!("debate round {round} con"), timeout)?;
        Ok((pro, con))
    }

    async fn run_synthesizer(
        &self,
        orchestrator: &Orchestrator,
        scope: &CancellationToken,
        prompt: String,
        timeout: Duration,
    ) -> Result<AgentResult, ConclaveError> {
        let id = orchestrator.create_agent(self.synthesizer.clone()).await?;
        orchestrator.send_to_agent(scope, id, prompt).await?;
        let result = orchestrator.wait_for_agent(id, timeout).await?;
        require_completed(result, || "debate synthesizer".to_string(), timeout)
    }
}

fn rebuttal_prompt(topic: &str, pro: &str, con: &str) -> String {
    format!(
        "Debate topic: {topic}\n\n\
         Previous round:\n\
         PRO argument:\n{pro}\n\n\
         CON argument:\n{con}\n\n\
         Respond to the arguments above and strengthen your position."
    )
}

fn synthesis_prompt(topic: &str, pro: &[String], con: &[String]) -> String {
    let mut prompt = format!("Debate topic: {topic}\n\n");
    for (index, (pro, con)) in pro.iter().zip(con).enumerate() {
        prompt.push_str(&format!(
            "Round {}\nPRO: {pro}\nCON: {con}\n\n",
            index + 1
        ));
    }
    prompt.push_str(
        "Provide a balanced synthesis of both positions, weighing the strongest points of each side.",
    );
    prompt
}
