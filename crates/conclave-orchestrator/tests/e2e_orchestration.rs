//! End-to-end orchestration tests.
//!
//! Drives the orchestrator and every execution pattern with a scripted
//! runner whose behaviour depends on the agent role. Checks lifecycle
//! transitions, cancellation, output flow between participants and the
//! positional errors reported on failure.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use conclave_core::{ConclaveError, ConclaveResult};
use conclave_orchestrator::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Scripted runner: deterministic behaviour per role
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RoleRunner {
    /// Every (role, input) pair received, in arrival order.
    prompts: Mutex<Vec<(String, String)>>,
}

impl RoleRunner {
    fn prompts_for(&self, role: &str) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| r == role)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl AgentRunner for RoleRunner {
    async fn run(
        &self,
        cancel: CancellationToken,
        _agent_id: Uuid,
        config: &AgentConfig,
        input: &str,
        context: Arc<SharedContext>,
    ) -> ConclaveResult<RunOutput> {
        self.prompts
            .lock()
            .unwrap()
            .push((config.role.clone(), input.to_string()));

        let response = match config.role.as_str() {
            "append-a" => format!("{input}A"),
            "append-b" => format!("{input}B"),
            "append-c" => format!("{input}C"),
            "fail" => return Err(ConclaveError::Agent("stage exploded".to_string())),
            "slow" => {
                cancel.cancelled().await;
                return Err(ConclaveError::Cancelled);
            }
            "pro" => format!("PRO[{}]", input.len()),
            "con" => format!("CON[{}]", input.len()),
            "stubborn-con" => {
                if input.starts_with("Debate topic:") {
                    return Err(ConclaveError::Agent("no rebuttal".to_string()));
                }
                format!("CON[{}]", input.len())
            }
            "judge" => format!("Both sides have merit ({} chars considered)", input.len()),
            "mapper" => {
                if input == "explode" {
                    return Err(ConclaveError::Agent("cannot map".to_string()));
                }
                let mapped = input.to_uppercase();
                context.set(format!("mapped:{input}"), mapped.clone());
                mapped
            }
            "broken-reducer" => return Err(ConclaveError::Agent("cannot reduce".to_string())),
            "reducer" => {
                let mut keys = context.keys();
                keys.sort();
                format!("{input}| side-channel: {}", keys.join(","))
            }
            role => format!("{role} answers: {input}"),
        };

        Ok(RunOutput::new(response, 10))
    }
}

fn setup() -> (Arc<RoleRunner>, Orchestrator) {
    let runner = Arc::new(RoleRunner::default());
    let config = OrchestratorConfig {
        poll_interval_ms: 5,
        ..OrchestratorConfig::default()
    };
    let orchestrator = Orchestrator::with_config(runner.clone(), config);
    (runner, orchestrator)
}

const TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lifecycle_idle_running_completed() {
    let (_, orch) = setup();
    let id = orch.create_agent(AgentConfig::new("writer")).await.unwrap();
    assert_eq!(orch.agent_status(id).await.unwrap(), AgentStatus::Idle);

    orch.send_to_agent(&CancellationToken::new(), id, "hello")
        .await
        .unwrap();

    let results = orch.collect_results(TIMEOUT).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, AgentStatus::Completed);
    assert_eq!(results[0].response, "writer answers: hello");

    let stored = orch.agent_result(id).await.unwrap().unwrap();
    assert_eq!(stored.status, AgentStatus::Completed);
    assert_eq!(orch.agent_status(id).await.unwrap(), AgentStatus::Completed);
}

#[tokio::test]
async fn concurrent_sends_admit_exactly_one() {
    let (_, orch) = setup();
    let id = orch.create_agent(AgentConfig::new("slow")).await.unwrap();
    let cancel = CancellationToken::new();

    let attempts = (0..16).map(|i| orch.send_to_agent(&cancel, id, format!("msg {i}")));
    let outcomes = futures_util::future::join_all(attempts).await;

    let accepted = outcomes.iter().filter(|o| o.is_ok()).count();
    let busy = outcomes
        .iter()
        .filter(|o| matches!(o, Err(ConclaveError::AgentBusy(_))))
        .count();
    assert_eq!(accepted, 1);
    assert_eq!(busy, 15);

    cancel.cancel();
}

#[tokio::test]
async fn cancelling_parent_marks_agent_cancelled() {
    let (_, orch) = setup();
    let id = orch.create_agent(AgentConfig::new("slow")).await.unwrap();
    let cancel = CancellationToken::new();
    orch.send_to_agent(&cancel, id, "long task").await.unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(orch.agent_status(id).await.unwrap(), AgentStatus::Running);
    assert!(orch.agent_result(id).await.unwrap().is_none());

    cancel.cancel();
    let results = orch.collect_results(TIMEOUT).await;
    assert_eq!(results[0].status, AgentStatus::Cancelled);
    assert!(results[0].error.is_some());
}

#[tokio::test]
async fn terminal_status_always_has_result() {
    let (_, orch) = setup();
    let cancel = CancellationToken::new();
    let id = orch.create_agent(AgentConfig::new("writer")).await.unwrap();
    orch.send_to_agent(&cancel, id, "x").await.unwrap();

    loop {
        let status = orch.agent_status(id).await.unwrap();
        if status.is_terminal() {
            let result = orch.agent_result(id).await.unwrap();
            assert_eq!(result.map(|r| r.status), Some(status));
            break;
        }
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn shutdown_is_single_use() {
    let (_, orch) = setup();
    orch.shutdown().await.unwrap();
    assert!(matches!(
        orch.shutdown().await,
        Err(ConclaveError::OrchestratorShutdown)
    ));
    assert!(matches!(
        orch.create_agent(AgentConfig::new("late")).await,
        Err(ConclaveError::OrchestratorShutdown)
    ));
}

#[tokio::test]
async fn broadcast_reaches_global_context() {
    let (_, orch) = setup();
    orch.broadcast_context("deadline", "friday").await.unwrap();
    assert_eq!(orch.global_context().get_string("deadline"), "friday");
    assert_eq!(orch.global_context().version(), 1);
    assert!(orch.group_context("team").get("deadline").is_none());
}

// ---------------------------------------------------------------------------
// FanOut
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fan_out_three_agents() {
    let (runner, orch) = setup();
    let fan_out = FanOut::new(vec![
        AgentConfig::new("historian"),
        AgentConfig::new("economist"),
        AgentConfig::new("engineer"),
    ]);

    let results = fan_out
        .run(&orch, &CancellationToken::new(), "why did Rome fall?", TIMEOUT)
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.status == AgentStatus::Completed));
    assert_eq!(results[0].response, "historian answers: why did Rome fall?");
    assert_eq!(results[1].response, "economist answers: why did Rome fall?");
    assert_eq!(results[2].response, "engineer answers: why did Rome fall?");

    for role in ["historian", "economist", "engineer"] {
        assert_eq!(runner.prompts_for(role), vec!["why did Rome fall?"]);
    }
}

#[tokio::test]
async fn fan_out_empty_is_empty() {
    let (_, orch) = setup();
    let results = FanOut::new(Vec::new())
        .run(&orch, &CancellationToken::new(), "anything", TIMEOUT)
        .await
        .unwrap();
    assert!(results.is_empty());
    assert_eq!(orch.agent_count().await, 0);
}

#[tokio::test]
async fn fan_out_timeout_returns_partial_snapshot() {
    let (_, orch) = setup();
    let cancel = CancellationToken::new();
    let results = FanOut::new(vec![AgentConfig::new("quick"), AgentConfig::new("slow")])
        .run(&orch, &cancel, "go", Duration::from_millis(50))
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].status, AgentStatus::Completed);
    assert_eq!(results[1].status, AgentStatus::Running);
    assert!(results[1].response.is_empty());

    cancel.cancel();
    let settled = orch.collect_results(TIMEOUT).await;
    assert_eq!(settled[1].status, AgentStatus::Cancelled);
}

#[tokio::test]
async fn fan_out_only_reports_its_own_agents() {
    let (_, orch) = setup();
    orch.create_agent(AgentConfig::new("bystander")).await.unwrap();

    let results = FanOut::new(vec![AgentConfig::new("a"), AgentConfig::new("b")])
        .run(&orch, &CancellationToken::new(), "hi", TIMEOUT)
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(orch.agent_count().await, 3);
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pipeline_feeds_output_forward() {
    let (runner, orch) = setup();
    let pipeline = Pipeline::new(vec![
        PipelineStage::new(AgentConfig::new("append-a")),
        PipelineStage::new(AgentConfig::new("append-b")),
        PipelineStage::new(AgentConfig::new("append-c")),
    ]);

    let out = pipeline
        .run(&orch, &CancellationToken::new(), "start:", TIMEOUT)
        .await
        .unwrap();

    assert_eq!(out.final_output, "start:ABC");
    assert_eq!(out.stage_results.len(), 3);
    assert_eq!(runner.prompts_for("append-b"), vec!["start:A"]);
    assert_eq!(runner.prompts_for("append-c"), vec!["start:AB"]);
}

#[tokio::test]
async fn pipeline_applies_transform() {
    let (runner, orch) = setup();
    let pipeline = Pipeline::new(vec![
        PipelineStage::new(AgentConfig::new("append-a")),
        PipelineStage::new(AgentConfig::new("append-b"))
            .with_transform(|prev| format!("Review this: {prev}")),
    ]);

    let out = pipeline
        .run(&orch, &CancellationToken::new(), "x", TIMEOUT)
        .await
        .unwrap();

    assert_eq!(runner.prompts_for("append-b"), vec!["Review this: xA"]);
    assert_eq!(out.final_output, "Review this: xAB");
}

#[tokio::test]
async fn pipeline_middle_stage_failure_aborts() {
    let (runner, orch) = setup();
    let pipeline = Pipeline::new(vec![
        PipelineStage::new(AgentConfig::new("append-a")),
        PipelineStage::new(AgentConfig::new("fail")),
        PipelineStage::new(AgentConfig::new("append-c")),
    ]);

    let failure = pipeline
        .run(&orch, &CancellationToken::new(), "in", TIMEOUT)
        .await
        .unwrap_err();

    let msg = failure.to_string();
    assert!(msg.contains("stage 1"), "unexpected error: {msg}");
    assert!(msg.contains("stage exploded"));
    assert_eq!(failure.partial.len(), 1);
    assert_eq!(failure.partial[0].response, "inA");
    assert!(runner.prompts_for("append-c").is_empty());
}

#[tokio::test]
async fn pipeline_empty_is_empty() {
    let (_, orch) = setup();
    let out = Pipeline::new(Vec::new())
        .run(&orch, &CancellationToken::new(), "ignored", TIMEOUT)
        .await
        .unwrap();
    assert!(out.stage_results.is_empty());
    assert!(out.final_output.is_empty());
}

#[tokio::test]
async fn pipeline_stage_timeout_cancels_stage() {
    let (_, orch) = setup();
    let pipeline = Pipeline::new(vec![
        PipelineStage::new(AgentConfig::new("append-a")),
        PipelineStage::new(AgentConfig::new("slow")),
    ]);

    let failure = pipeline
        .run(&orch, &CancellationToken::new(), "", Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(failure.error, ConclaveError::Timeout(_)));
    let msg = failure.to_string();
    assert!(msg.contains("pipeline stage 1 (2/2) timed out"), "unexpected error: {msg}");
    assert_eq!(failure.partial.len(), 1);

    let settled = orch.collect_results(TIMEOUT).await;
    assert_eq!(settled[1].status, AgentStatus::Cancelled);
}

// ---------------------------------------------------------------------------
// Debate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn debate_two_rounds() {
    let (runner, orch) = setup();
    let debate = Debate::new(
        AgentConfig::new("pro"),
        AgentConfig::new("con"),
        AgentConfig::new("judge"),
    )
    .with_rounds(2);

    let topic = "Should the gateway cache model responses?";
    let out = debate
        .run(&orch, &CancellationToken::new(), topic, TIMEOUT)
        .await
        .unwrap();

    assert_eq!(out.pro_arguments.len(), 2);
    assert_eq!(out.con_arguments.len(), 2);
    assert!(!out.synthesis.is_empty());
    assert_eq!(out.results.len(), 5);

    // Round 1 sees the bare topic, round 2 sees both prior arguments.
    let pro_prompts = runner.prompts_for("pro");
    assert_eq!(pro_prompts[0], topic);
    assert!(pro_prompts[1].contains(topic));
    assert!(pro_prompts[1].contains(&out.pro_arguments[0]));
    assert!(pro_prompts[1].contains(&out.con_arguments[0]));
    assert_eq!(runner.prompts_for("con"), pro_prompts);

    let judge_prompt = &runner.prompts_for("judge")[0];
    for argument in out.pro_arguments.iter().chain(&out.con_arguments) {
        assert!(judge_prompt.contains(argument.as_str()));
    }
}

#[tokio::test]
async fn debate_failure_names_side_and_round() {
    let (_, orch) = setup();
    let debate = Debate::new(
        AgentConfig::new("pro"),
        AgentConfig::new("fail"),
        AgentConfig::new("judge"),
    );

    let failure = debate
        .run(&orch, &CancellationToken::new(), "topic", TIMEOUT)
        .await
        .unwrap_err();
    let msg = failure.to_string();
    assert!(msg.contains("round 1 con"), "unexpected error: {msg}");
    assert!(failure.partial.is_empty());
}

#[tokio::test]
async fn debate_second_round_failure_keeps_first_round() {
    let (runner, orch) = setup();
    let debate = Debate::new(
        AgentConfig::new("pro"),
        AgentConfig::new("stubborn-con"),
        AgentConfig::new("judge"),
    )
    .with_rounds(3);

    let failure = debate
        .run(&orch, &CancellationToken::new(), "topic", TIMEOUT)
        .await
        .unwrap_err();
    let msg = failure.to_string();
    assert!(msg.contains("round 2 con"), "unexpected error: {msg}");
    assert!(msg.contains("no rebuttal"));
    assert_eq!(failure.partial.len(), 2);
    assert!(failure.partial.iter().all(|r| r.is_completed()));
    assert!(runner.prompts_for("judge").is_empty());
}

#[tokio::test]
async fn debate_synthesizer_failure_keeps_all_rounds() {
    let (_, orch) = setup();
    let debate = Debate::new(
        AgentConfig::new("pro"),
        AgentConfig::new("con"),
        AgentConfig::new("fail"),
    )
    .with_rounds(2);

    let failure = debate
        .run(&orch, &CancellationToken::new(), "topic", TIMEOUT)
        .await
        .unwrap_err();
    assert!(failure.to_string().contains("debate synthesizer"));
    assert_eq!(failure.partial.len(), 4);
}

// ---------------------------------------------------------------------------
// MapReduce
// ---------------------------------------------------------------------------

#[tokio::test]
async fn map_reduce_three_inputs() {
    let (runner, orch) = setup();
    let map_reduce = MapReduce::new(AgentConfig::new("mapper"), AgentConfig::new("reducer"));

    let out = map_reduce
        .run(
            &orch,
            &CancellationToken::new(),
            &["alpha", "beta", "gamma"],
            TIMEOUT,
        )
        .await
        .unwrap();

    assert_eq!(out.map_results.len(), 3);
    assert_eq!(out.map_results[0].response, "ALPHA");
    assert_eq!(out.map_results[2].response, "GAMMA");
    assert!(out.final_output.contains("[1] ALPHA"));
    assert!(out.final_output.contains("[2] BETA"));
    assert!(out.final_output.contains("[3] GAMMA"));
    assert_eq!(
        out.reduce_result.map(|r| r.status),
        Some(AgentStatus::Completed)
    );
    assert_eq!(runner.prompts_for("mapper").len(), 3);
}

#[tokio::test]
async fn map_reduce_group_side_channel() {
    let (_, orch) = setup();
    let map_reduce = MapReduce::new(
        AgentConfig::new("mapper").with_group("etl"),
        AgentConfig::new("reducer").with_group("etl"),
    );

    let out = map_reduce
        .run(&orch, &CancellationToken::new(), &["x", "y"], TIMEOUT)
        .await
        .unwrap();

    assert!(out.final_output.ends_with("side-channel: mapped:x,mapped:y"));
    assert_eq!(orch.group_context("etl").get_string("mapped:y"), "Y");
    assert!(orch.global_context().is_empty());
}

#[tokio::test]
async fn map_reduce_mapper_failure_aborts() {
    let (runner, orch) = setup();
    let map_reduce = MapReduce::new(AgentConfig::new("mapper"), AgentConfig::new("reducer"));

    let failure = map_reduce
        .run(
            &orch,
            &CancellationToken::new(),
            &["fine", "explode", "also fine"],
            TIMEOUT,
        )
        .await
        .unwrap_err();

    assert!(failure.to_string().contains("mapper 2"));
    assert!(failure.partial.len() <= 2);
    for result in &failure.partial {
        assert_eq!(result.status, AgentStatus::Completed);
        assert!(["FINE", "ALSO FINE"].contains(&result.response.as_str()));
    }
    assert!(runner.prompts_for("reducer").is_empty());
}

#[tokio::test]
async fn map_reduce_reducer_failure_keeps_every_map_result() {
    let (_, orch) = setup();
    let map_reduce = MapReduce::new(
        AgentConfig::new("mapper"),
        AgentConfig::new("broken-reducer"),
    );

    let failure = map_reduce
        .run(&orch, &CancellationToken::new(), &["a", "b", "c"], TIMEOUT)
        .await
        .unwrap_err();
    let msg = failure.to_string();
    assert!(msg.contains("reducer"), "unexpected error: {msg}");
    assert!(msg.contains("cannot reduce"));
    let responses: Vec<&str> = failure.partial.iter().map(|r| r.response.as_str()).collect();
    assert_eq!(responses, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn map_reduce_empty_is_empty() {
    let (_, orch) = setup();
    let inputs: [&str; 0] = [];
    let out = MapReduce::new(AgentConfig::new("mapper"), AgentConfig::new("reducer"))
        .run(&orch, &CancellationToken::new(), &inputs, TIMEOUT)
        .await
        .unwrap();
    assert!(out.map_results.is_empty());
    assert!(out.reduce_result.is_none());
    assert!(out.final_output.is_empty());
}

// ---------------------------------------------------------------------------
// Monitoring
// ---------------------------------------------------------------------------

#[tokio::test]
async fn monitor_accumulates_across_patterns() {
    let (_, orch) = setup();
    let cancel = CancellationToken::new();
    FanOut::new(vec![AgentConfig::new("a"), AgentConfig::new("a")])
        .run(&orch, &cancel, "one", TIMEOUT)
        .await
        .unwrap();
    let _ = Pipeline::new(vec![PipelineStage::new(AgentConfig::new("fail"))])
        .run(&orch, &cancel, "two", TIMEOUT)
        .await;

    let a = orch.monitor().get("a").await.unwrap();
    assert_eq!(a.runs, 2);
    assert_eq!(a.tokens_used, 20);
    let failed = orch.monitor().get("fail").await.unwrap();
    assert_eq!(failed.failed, 1);

    let stats = orch.stats().await;
    assert_eq!(stats.total_agents, 3);
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.failed, 1);
}
