//! End-to-end pipeline scenarios through the real engine, handlers, and
//! on-disk artifacts.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use waypoint_llm::testing::{text_response, ScriptedProvider};
use waypoint_llm::LlmClient;
use waypoint_pipeline::{
    base_registry, default_registry, Answer, BackoffPolicy, CodergenConfig, CodergenHandler,
    EngineConfig, FileBasedInterviewer, HumanGateHandler, PipelineEngine, PipelineGraph,
    RecordingInterviewer,
};
use waypoint_types::{StageStatus, WaypointError};

fn parse_graph(dot: &str) -> PipelineGraph {
    let parsed = waypoint_dot::parse(dot).unwrap();
    PipelineGraph::from_dot(parsed).unwrap()
}

fn engine_config(logs_root: &std::path::Path) -> EngineConfig {
    EngineConfig {
        logs_root: logs_root.to_path_buf(),
        backoff: BackoffPolicy::None,
        max_steps: 200,
        ..Default::default()
    }
}

fn scripted_client(responses: Vec<waypoint_llm::Response>) -> Arc<LlmClient> {
    let mut client = LlmClient::new();
    client.register_provider(ScriptedProvider::new(responses));
    Arc::new(client)
}

fn codergen_config(workspace: &std::path::Path) -> CodergenConfig {
    CodergenConfig {
        workspace: workspace.to_path_buf(),
        default_provider: "scripted".into(),
        ..Default::default()
    }
}

fn cancel() -> CancellationToken {
    CancellationToken::new()
}

// ---------------------------------------------------------------------------
// Scenario: linear pipeline with goal expansion and artifacts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn linear_pipeline_expands_goal_and_writes_artifacts() {
    let logs = tempfile::tempdir().unwrap();
    let workspace = tempfile::tempdir().unwrap();

    let graph = parse_graph(
        r#"digraph G {
            goal = "Build X"
            start [shape="Mdiamond"]
            plan [shape="box", prompt="Plan: $goal"]
            implement [shape="box", prompt="Implement the plan"]
            finish [shape="Msquare"]
            start -> plan -> implement -> finish
        }"#,
    );

    let client = scripted_client(vec![
        text_response("Here is the plan."),
        text_response("Implemented."),
    ]);
    let mut registry = base_registry();
    registry.register(CodergenHandler::new(client, codergen_config(workspace.path())));
    let engine = PipelineEngine::new(registry, engine_config(logs.path()));

    let result = engine.run(graph, &cancel()).await.unwrap();

    assert_eq!(result.status, StageStatus::Success);
    assert_eq!(
        result.completed_nodes,
        vec!["start", "plan", "implement", "finish"]
    );

    // result.json exists iff the run terminated via the exit node
    let run_result = waypoint_pipeline::read_result(logs.path()).await.unwrap();
    assert_eq!(run_result.status, StageStatus::Success);
    assert_eq!(run_result.completed_nodes.last().unwrap(), "finish");
    assert!(chrono::DateTime::parse_from_rfc3339(&run_result.finished).is_ok());

    // $goal expanded into the prompt artifact, no literal "$goal" left
    let prompt = std::fs::read_to_string(logs.path().join("plan/prompt.md")).unwrap();
    assert_eq!(prompt, "Plan: Build X");

    // Per-node status artifacts
    for node in ["start", "plan", "implement", "finish"] {
        let status = waypoint_pipeline::read_status(logs.path(), node).await.unwrap();
        assert_eq!(status.status, StageStatus::Success, "node {}", node);
    }
}

// ---------------------------------------------------------------------------
// Scenario: conditional branching on outcome
// ---------------------------------------------------------------------------

#[tokio::test]
async fn conditional_branching_takes_success_path() {
    let logs = tempfile::tempdir().unwrap();
    let workspace = tempfile::tempdir().unwrap();

    let graph = parse_graph(
        r#"digraph G {
            start [shape="Mdiamond"]
            work [shape="box", prompt="Do the work"]
            path_a [shape="box", prompt="Success path"]
            finish [shape="Msquare"]
            start -> work
            work -> path_a [condition="outcome=success"]
            work -> finish [condition="outcome=fail"]
            path_a -> finish
        }"#,
    );

    let client = scripted_client(vec![
        text_response("work done"),
        text_response("path_a done"),
    ]);
    let mut registry = base_registry();
    registry.register(CodergenHandler::new(client, codergen_config(workspace.path())));
    let engine = PipelineEngine::new(registry, engine_config(logs.path()));

    let result = engine.run(graph, &cancel()).await.unwrap();
    assert!(result.completed_nodes.contains(&"path_a".to_string()));
}

// ---------------------------------------------------------------------------
// Scenario: codergen retry with recovery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn codergen_retry_recovers_on_second_attempt() {
    let logs = tempfile::tempdir().unwrap();
    let workspace = tempfile::tempdir().unwrap();

    let graph = parse_graph(
        r#"digraph G {
            start [shape="Mdiamond"]
            work [shape="box", prompt="Try hard", max_retries=2]
            finish [shape="Msquare"]
            start -> work -> finish
        }"#,
    );

    // First provider call errors (sentinel -> retry), second succeeds
    let mut client = LlmClient::new();
    client.register_provider(ScriptedProvider::from_results(vec![
        Err(WaypointError::ProviderError {
            provider: "scripted".into(),
            status: 503,
            message: "temporarily unavailable".into(),
        }),
        Ok(text_response("recovered on attempt two")),
    ]));
    let client = Arc::new(client);

    let mut registry = base_registry();
    registry.register(CodergenHandler::new(
        client,
        codergen_config(workspace.path()),
    ));
    let engine = PipelineEngine::new(registry, engine_config(logs.path()));

    let result = engine.run(graph, &cancel()).await.unwrap();
    assert_eq!(result.status, StageStatus::Success);

    let response = std::fs::read_to_string(logs.path().join("work/response.md")).unwrap();
    assert_eq!(response, "recovered on attempt two");
}

// ---------------------------------------------------------------------------
// Scenario: human gate routes on the selected option
// ---------------------------------------------------------------------------

#[tokio::test]
async fn human_gate_answer_routes_matching_edge() {
    let logs = tempfile::tempdir().unwrap();
    let workspace = tempfile::tempdir().unwrap();

    let graph = parse_graph(
        r#"digraph G {
            start [shape="Mdiamond"]
            review [shape="hexagon", prompt="Ship it?"]
            ship [shape="box", prompt="Ship"]
            rework [shape="box", prompt="Rework"]
            finish [shape="Msquare"]
            start -> review
            review -> ship [label="Approve"]
            review -> rework [label="Reject"]
            ship -> finish
            rework -> finish
        }"#,
    );

    let interviewer = Arc::new(RecordingInterviewer::new(vec![Answer {
        text: "Reject".into(),
        selected_options: vec!["Reject".into()],
    }]));
    let client = scripted_client(vec![text_response("reworked")]);

    let mut registry = base_registry();
    registry.register(CodergenHandler::new(client, codergen_config(workspace.path())));
    registry.register(HumanGateHandler::new(interviewer.clone()));
    let engine = PipelineEngine::new(registry, engine_config(logs.path()));

    let result = engine.run(graph, &cancel()).await.unwrap();
    assert!(result.completed_nodes.contains(&"rework".to_string()));
    assert!(!result.completed_nodes.contains(&"ship".to_string()));

    let questions = interviewer.questions();
    assert_eq!(questions.len(), 1);
    assert_eq!(questions[0].options, vec!["Approve", "Reject"]);
}

// ---------------------------------------------------------------------------
// Scenario: parallel fan-out merges branches and resumes at the join
// ---------------------------------------------------------------------------

#[tokio::test]
async fn parallel_fan_out_joins_at_fan_in() {
    let logs = tempfile::tempdir().unwrap();
    let workspace = tempfile::tempdir().unwrap();

    let graph = parse_graph(
        r#"digraph G {
            start [shape="Mdiamond"]
            fork [shape="component"]
            branch_a [shape="box", prompt="A"]
            branch_b [shape="box", prompt="B"]
            join [shape="tripleoctagon"]
            finish [shape="Msquare"]
            start -> fork
            fork -> branch_a
            fork -> branch_b
            branch_a -> join
            branch_b -> join
            join -> finish
        }"#,
    );

    let client = scripted_client(vec![
        text_response("branch response 1"),
        text_response("branch response 2"),
    ]);
    let mut registry = base_registry();
    registry.register(CodergenHandler::new(client, codergen_config(workspace.path())));
    let engine = PipelineEngine::new(registry, engine_config(logs.path()));

    let result = engine.run(graph, &cancel()).await.unwrap();
    assert_eq!(result.status, StageStatus::Success);

    // The engine resumed at the join, not inside a branch
    assert!(result.completed_nodes.contains(&"join".to_string()));
    assert!(!result.completed_nodes.contains(&"branch_a".to_string()));
    assert!(!result.completed_nodes.contains(&"branch_b".to_string()));

    // But both branches executed inside the fan-out handler
    assert!(logs.path().join("branch_a/prompt.md").exists());
    assert!(logs.path().join("branch_b/prompt.md").exists());
}

// ---------------------------------------------------------------------------
// Scenario: tool-shell node writes stdout/stderr artifacts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tool_shell_node_executes_command() {
    let logs = tempfile::tempdir().unwrap();

    let graph = parse_graph(
        r#"digraph G {
            start [shape="Mdiamond"]
            run [shape="parallelogram", command="echo pipeline works"]
            finish [shape="Msquare"]
            start -> run -> finish
        }"#,
    );

    let engine = PipelineEngine::new(base_registry(), engine_config(logs.path()));
    let result = engine.run(graph, &cancel()).await.unwrap();

    assert_eq!(result.status, StageStatus::Success);
    let stdout = std::fs::read_to_string(logs.path().join("run/stdout.txt")).unwrap();
    assert!(stdout.contains("pipeline works"));
}

// ---------------------------------------------------------------------------
// Scenario: file-based gate protocol against the live engine
// ---------------------------------------------------------------------------

#[tokio::test]
async fn file_gate_protocol_round_trip_through_engine() {
    let logs = tempfile::tempdir().unwrap();
    let gates = tempfile::tempdir().unwrap();
    let workspace = tempfile::tempdir().unwrap();

    let graph = parse_graph(
        r#"digraph G {
            start [shape="Mdiamond"]
            approve [shape="hexagon", prompt="Continue?"]
            work [shape="box", prompt="w"]
            finish [shape="Msquare"]
            start -> approve
            approve -> work [label="Yes"]
            work -> finish
        }"#,
    );

    let interviewer = Arc::new(
        FileBasedInterviewer::new(gates.path())
            .with_poll_interval(std::time::Duration::from_millis(20)),
    );
    let client = scripted_client(vec![text_response("done")]);
    let registry = default_registry(client, codergen_config(workspace.path()), interviewer);
    let engine = PipelineEngine::new(registry, engine_config(logs.path()));

    // Answer the gate from "outside" once the pending sentinel appears
    let gates_root = gates.path().to_path_buf();
    let answerer = tokio::spawn(async move {
        loop {
            if let Ok(gate_id) =
                tokio::fs::read_to_string(gates_root.join(waypoint_pipeline::PENDING_FILE)).await
            {
                let gate_dir = gates_root.join(gate_id.trim());
                let question: waypoint_pipeline::GateQuestion = serde_json::from_str(
                    &tokio::fs::read_to_string(gate_dir.join("question.json"))
                        .await
                        .unwrap(),
                )
                .unwrap();
                assert_eq!(question.text, "Continue?");
                assert_eq!(question.options, vec!["Yes"]);

                let answer = Answer {
                    text: "Yes".into(),
                    selected_options: vec!["Yes".into()],
                };
                tokio::fs::write(
                    gate_dir.join("answer.json"),
                    serde_json::to_string(&answer).unwrap(),
                )
                .await
                .unwrap();
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    });

    let result = engine.run(graph, &cancel()).await.unwrap();
    answerer.await.unwrap();

    assert_eq!(result.status, StageStatus::Success);
    assert!(result.completed_nodes.contains(&"work".to_string()));
    // Consuming the answer removed the pending sentinel
    assert!(!gates.path().join(waypoint_pipeline::PENDING_FILE).exists());
}

// ---------------------------------------------------------------------------
// Scenario: checkpoint reflects completed nodes after every step
// ---------------------------------------------------------------------------

#[tokio::test]
async fn checkpoint_tracks_completions() {
    let logs = tempfile::tempdir().unwrap();
    let workspace = tempfile::tempdir().unwrap();

    let graph = parse_graph(
        r#"digraph G {
            start [shape="Mdiamond"]
            work [shape="box", prompt="w"]
            finish [shape="Msquare"]
            start -> work -> finish
        }"#,
    );

    let client = scripted_client(vec![text_response("done")]);
    let mut registry = base_registry();
    registry.register(CodergenHandler::new(client, codergen_config(workspace.path())));
    let engine = PipelineEngine::new(registry, engine_config(logs.path()));

    engine.run(graph, &cancel()).await.unwrap();

    let checkpoint = waypoint_pipeline::load_checkpoint(logs.path())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        checkpoint.completed_nodes,
        vec!["start", "work", "finish"]
    );
    assert_eq!(
        checkpoint.context.get("goal").map(String::as_str),
        Some("")
    );
}

// ---------------------------------------------------------------------------
// Scenario: stylesheet specificity resolves per-node models
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stylesheet_specificity_scenario() {
    let mut graph = parse_graph(
        r#"digraph G {
            model_stylesheet = "* { model = \"default\" } box { model = \"m-box\" } .fast { model = \"m-fast\" } #n1 { model = \"m-id\" }"
            n1 [shape="box", class="fast"]
            n2 [shape="box", class="fast"]
            n3 [shape="box"]
            n4 [shape="diamond"]
        }"#,
    );

    waypoint_pipeline::apply_transforms(&mut graph).unwrap();

    let model = |id: &str| graph.node(id).unwrap().llm_model.clone().unwrap();
    assert_eq!(model("n1"), "m-id");
    assert_eq!(model("n2"), "m-fast");
    assert_eq!(model("n3"), "m-box");
    assert_eq!(model("n4"), "default");
}

// ---------------------------------------------------------------------------
// Scenario: dry run needs no provider at all
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dry_run_completes_without_provider() {
    let logs = tempfile::tempdir().unwrap();
    let workspace = tempfile::tempdir().unwrap();

    // Custom start handler injecting dry_run into the context
    use async_trait::async_trait;
    use waypoint_pipeline::{HandlerScope, NodeHandler};
    use waypoint_types::{Context, Outcome};

    struct DryRunStart;

    #[async_trait]
    impl NodeHandler for DryRunStart {
        fn handler_type(&self) -> &str {
            "start"
        }
        async fn execute(
            &self,
            _node: &waypoint_pipeline::PipelineNode,
            _ctx: &Context,
            _scope: &HandlerScope<'_>,
        ) -> waypoint_types::Result<Outcome> {
            let mut outcome = Outcome::success("started dry");
            outcome.context_updates.insert("dry_run".into(), "true".into());
            Ok(outcome)
        }
    }

    let graph = parse_graph(
        r#"digraph G {
            start [shape="Mdiamond"]
            work [shape="box", prompt="w"]
            finish [shape="Msquare"]
            start -> work -> finish
        }"#,
    );

    let mut registry = base_registry();
    registry.register(DryRunStart);
    registry.register(CodergenHandler::new(
        Arc::new(LlmClient::new()),
        codergen_config(workspace.path()),
    ));
    let engine = PipelineEngine::new(registry, engine_config(logs.path()));

    let result = engine.run(graph, &cancel()).await.unwrap();
    assert_eq!(result.status, StageStatus::Success);
    let response = std::fs::read_to_string(logs.path().join("work/response.md")).unwrap();
    assert_eq!(response, "(dry run)");
}
