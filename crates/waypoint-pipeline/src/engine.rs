//! Pipeline execution engine — the core traversal loop.
//!
//! Lifecycle: apply transforms, validate, load any checkpoint, then walk
//! the graph one node at a time. Each step runs the node's handler (under
//! an optional per-node timeout), merges context updates, writes
//! `status.json`, applies retry/backoff and fallback policy, appends to the
//! completed list, saves the checkpoint, and selects the next edge. Goal
//! gates are enforced at the exit node; `result.json` is written only when
//! the run terminates through the exit node.

use std::collections::HashMap;
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use waypoint_types::{Context, Outcome, Result, StageStatus, WaypointError};

use crate::artifacts::{write_result, write_status};
use crate::checkpoint::{load_checkpoint, save_checkpoint, PipelineCheckpoint};
use crate::edge_selection::select_edge;
use crate::events::{EventEmitter, PipelineEvent};
use crate::graph::{PipelineGraph, PipelineNode};
use crate::handler::{HandlerRegistry, HandlerScope};
use crate::retry::BackoffPolicy;
use crate::transforms::apply_transforms;
use crate::validation::validate_or_raise;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Configuration for a pipeline run.
pub struct EngineConfig {
    pub logs_root: PathBuf,
    pub backoff: BackoffPolicy,
    /// Hard cap on node executions, a backstop against runaway loops.
    pub max_steps: u64,
    /// Context entries seeded before any node runs (e.g. `workdir`,
    /// `dry_run`). A restored checkpoint overlays these.
    pub initial_context: HashMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            logs_root: PathBuf::from(".waypoint/logs"),
            backoff: BackoffPolicy::default(),
            max_steps: 1000,
            initial_context: HashMap::new(),
        }
    }
}

/// The result of a completed pipeline execution.
#[derive(Debug)]
pub struct PipelineResult {
    pub status: StageStatus,
    pub completed_nodes: Vec<String>,
    pub node_outcomes: HashMap<String, Outcome>,
    pub final_context: HashMap<String, String>,
}

/// The core pipeline engine. Owns a handler registry and drives traversal.
pub struct PipelineEngine {
    registry: HandlerRegistry,
    config: EngineConfig,
    events: EventEmitter,
}

impl PipelineEngine {
    pub fn new(registry: HandlerRegistry, config: EngineConfig) -> Self {
        Self {
            registry,
            config,
            events: EventEmitter::default(),
        }
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    /// Run the full pipeline lifecycle on the given graph.
    pub async fn run(
        &self,
        mut graph: PipelineGraph,
        cancel: &CancellationToken,
    ) -> Result<PipelineResult> {
        let run_start = tokio::time::Instant::now();

        // Transforms, then validation
        apply_transforms(&mut graph)?;
        validate_or_raise(&graph)?;
        let graph = graph;

        let exit_id = graph
            .exit_node()
            .map(|n| n.id.clone())
            .ok_or_else(|| WaypointError::ValidationError("No exit node found".into()))?;
        let start_id = graph
            .start_node()
            .map(|n| n.id.clone())
            .ok_or_else(|| WaypointError::ValidationError("No start node found".into()))?;

        // Checkpoint restore
        let context = Context::new();
        context
            .apply_updates(self.config.initial_context.clone())
            .await;
        let mut completed_nodes: Vec<String> = Vec::new();
        let mut retry_counts: HashMap<String, u32> = HashMap::new();
        let mut current_id = start_id;

        match load_checkpoint(&self.config.logs_root).await {
            Ok(Some(cp)) => {
                tracing::info!(node = %cp.current_node_id, "Resuming from checkpoint");
                context.apply_updates(cp.context).await;
                completed_nodes = cp.completed_nodes;
                retry_counts = cp.retry_counts;
                if graph.node(&cp.current_node_id).is_some() {
                    current_id = cp.current_node_id;
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable checkpoint");
            }
        }
        context.set("goal", graph.goal.clone()).await;

        self.events.emit(PipelineEvent::PipelineStarted {
            pipeline_name: graph.name.clone(),
            node_count: graph.all_nodes().count(),
        });

        let mut node_outcomes: HashMap<String, Outcome> = HashMap::new();
        let mut steps: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(WaypointError::Cancelled);
            }
            steps += 1;
            if steps > self.config.max_steps {
                return Err(WaypointError::Other(format!(
                    "Step limit {} exceeded; aborting runaway pipeline",
                    self.config.max_steps
                )));
            }

            // Goal gates guard entry to the exit node
            if current_id == exit_id {
                if let Some(target) = self.unsatisfied_goal_gate_target(&graph, &completed_nodes) {
                    current_id = target;
                    continue;
                }
            }

            let node = graph
                .node(&current_id)
                .ok_or_else(|| WaypointError::Other(format!("Node '{}' not found", current_id)))?;

            // Execute the handler under the per-node timeout
            let outcome = self.execute_node(node, &context, &graph, cancel).await?;

            // Merge context updates, then record the status artifact
            context.apply_updates(outcome.context_updates.clone()).await;
            node_outcomes.insert(current_id.clone(), outcome.clone());
            if let Err(e) = write_status(&self.config.logs_root, &current_id, &outcome).await {
                tracing::warn!(node = %current_id, error = %e, "Failed to write status.json");
            }

            // Retry / failure policy
            let mut outcome = outcome;
            if outcome.status == StageStatus::Retry {
                let allowed = node.max_retries.max(graph.default_max_retry) as u32;
                let count = retry_counts.get(&current_id).copied().unwrap_or(0);
                if count < allowed {
                    retry_counts.insert(current_id.clone(), count + 1);
                    self.events.emit(PipelineEvent::StageRetrying {
                        node_id: current_id.clone(),
                        attempt: count + 1,
                    });
                    self.config
                        .backoff
                        .sleep_for_attempt(count as usize, cancel)
                        .await?;
                    current_id = self.resolve_retry_target(node, &graph);
                    continue;
                }
                tracing::warn!(node = %current_id, attempts = count, "Retries exhausted");
            }

            if matches!(outcome.status, StageStatus::Retry | StageStatus::Fail) {
                let fallback = node
                    .fallback_retry_target
                    .clone()
                    .or_else(|| graph.fallback_retry_target.clone())
                    .filter(|t| graph.node(t).is_some());

                if let Some(fallback) = fallback {
                    tracing::info!(node = %current_id, target = %fallback, "Jumping to fallback retry target");
                    retry_counts.remove(&current_id);
                    current_id = fallback;
                    continue;
                }

                if node.allow_partial {
                    tracing::info!(node = %current_id, "Downgrading failure to partial success");
                    outcome.status = StageStatus::PartialSuccess;
                } else {
                    completed_nodes.push(current_id.clone());
                    self.save_checkpoint_best_effort(&current_id, &completed_nodes, &context, &retry_counts)
                        .await;
                    self.events.emit(PipelineEvent::PipelineFailed {
                        pipeline_name: graph.name.clone(),
                        error: outcome
                            .failure_reason
                            .clone()
                            .unwrap_or_else(|| outcome.notes.clone()),
                    });
                    return Ok(PipelineResult {
                        status: StageStatus::Fail,
                        completed_nodes,
                        node_outcomes,
                        final_context: context.snapshot().await,
                    });
                }
            }

            completed_nodes.push(current_id.clone());

            // Exit node terminates the run
            if current_id == exit_id {
                self.save_checkpoint_best_effort(&current_id, &completed_nodes, &context, &retry_counts)
                    .await;
                if let Err(e) =
                    write_result(&self.config.logs_root, outcome.status, &completed_nodes).await
                {
                    tracing::warn!(error = %e, "Failed to write result.json");
                }
                self.events.emit(PipelineEvent::PipelineCompleted {
                    pipeline_name: graph.name.clone(),
                    completed_nodes: completed_nodes.clone(),
                    duration_ms: run_start.elapsed().as_millis() as u64,
                });
                return Ok(PipelineResult {
                    status: outcome.status,
                    completed_nodes,
                    node_outcomes,
                    final_context: context.snapshot().await,
                });
            }

            // Route to the next node
            let snapshot = context.snapshot().await;
            let resolve = make_resolver(&outcome, snapshot);
            let next_edge = select_edge(graph.outgoing_edges(&current_id), &outcome, &resolve);

            // A parallel fan-out that found its join point jumps straight
            // there; every branch handler has already run inside it.
            let join_jump = if self.registry.resolve_type(node) == "parallel" {
                outcome
                    .suggested_next_ids
                    .first()
                    .filter(|id| {
                        graph.node(id).is_some()
                            && !graph
                                .outgoing_edges(&current_id)
                                .iter()
                                .any(|e| e.to == **id)
                    })
                    .cloned()
            } else {
                None
            };

            let next_id = if let Some(join) = join_jump {
                tracing::debug!(node = %current_id, join = %join, "Fan-out complete, jumping to join");
                join
            } else {
                match next_edge {
                    Some(edge) => {
                        self.events.emit(PipelineEvent::EdgeSelected {
                            from_node: edge.from.clone(),
                            to_node: edge.to.clone(),
                            edge_label: edge.label.clone(),
                        });
                        if edge.loop_restart {
                            // Re-arm the target: forget completions and retries
                            completed_nodes.retain(|id| id != &edge.to);
                            retry_counts.remove(&edge.to);
                        }
                        edge.to.clone()
                    }
                    None => {
                        // Dead end off the exit path: the run ends with the
                        // node's own status and no result.json
                        self.save_checkpoint_best_effort(
                            &current_id,
                            &completed_nodes,
                            &context,
                            &retry_counts,
                        )
                        .await;
                        return Ok(PipelineResult {
                            status: outcome.status,
                            completed_nodes,
                            node_outcomes,
                            final_context: context.snapshot().await,
                        });
                    }
                }
            };

            current_id = next_id;
            self.save_checkpoint_best_effort(&current_id, &completed_nodes, &context, &retry_counts)
                .await;
        }
    }

    /// Run one node's handler with timeout wrapping and event emission.
    async fn execute_node(
        &self,
        node: &PipelineNode,
        context: &Context,
        graph: &PipelineGraph,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let handler_type = self.registry.resolve_type(node);
        let handler = self.registry.get(&handler_type).ok_or_else(|| {
            WaypointError::ConfigError(format!(
                "No handler registered for type '{}' (node '{}')",
                handler_type, node.id
            ))
        })?;

        self.events.emit(PipelineEvent::StageStarted {
            node_id: node.id.clone(),
            handler_type: handler_type.clone(),
        });
        let stage_start = tokio::time::Instant::now();

        let scope = HandlerScope {
            graph,
            logs_root: &self.config.logs_root,
            cancel,
            registry: &self.registry,
        };

        let result = match node.timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, handler.execute(node, context, &scope)).await {
                    Ok(result) => result,
                    Err(_) => Ok(Outcome::retry(format!(
                        "Node timed out after {}ms",
                        limit.as_millis()
                    ))),
                }
            }
            None => handler.execute(node, context, &scope).await,
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(WaypointError::Cancelled) => return Err(WaypointError::Cancelled),
            Err(e) => {
                tracing::error!(node = %node.id, error = %e, "Handler raised an error");
                Outcome::fail(e.to_string())
            }
        };

        self.events.emit(PipelineEvent::StageCompleted {
            node_id: node.id.clone(),
            status: outcome.status.as_str().to_string(),
            duration_ms: stage_start.elapsed().as_millis() as u64,
        });

        Ok(outcome)
    }

    /// The first goal-gated node (by id order) missing from the completed
    /// list, resolved to the node the run loops back to.
    fn unsatisfied_goal_gate_target(
        &self,
        graph: &PipelineGraph,
        completed_nodes: &[String],
    ) -> Option<String> {
        let mut gates: Vec<&PipelineNode> = graph.all_nodes().filter(|n| n.goal_gate).collect();
        gates.sort_by(|a, b| a.id.cmp(&b.id));

        for gate in gates {
            let satisfied = completed_nodes.contains(&gate.id);
            self.events.emit(PipelineEvent::GoalGateChecked {
                node_id: gate.id.clone(),
                satisfied,
            });
            if satisfied {
                continue;
            }
            let target = gate
                .retry_target
                .clone()
                .or_else(|| graph.retry_target.clone())
                .unwrap_or_else(|| gate.id.clone());
            if graph.node(&target).is_some() {
                tracing::info!(gate = %gate.id, target = %target, "Goal gate unsatisfied, looping back");
                return Some(target);
            }
        }
        None
    }

    fn resolve_retry_target(&self, node: &PipelineNode, graph: &PipelineGraph) -> String {
        node.retry_target
            .clone()
            .or_else(|| graph.retry_target.clone())
            .filter(|t| graph.node(t).is_some())
            .unwrap_or_else(|| node.id.clone())
    }

    async fn save_checkpoint_best_effort(
        &self,
        current_id: &str,
        completed_nodes: &[String],
        context: &Context,
        retry_counts: &HashMap<String, u32>,
    ) {
        let checkpoint = PipelineCheckpoint::new(
            current_id.to_string(),
            completed_nodes.to_vec(),
            context.snapshot().await,
            retry_counts.clone(),
        );
        match save_checkpoint(&checkpoint, &self.config.logs_root).await {
            Ok(_) => self.events.emit(PipelineEvent::CheckpointSaved {
                node_id: current_id.to_string(),
            }),
            Err(e) => tracing::warn!(error = %e, "Failed to save checkpoint"),
        }
    }
}

/// Build the key resolver edge conditions evaluate against.
fn make_resolver(
    outcome: &Outcome,
    snapshot: HashMap<String, String>,
) -> impl Fn(&str) -> String + '_ {
    let status = outcome.status.as_str().to_string();
    let label = outcome.preferred_label.clone().unwrap_or_default();
    move |key: &str| match key {
        "outcome" => status.clone(),
        "preferred_label" => label.clone(),
        other => {
            let context_key = other.strip_prefix("context.").unwrap_or(other);
            snapshot.get(context_key).cloned().unwrap_or_default()
        }
    }
}

// ---------------------------------------------------------------------------
// Registry factories
// ---------------------------------------------------------------------------

/// Registry with every built-in handler except codergen and the human gate,
/// which need collaborators (LLM client, interviewer).
pub fn base_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(crate::handler::StartHandler);
    registry.register(crate::handler::ExitHandler);
    registry.register(crate::handler::ConditionalHandler);
    registry.register(crate::handlers::ToolShellHandler);
    registry.register(crate::handlers::ParallelHandler);
    registry.register(crate::handlers::FanInHandler);
    registry
}

/// The full default registry for a run.
pub fn default_registry(
    client: std::sync::Arc<waypoint_llm::LlmClient>,
    codergen: crate::handlers::CodergenConfig,
    interviewer: std::sync::Arc<dyn crate::interviewer::Interviewer>,
) -> HandlerRegistry {
    let mut registry = base_registry();
    registry.register(crate::handlers::CodergenHandler::new(client, codergen));
    registry.register(crate::handlers::HumanGateHandler::new(interviewer));
    registry
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{HandlerScope as Scope, NodeHandler};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn parse_graph(dot: &str) -> PipelineGraph {
        let parsed = waypoint_dot::parse(dot).unwrap();
        PipelineGraph::from_dot(parsed).unwrap()
    }

    fn engine_with(registry: HandlerRegistry, logs_root: &std::path::Path) -> PipelineEngine {
        PipelineEngine::new(
            registry,
            EngineConfig {
                logs_root: logs_root.to_path_buf(),
                backoff: BackoffPolicy::None,
                max_steps: 200,
                ..Default::default()
            },
        )
    }

    /// Codergen stand-in whose outcomes play back from a script.
    struct ScriptedNodeHandler {
        outcomes: std::sync::Mutex<Vec<Outcome>>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedNodeHandler {
        fn new(mut outcomes: Vec<Outcome>) -> Self {
            outcomes.reverse();
            Self {
                outcomes: std::sync::Mutex::new(outcomes),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl NodeHandler for ScriptedNodeHandler {
        fn handler_type(&self) -> &str {
            "codergen"
        }
        async fn execute(
            &self,
            _node: &PipelineNode,
            _ctx: &Context,
            _scope: &Scope<'_>,
        ) -> Result<Outcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .outcomes
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Outcome::success("scripted default")))
        }
    }

    fn registry_with_scripted(handler: ScriptedNodeHandler) -> HandlerRegistry {
        let mut registry = base_registry();
        registry.register(handler);
        registry
    }

    fn cancel() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn linear_pipeline_completes() {
        let graph = parse_graph(
            r#"digraph G {
                start [shape="Mdiamond"]
                process [shape="box", prompt="Do work"]
                finish [shape="Msquare"]
                start -> process -> finish
            }"#,
        );
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(
            registry_with_scripted(ScriptedNodeHandler::new(vec![])),
            dir.path(),
        );

        let result = engine.run(graph, &cancel()).await.unwrap();
        assert_eq!(result.status, StageStatus::Success);
        assert_eq!(result.completed_nodes, vec!["start", "process", "finish"]);
        assert!(dir.path().join("result.json").exists());
        assert!(dir.path().join("process/status.json").exists());
    }

    #[tokio::test]
    async fn validation_failure_aborts_run() {
        let graph = parse_graph(
            r#"digraph G {
                lonely [shape="box", prompt="p"]
            }"#,
        );
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(
            registry_with_scripted(ScriptedNodeHandler::new(vec![])),
            dir.path(),
        );

        let err = engine.run(graph, &cancel()).await.unwrap_err();
        assert!(matches!(err, WaypointError::ValidationError(_)));
    }

    #[tokio::test]
    async fn conditional_branch_taken_on_outcome() {
        let graph = parse_graph(
            r#"digraph G {
                start [shape="Mdiamond"]
                work [shape="box", prompt="w"]
                path_a [shape="box", prompt="a"]
                path_b [shape="box", prompt="b"]
                finish [shape="Msquare"]
                start -> work
                work -> path_a [condition="outcome=success"]
                work -> path_b [condition="outcome=fail"]
                path_a -> finish
                path_b -> finish
            }"#,
        );
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(
            registry_with_scripted(ScriptedNodeHandler::new(vec![])),
            dir.path(),
        );

        let result = engine.run(graph, &cancel()).await.unwrap();
        assert!(result.completed_nodes.contains(&"path_a".to_string()));
        assert!(!result.completed_nodes.contains(&"path_b".to_string()));
    }

    #[tokio::test]
    async fn retry_then_success_counts_attempts() {
        let graph = parse_graph(
            r#"digraph G {
                start [shape="Mdiamond"]
                work [shape="box", prompt="w", max_retries=2]
                finish [shape="Msquare"]
                start -> work -> finish
            }"#,
        );
        let dir = tempfile::tempdir().unwrap();
        let handler = ScriptedNodeHandler::new(vec![
            Outcome::retry("first attempt fails"),
            Outcome::success("second attempt works"),
        ]);
        let calls = handler.calls.clone();
        let engine = engine_with(registry_with_scripted(handler), dir.path());

        let result = engine.run(graph, &cancel()).await.unwrap();
        assert_eq!(result.status, StageStatus::Success);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retries_exhausted_fails_run() {
        let graph = parse_graph(
            r#"digraph G {
                start [shape="Mdiamond"]
                work [shape="box", prompt="w", max_retries=1]
                finish [shape="Msquare"]
                start -> work -> finish
            }"#,
        );
        let dir = tempfile::tempdir().unwrap();
        let handler = ScriptedNodeHandler::new(vec![
            Outcome::retry("fail 1"),
            Outcome::retry("fail 2"),
        ]);
        let calls = handler.calls.clone();
        let engine = engine_with(registry_with_scripted(handler), dir.path());

        let result = engine.run(graph, &cancel()).await.unwrap();
        assert_eq!(result.status, StageStatus::Fail);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // Failure still ends with the node recorded and no result.json
        assert!(result.completed_nodes.contains(&"work".to_string()));
        assert!(!dir.path().join("result.json").exists());
    }

    #[tokio::test]
    async fn fail_with_allow_partial_proceeds() {
        let graph = parse_graph(
            r#"digraph G {
                start [shape="Mdiamond"]
                work [shape="box", prompt="w", allow_partial=true]
                finish [shape="Msquare"]
                start -> work -> finish
            }"#,
        );
        let dir = tempfile::tempdir().unwrap();
        let handler = ScriptedNodeHandler::new(vec![Outcome::fail("broken but tolerable")]);
        let engine = engine_with(registry_with_scripted(handler), dir.path());

        let result = engine.run(graph, &cancel()).await.unwrap();
        assert_eq!(result.status, StageStatus::Success);
        assert!(result.completed_nodes.contains(&"finish".to_string()));
    }

    #[tokio::test]
    async fn fallback_retry_target_jumped_on_failure() {
        let graph = parse_graph(
            r#"digraph G {
                start [shape="Mdiamond"]
                triage [shape="box", prompt="t"]
                work [shape="box", prompt="w", fallback_retry_target="triage"]
                finish [shape="Msquare"]
                start -> work
                work -> finish [condition="outcome=success"]
                work -> triage [condition="outcome=fail"]
                triage -> finish
            }"#,
        );
        let dir = tempfile::tempdir().unwrap();
        let handler = ScriptedNodeHandler::new(vec![
            Outcome::fail("work is broken"),
            Outcome::success("triage fixed it"),
        ]);
        let engine = engine_with(registry_with_scripted(handler), dir.path());

        let result = engine.run(graph, &cancel()).await.unwrap();
        assert_eq!(result.status, StageStatus::Success);
        assert!(result.completed_nodes.contains(&"triage".to_string()));
    }

    #[tokio::test]
    async fn goal_gate_loopback_until_satisfied() {
        let graph = parse_graph(
            r#"digraph G {
                start [shape="Mdiamond"]
                work [shape="box", prompt="w", goal_gate=true, retry_target="work", max_retries=1]
                finish [shape="Msquare"]
                start -> work -> finish
            }"#,
        );
        let dir = tempfile::tempdir().unwrap();
        let handler = ScriptedNodeHandler::new(vec![
            Outcome::retry("first visit fails"),
            Outcome::success("second visit works"),
        ]);
        let calls = handler.calls.clone();
        let engine = engine_with(registry_with_scripted(handler), dir.path());

        let result = engine.run(graph, &cancel()).await.unwrap();
        assert_eq!(result.status, StageStatus::Success);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let last = result.completed_nodes.last().unwrap();
        assert_eq!(last, "finish");
    }

    #[tokio::test]
    async fn exit_blocked_until_unvisited_goal_gate_runs() {
        // The gate sits on a branch the happy path never takes; the exit
        // node refuses entry until the engine loops back through it.
        let graph = parse_graph(
            r#"digraph G {
                start [shape="Mdiamond"]
                work [shape="box", prompt="w"]
                gate [shape="box", prompt="g", goal_gate=true, retry_target="gate"]
                finish [shape="Msquare"]
                start -> work
                work -> finish [condition="outcome=success"]
                work -> gate [condition="outcome=fail"]
                gate -> finish
            }"#,
        );
        let dir = tempfile::tempdir().unwrap();
        let handler = ScriptedNodeHandler::new(vec![
            Outcome::success("work done"),
            Outcome::success("gate satisfied"),
        ]);
        let engine = engine_with(registry_with_scripted(handler), dir.path());

        let result = engine.run(graph, &cancel()).await.unwrap();
        assert_eq!(result.status, StageStatus::Success);
        // Gate was visited via the loopback even though no edge led there
        assert!(result.completed_nodes.contains(&"gate".to_string()));
        assert_eq!(result.completed_nodes.last().unwrap(), "finish");
    }

    #[tokio::test]
    async fn node_timeout_converts_to_retry() {
        struct SlowHandler;

        #[async_trait]
        impl NodeHandler for SlowHandler {
            fn handler_type(&self) -> &str {
                "codergen"
            }
            async fn execute(
                &self,
                _node: &PipelineNode,
                _ctx: &Context,
                _scope: &Scope<'_>,
            ) -> Result<Outcome> {
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                Ok(Outcome::success("too late"))
            }
        }

        let graph = parse_graph(
            r#"digraph G {
                start [shape="Mdiamond"]
                work [shape="box", prompt="w", timeout=50ms]
                finish [shape="Msquare"]
                start -> work -> finish
            }"#,
        );
        let dir = tempfile::tempdir().unwrap();
        let mut registry = base_registry();
        registry.register(SlowHandler);
        let engine = engine_with(registry, dir.path());

        // No retries allowed: the timeout-retry exhausts immediately and fails
        let result = engine.run(graph, &cancel()).await.unwrap();
        assert_eq!(result.status, StageStatus::Fail);
    }

    #[tokio::test]
    async fn handler_error_becomes_fail_result() {
        struct ExplodingHandler;

        #[async_trait]
        impl NodeHandler for ExplodingHandler {
            fn handler_type(&self) -> &str {
                "codergen"
            }
            async fn execute(
                &self,
                node: &PipelineNode,
                _ctx: &Context,
                _scope: &Scope<'_>,
            ) -> Result<Outcome> {
                Err(WaypointError::HandlerError {
                    handler: "codergen".into(),
                    node: node.id.clone(),
                    message: "kaboom".into(),
                })
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
        let dir = tempfile::tempdir().unwrap();
        let mut registry = base_registry();
        registry.register(ExplodingHandler);
        let engine = engine_with(registry, dir.path());

        let result = engine.run(graph, &cancel()).await.unwrap();
        assert_eq!(result.status, StageStatus::Fail);
        // Checkpoint written on the failure path
        assert!(dir.path().join("checkpoint.json").exists());
    }

    #[tokio::test]
    async fn loop_restart_clears_completion_and_retries() {
        // work -> check; check loops back to work with loop_restart on the
        // first pass, then proceeds to finish.
        let graph = parse_graph(
            r#"digraph G {
                start [shape="Mdiamond"]
                work [shape="box", prompt="w"]
                check [shape="box", prompt="c"]
                finish [shape="Msquare"]
                start -> work -> check
                check -> work [label="again", loop_restart=true]
                check -> finish [label="done"]
            }"#,
        );
        let dir = tempfile::tempdir().unwrap();
        // Order: work, check(label=again -> loop), work again, check(label=done)
        let handler = ScriptedNodeHandler::new(vec![
            Outcome::success("work pass 1"),
            Outcome::with_label(StageStatus::Success, "again"),
            Outcome::success("work pass 2"),
            Outcome::with_label(StageStatus::Success, "done"),
        ]);
        let engine = engine_with(registry_with_scripted(handler), dir.path());

        let result = engine.run(graph, &cancel()).await.unwrap();
        assert_eq!(result.status, StageStatus::Success);
        // work ran twice; its first completion was cleared by loop_restart,
        // so it appears once before the final check and once after
        let work_count = result
            .completed_nodes
            .iter()
            .filter(|id| id.as_str() == "work")
            .count();
        assert_eq!(work_count, 1, "loop_restart removes the prior completion");
    }

    #[tokio::test]
    async fn checkpoint_resume_skips_completed_nodes() {
        let dot = r#"digraph G {
            start [shape="Mdiamond"]
            one [shape="box", prompt="1"]
            two [shape="box", prompt="2"]
            finish [shape="Msquare"]
            start -> one -> two -> finish
        }"#;
        let dir = tempfile::tempdir().unwrap();

        // Seed a checkpoint claiming start and one already ran
        let cp = PipelineCheckpoint::new(
            "two".into(),
            vec!["start".into(), "one".into()],
            HashMap::from([("goal".to_string(), String::new())]),
            HashMap::new(),
        );
        save_checkpoint(&cp, dir.path()).await.unwrap();

        let handler = ScriptedNodeHandler::new(vec![]);
        let calls = handler.calls.clone();
        let engine = engine_with(registry_with_scripted(handler), dir.path());

        let result = engine.run(parse_graph(dot), &cancel()).await.unwrap();
        assert_eq!(result.status, StageStatus::Success);
        assert_eq!(
            result.completed_nodes,
            vec!["start", "one", "two", "finish"]
        );
        // Only "two" hit the codergen handler after resume
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_propagates_out_of_run() {
        let graph = parse_graph(
            r#"digraph G {
                start [shape="Mdiamond"]
                work [shape="box", prompt="w"]
                finish [shape="Msquare"]
                start -> work -> finish
            }"#,
        );
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(
            registry_with_scripted(ScriptedNodeHandler::new(vec![])),
            dir.path(),
        );

        let token = CancellationToken::new();
        token.cancel();
        let err = engine.run(graph, &token).await.unwrap_err();
        assert!(matches!(err, WaypointError::Cancelled));
    }

    #[tokio::test]
    async fn goal_set_in_context() {
        let graph = parse_graph(
            r#"digraph G {
                goal = "Build X"
                start [shape="Mdiamond"]
                finish [shape="Msquare"]
                start -> finish
            }"#,
        );
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(base_registry(), dir.path());

        let result = engine.run(graph, &cancel()).await.unwrap();
        assert_eq!(
            result.final_context.get("goal").map(String::as_str),
            Some("Build X")
        );
    }
}
