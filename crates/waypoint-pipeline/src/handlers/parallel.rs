//! Fan-out and fan-in handlers.
//!
//! The parallel handler runs each outgoing edge's target handler
//! concurrently on an isolated context snapshot, joins all branches, and
//! folds their outcomes deterministically by target id. The fan-in handler
//! is the join marker: a trivial success barrier the engine routes through.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::future::join_all;

use waypoint_types::{Context, Outcome, Result, StageStatus, WaypointError};

use crate::graph::PipelineNode;
use crate::handler::{HandlerScope, NodeHandler};

pub struct ParallelHandler;

#[async_trait]
impl NodeHandler for ParallelHandler {
    fn handler_type(&self) -> &str {
        "parallel"
    }

    async fn execute(
        &self,
        node: &PipelineNode,
        context: &Context,
        scope: &HandlerScope<'_>,
    ) -> Result<Outcome> {
        // Branch targets in deterministic order
        let mut targets: Vec<String> = scope
            .graph
            .outgoing_edges(&node.id)
            .iter()
            .map(|e| e.to.clone())
            .collect();
        targets.sort();
        targets.dedup();

        if targets.is_empty() {
            return Ok(Outcome::success("Fan-out with no branches"));
        }

        tracing::info!(node = %node.id, branches = targets.len(), "Parallel fan-out");

        // Each branch runs its target's handler on a context snapshot
        let mut branch_futures = Vec::new();
        for target in &targets {
            let snapshot = context.clone_isolated().await;
            branch_futures.push(run_branch(target.clone(), snapshot, scope));
        }
        let branch_results = join_all(branch_futures).await;

        // Fold in target order: context-update union, last writer wins
        let mut merged_updates: HashMap<String, String> = HashMap::new();
        let mut failures: Vec<String> = Vec::new();
        for (target, result) in targets.iter().zip(branch_results) {
            match result {
                Ok(outcome) => {
                    merged_updates.extend(outcome.context_updates);
                    if !matches!(
                        outcome.status,
                        StageStatus::Success | StageStatus::PartialSuccess
                    ) {
                        failures.push(format!(
                            "{}: {}",
                            target,
                            outcome.failure_reason.unwrap_or_else(|| outcome.notes)
                        ));
                    }
                }
                Err(WaypointError::Cancelled) => return Err(WaypointError::Cancelled),
                Err(e) => failures.push(format!("{}: {}", target, e)),
            }
        }

        let status = if failures.is_empty() {
            StageStatus::Success
        } else if node.allow_partial {
            StageStatus::PartialSuccess
        } else {
            StageStatus::Fail
        };

        // The branches' unique common successor (the fan-in) guides routing
        let join_target = common_successor(&targets, scope);

        Ok(Outcome {
            status,
            preferred_label: None,
            suggested_next_ids: join_target.into_iter().collect(),
            context_updates: merged_updates,
            notes: format!(
                "{} branches, {} failed",
                targets.len(),
                failures.len()
            ),
            failure_reason: if failures.is_empty() {
                None
            } else {
                Some(failures.join("; "))
            },
        })
    }
}

async fn run_branch(
    target: String,
    snapshot: Context,
    scope: &HandlerScope<'_>,
) -> Result<Outcome> {
    let child = scope
        .graph
        .node(&target)
        .ok_or_else(|| WaypointError::HandlerError {
            handler: "parallel".into(),
            node: target.clone(),
            message: "Branch target not found".into(),
        })?;
    let handler_type = scope.registry.resolve_type(child);
    let handler = scope
        .registry
        .get(&handler_type)
        .ok_or_else(|| WaypointError::HandlerError {
            handler: handler_type.clone(),
            node: target.clone(),
            message: format!("No handler registered for type '{}'", handler_type),
        })?;
    handler.execute(child, &snapshot, scope).await
}

/// The single node every branch's outgoing edges converge on, if any.
fn common_successor(targets: &[String], scope: &HandlerScope<'_>) -> Option<String> {
    let mut common: Option<std::collections::HashSet<String>> = None;
    for target in targets {
        let successors: std::collections::HashSet<String> = scope
            .graph
            .outgoing_edges(target)
            .iter()
            .map(|e| e.to.clone())
            .collect();
        common = Some(match common {
            None => successors,
            Some(prev) => prev.intersection(&successors).cloned().collect(),
        });
    }
    let common = common?;
    if common.len() == 1 {
        common.into_iter().next()
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// FanInHandler
// ---------------------------------------------------------------------------

/// Barrier marker for parallel joins.
///
/// The single-engine design needs no blocking here: by the time the engine
/// reaches the fan-in, every branch has already been awaited by the
/// parallel handler. A distributed variant would block on arrival counts.
pub struct FanInHandler;

#[async_trait]
impl NodeHandler for FanInHandler {
    fn handler_type(&self) -> &str {
        "parallel.fan_in"
    }

    async fn execute(
        &self,
        node: &PipelineNode,
        _context: &Context,
        _scope: &HandlerScope<'_>,
    ) -> Result<Outcome> {
        tracing::info!(node = %node.id, "Fan-in join point");
        Ok(Outcome::success("Fan-in join"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
