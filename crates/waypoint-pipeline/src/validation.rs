//! Pipeline validation: lint rules and diagnostics.
//!
//! Each rule emits zero or more [`Diagnostic`]s. [`validate`] collects
//! advisory output; [`validate_or_raise`] fails on the first
//! `Error`-severity issue.

use std::collections::{HashSet, VecDeque};

use crate::condition::try_parse;
use crate::graph::{is_exit_node, is_start_node, PipelineGraph};

// ---------------------------------------------------------------------------
// Diagnostic types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    pub node_id: Option<String>,
    pub edge: Option<(String, String)>,
    pub fix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

// ---------------------------------------------------------------------------
// LintRule trait
// ---------------------------------------------------------------------------

pub trait LintRule: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, graph: &PipelineGraph) -> Vec<Diagnostic>;
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

struct StartNodeRule;
impl LintRule for StartNodeRule {
    fn name(&self) -> &str {
        "start_node"
    }
    fn apply(&self, graph: &PipelineGraph) -> Vec<Diagnostic> {
        let starts: Vec<_> = graph
            .all_nodes()
            .filter(|n| is_start_node(&n.id, &n.shape))
            .collect();
        if starts.is_empty() {
            vec![Diagnostic {
                rule: self.name().into(),
                severity: Severity::Error,
                message: "Pipeline has no start node (shape=Mdiamond or id start/Start)".into(),
                node_id: None,
                edge: None,
                fix: Some("Add a node with shape=\"Mdiamond\" or id=\"start\"".into()),
            }]
        } else if starts.len() > 1 {
            vec![Diagnostic {
                rule: self.name().into(),
                severity: Severity::Error,
                message: format!(
                    "Pipeline has {} start nodes: {}; expected exactly one",
                    starts.len(),
                    starts
                        .iter()
                        .map(|n| n.id.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                node_id: None,
                edge: None,
                fix: Some("Remove extra start nodes so only one remains".into()),
            }]
        } else {
            vec![]
        }
    }
}

struct ExitNodeRule;
impl LintRule for ExitNodeRule {
    fn name(&self) -> &str {
        "exit_node"
    }
    fn apply(&self, graph: &PipelineGraph) -> Vec<Diagnostic> {
        let exits: Vec<_> = graph
            .all_nodes()
            .filter(|n| is_exit_node(&n.id, &n.shape))
            .collect();
        if exits.is_empty() {
            vec![Diagnostic {
                rule: self.name().into(),
                severity: Severity::Error,
                message: "Pipeline has no exit node (shape=Msquare or id exit/end/done)".into(),
                node_id: None,
                edge: None,
                fix: Some("Add a node with shape=\"Msquare\" or id=\"done\"".into()),
            }]
        } else if exits.len() > 1 {
            vec![Diagnostic {
                rule: self.name().into(),
                severity: Severity::Error,
                message: format!(
                    "Pipeline has {} exit nodes: {}; expected exactly one",
                    exits.len(),
                    exits
                        .iter()
                        .map(|n| n.id.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                node_id: None,
                edge: None,
                fix: Some("Remove extra exit nodes so only one remains".into()),
            }]
        } else {
            vec![]
        }
    }
}

struct StartNoIncomingRule;
impl LintRule for StartNoIncomingRule {
    fn name(&self) -> &str {
        "start_no_incoming"
    }
    fn apply(&self, graph: &PipelineGraph) -> Vec<Diagnostic> {
        let start = match graph.start_node() {
            Some(n) => n.id.clone(),
            None => return vec![],
        };
        let has_incoming = graph.all_edges().iter().any(|e| e.to == start);
        if has_incoming {
            vec![Diagnostic {
                rule: self.name().into(),
                severity: Severity::Error,
                message: format!("Start node '{start}' has incoming edges"),
                node_id: Some(start),
                edge: None,
                fix: Some("Remove edges pointing to the start node".into()),
            }]
        } else {
            vec![]
        }
    }
}

struct ExitNoOutgoingRule;
impl LintRule for ExitNoOutgoingRule {
    fn name(&self) -> &str {
        "exit_no_outgoing"
    }
    fn apply(&self, graph: &PipelineGraph) -> Vec<Diagnostic> {
        graph
            .all_nodes()
            .filter(|n| is_exit_node(&n.id, &n.shape))
            .filter(|n| !graph.outgoing_edges(&n.id).is_empty())
            .map(|n| Diagnostic {
                rule: self.name().into(),
                severity: Severity::Error,
                message: format!("Exit node '{}' has outgoing edges", n.id),
                node_id: Some(n.id.clone()),
                edge: None,
                fix: Some(format!("Remove outgoing edges from '{}'", n.id)),
            })
            .collect()
    }
}

struct ReachabilityRule;
impl LintRule for ReachabilityRule {
    fn name(&self) -> &str {
        "reachability"
    }
    fn apply(&self, graph: &PipelineGraph) -> Vec<Diagnostic> {
        let start_id = match graph.start_node() {
            Some(n) => n.id.clone(),
            None => return vec![], // StartNodeRule reports this
        };

        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        visited.insert(start_id.clone());
        queue.push_back(start_id);

        while let Some(current) = queue.pop_front() {
            for edge in graph.outgoing_edges(&current) {
                if visited.insert(edge.to.clone()) {
                    queue.push_back(edge.to.clone());
                }
            }
        }

        let mut unreachable: Vec<String> = graph
            .all_nodes()
            .map(|n| n.id.clone())
            .filter(|id| !visited.contains(id))
            .collect();
        unreachable.sort();

        unreachable
            .into_iter()
            .map(|id| Diagnostic {
                rule: self.name().into(),
                severity: Severity::Error,
                message: format!("Node '{id}' is not reachable from the start node"),
                node_id: Some(id.clone()),
                edge: None,
                fix: Some(format!("Add an edge leading to '{id}' or remove it")),
            })
            .collect()
    }
}

struct EdgeValidNodesRule;
impl LintRule for EdgeValidNodesRule {
    fn name(&self) -> &str {
        "edge_valid_nodes"
    }
    fn apply(&self, graph: &PipelineGraph) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for e in graph.all_edges() {
            for endpoint in [&e.from, &e.to] {
                if graph.node(endpoint).is_none() {
                    diags.push(Diagnostic {
                        rule: self.name().into(),
                        severity: Severity::Error,
                        message: format!(
                            "Edge {} -> {} references non-existent node '{}'",
                            e.from, e.to, endpoint
                        ),
                        node_id: None,
                        edge: Some((e.from.clone(), e.to.clone())),
                        fix: Some(format!("Add node '{}' or fix the edge", endpoint)),
                    });
                }
            }
        }
        diags
    }
}

struct CodergenPromptRule;
impl LintRule for CodergenPromptRule {
    fn name(&self) -> &str {
        "codergen_prompt"
    }
    fn apply(&self, graph: &PipelineGraph) -> Vec<Diagnostic> {
        graph
            .all_nodes()
            .filter(|n| n.shape == "box")
            .filter(|n| !is_start_node(&n.id, &n.shape) && !is_exit_node(&n.id, &n.shape))
            .filter(|n| n.prompt.as_deref().map_or(true, |p| p.trim().is_empty()))
            .map(|n| Diagnostic {
                rule: self.name().into(),
                severity: Severity::Warning,
                message: format!("Codergen node '{}' has no prompt", n.id),
                node_id: Some(n.id.clone()),
                edge: None,
                fix: Some("Add a prompt attribute describing the task".into()),
            })
            .collect()
    }
}

struct ConditionSyntaxRule;
impl LintRule for ConditionSyntaxRule {
    fn name(&self) -> &str {
        "condition_syntax"
    }
    fn apply(&self, graph: &PipelineGraph) -> Vec<Diagnostic> {
        graph
            .all_edges()
            .iter()
            .filter_map(|e| {
                let cond = e.condition.as_deref()?;
                try_parse(cond).map(|err| Diagnostic {
                    rule: self.name().into(),
                    severity: Severity::Error,
                    message: format!(
                        "Edge {} -> {} has invalid condition '{}': {}",
                        e.from, e.to, cond, err
                    ),
                    node_id: None,
                    edge: Some((e.from.clone(), e.to.clone())),
                    fix: Some("Fix the condition expression syntax".into()),
                })
            })
            .collect()
    }
}

struct RetryTargetExistsRule;
impl LintRule for RetryTargetExistsRule {
    fn name(&self) -> &str {
        "retry_target_exists"
    }
    fn apply(&self, graph: &PipelineGraph) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for node in graph.all_nodes() {
            for (field, target) in [
                ("retry_target", &node.retry_target),
                ("fallback_retry_target", &node.fallback_retry_target),
            ] {
                if let Some(target) = target {
                    if graph.node(target).is_none() {
                        diags.push(Diagnostic {
                            rule: self.name().into(),
                            severity: Severity::Warning,
                            message: format!(
                                "Node '{}' has {} '{}' which does not exist",
                                node.id, field, target
                            ),
                            node_id: Some(node.id.clone()),
                            edge: None,
                            fix: Some(format!("Add node '{target}' or fix {field}")),
                        });
                    }
                }
            }
        }
        diags
    }
}

struct GoalGateHasRetryRule;
impl LintRule for GoalGateHasRetryRule {
    fn name(&self) -> &str {
        "goal_gate_has_retry"
    }
    fn apply(&self, graph: &PipelineGraph) -> Vec<Diagnostic> {
        graph
            .all_nodes()
            .filter(|n| n.goal_gate && n.retry_target.is_none() && graph.retry_target.is_none())
            .map(|n| Diagnostic {
                rule: self.name().into(),
                severity: Severity::Warning,
                message: format!("Node '{}' has goal_gate=true but no retry_target", n.id),
                node_id: Some(n.id.clone()),
                edge: None,
                fix: Some("Add a retry_target attribute so the goal gate can loop back".into()),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run all built-in lint rules and return collected diagnostics.
pub fn validate(graph: &PipelineGraph) -> Vec<Diagnostic> {
    let rules: Vec<Box<dyn LintRule>> = vec![
        Box::new(StartNodeRule),
        Box::new(ExitNodeRule),
        Box::new(StartNoIncomingRule),
        Box::new(ExitNoOutgoingRule),
        Box::new(ReachabilityRule),
        Box::new(EdgeValidNodesRule),
        Box::new(CodergenPromptRule),
        Box::new(ConditionSyntaxRule),
        Box::new(RetryTargetExistsRule),
        Box::new(GoalGateHasRetryRule),
    ];

    let mut diagnostics = Vec::new();
    for rule in &rules {
        diagnostics.extend(rule.apply(graph));
    }
    diagnostics
}

/// Run all lint rules; return `Err` if any `Error`-severity diagnostic found.
pub fn validate_or_raise(graph: &PipelineGraph) -> waypoint_types::Result<Vec<Diagnostic>> {
    let diagnostics = validate(graph);
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .collect();
    if !errors.is_empty() {
        let messages: Vec<_> = errors.iter().map(|d| d.message.clone()).collect();
        return Err(waypoint_types::WaypointError::ValidationError(
            messages.join("; "),
        ));
    }
    Ok(diagnostics)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_and_build(dot: &str) -> PipelineGraph {
        let graph = waypoint_dot::parse(dot).unwrap();
        PipelineGraph::from_dot(graph).unwrap()
    }

    #[test]
    fn valid_pipeline_passes() {
        let pg = parse_and_build(
            r#"digraph G {
            start [shape="Mdiamond"]
            process [label="Do work", prompt="Do the thing"]
            done [shape="Msquare"]
            start -> process -> done
        }"#,
        );
        let diags = validate(&pg);
        let errors: Vec<_> = diags
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .collect();
        assert!(errors.is_empty(), "Expected no errors, got: {errors:?}");
    }

    #[test]
    fn missing_start_node_error() {
        let pg = parse_and_build(
            r#"digraph G {
            process [label="Do work", prompt="p"]
            finish [shape="Msquare"]
            process -> finish
        }"#,
        );
        let diags = validate(&pg);
        assert!(diags
            .iter()
            .any(|d| d.rule == "start_node" && d.severity == Severity::Error));
    }

    #[test]
    fn missing_exit_node_error() {
        let pg = parse_and_build(
            r#"digraph G {
            start [shape="Mdiamond"]
            process [prompt="p"]
            start -> process
        }"#,
        );
        let diags = validate(&pg);
        assert!(diags
            .iter()
            .any(|d| d.rule == "exit_node" && d.severity == Severity::Error));
    }

    #[test]
    fn duplicate_exit_nodes_error() {
        let pg = parse_and_build(
            r#"digraph G {
            start [shape="Mdiamond"]
            a [shape="Msquare"]
            b [shape="Msquare"]
            start -> a
            start -> b
        }"#,
        );
        let diags = validate(&pg);
        assert!(diags
            .iter()
            .any(|d| d.rule == "exit_node" && d.message.contains("2 exit nodes")));
    }

    #[test]
    fn unreachable_node_error() {
        let pg = parse_and_build(
            r#"digraph G {
            start [shape="Mdiamond"]
            process [prompt="p"]
            orphan [label="Orphan", prompt="o"]
            finish [shape="Msquare"]
            start -> process -> finish
        }"#,
        );
        let diags = validate(&pg);
        assert!(
            diags.iter().any(|d| d.rule == "reachability"
                && d.severity == Severity::Error
                && d.message.contains("orphan")),
            "Expected unreachable diagnostic for orphan, got: {diags:?}"
        );
    }

    #[test]
    fn start_with_incoming_edges_error() {
        let pg = parse_and_build(
            r#"digraph G {
            start [shape="Mdiamond"]
            process [prompt="p"]
            finish [shape="Msquare"]
            start -> process -> finish
            process -> start
        }"#,
        );
        let diags = validate(&pg);
        assert!(diags
            .iter()
            .any(|d| d.rule == "start_no_incoming" && d.severity == Severity::Error));
    }

    #[test]
    fn exit_with_outgoing_edges_error() {
        let pg = parse_and_build(
            r#"digraph G {
            start [shape="Mdiamond"]
            finish [shape="Msquare"]
            extra [label="Extra", prompt="e"]
            start -> finish -> extra
        }"#,
        );
        let diags = validate(&pg);
        assert!(diags
            .iter()
            .any(|d| d.rule == "exit_no_outgoing" && d.severity == Severity::Error));
    }

    #[test]
    fn codergen_without_prompt_warning() {
        let pg = parse_and_build(
            r#"digraph G {
            start [shape="Mdiamond"]
            worker [shape="box"]
            finish [shape="Msquare"]
            start -> worker -> finish
        }"#,
        );
        let diags = validate(&pg);
        assert!(diags
            .iter()
            .any(|d| d.rule == "codergen_prompt" && d.severity == Severity::Warning));
    }

    #[test]
    fn invalid_condition_syntax_error() {
        let pg = parse_and_build(
            r#"digraph G {
            start [shape="Mdiamond"]
            a [prompt="a"]
            finish [shape="Msquare"]
            start -> a [condition="no_operator_here"]
            a -> finish
        }"#,
        );
        let diags = validate(&pg);
        assert!(diags
            .iter()
            .any(|d| d.rule == "condition_syntax" && d.severity == Severity::Error));
    }

    #[test]
    fn goal_gate_without_retry_target_warning() {
        let pg = parse_and_build(
            r#"digraph G {
            start [shape="Mdiamond"]
            gate [goal_gate=true, prompt="check"]
            finish [shape="Msquare"]
            start -> gate -> finish
        }"#,
        );
        let diags = validate(&pg);
        assert!(diags
            .iter()
            .any(|d| d.rule == "goal_gate_has_retry" && d.severity == Severity::Warning));
    }

    #[test]
    fn retry_target_nonexistent_warning() {
        let pg = parse_and_build(
            r#"digraph G {
            start [shape="Mdiamond"]
            gate [goal_gate=true, retry_target="nonexistent", prompt="g"]
            finish [shape="Msquare"]
            start -> gate -> finish
        }"#,
        );
        let diags = validate(&pg);
        assert!(diags
            .iter()
            .any(|d| d.rule == "retry_target_exists" && d.severity == Severity::Warning));
    }

    #[test]
    fn validate_or_raise_matches_validate() {
        let good = parse_and_build(
            r#"digraph G {
            start [shape="Mdiamond"]
            process [prompt="p"]
            finish [shape="Msquare"]
            start -> process -> finish
        }"#,
        );
        assert!(validate_or_raise(&good).is_ok());
        assert!(validate(&good)
            .iter()
            .all(|d| d.severity != Severity::Error));

        let bad = parse_and_build(r#"digraph G { process [prompt="p"] }"#);
        assert!(validate_or_raise(&bad).is_err());
        assert!(validate(&bad).iter().any(|d| d.severity == Severity::Error));
    }
}
