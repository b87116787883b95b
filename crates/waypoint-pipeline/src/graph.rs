use std::collections::HashMap;
use std::time::Duration;

use waypoint_dot::{AttributeValue, DotGraph, EdgeDef, NodeDef};

/// The reasoning-effort value treated as "not explicitly set" by the
/// stylesheet transform.
pub const REASONING_EFFORT_DEFAULT: &str = "high";

#[derive(Debug, Clone)]
pub struct PipelineGraph {
    pub name: String,
    pub goal: String,
    pub default_max_retry: usize,
    pub retry_target: Option<String>,
    pub fallback_retry_target: Option<String>,
    pub model_stylesheet: Option<String>,
    pub attrs: HashMap<String, AttributeValue>,
    nodes: HashMap<String, PipelineNode>,
    edges: Vec<PipelineEdge>,
    /// Maps node_id to a range (start, count) into the sorted `edges` vec.
    /// Edges are sorted by `from` so each node's outgoing edges are contiguous.
    adjacency: HashMap<String, (usize, usize)>,
}

#[derive(Debug, Clone)]
pub struct PipelineNode {
    pub id: String,
    pub label: String,
    pub shape: String,
    pub node_type: Option<String>,
    pub prompt: Option<String>,
    pub classes: Vec<String>,
    pub llm_model: Option<String>,
    pub llm_provider: Option<String>,
    pub reasoning_effort: String,
    pub fidelity: Option<String>,
    /// 0 means "use the graph default".
    pub max_retries: usize,
    pub timeout: Option<Duration>,
    pub goal_gate: bool,
    pub retry_target: Option<String>,
    pub fallback_retry_target: Option<String>,
    pub allow_partial: bool,
    pub raw_attrs: HashMap<String, AttributeValue>,
}

#[derive(Debug, Clone)]
pub struct PipelineEdge {
    pub from: String,
    pub to: String,
    pub label: Option<String>,
    pub condition: Option<String>,
    pub weight: i64,
    pub loop_restart: bool,
}

/// A node counts as the start marker by shape or by conventional id.
pub fn is_start_node(id: &str, shape: &str) -> bool {
    shape == "Mdiamond" || id == "start" || id == "Start"
}

/// A node counts as the exit marker by shape or by conventional id.
pub fn is_exit_node(id: &str, shape: &str) -> bool {
    shape == "Msquare" || id == "exit" || id == "end" || id == "done"
}

// --- Attribute extraction helpers ---

fn get_string_attr(attrs: &HashMap<String, AttributeValue>, key: &str) -> Option<String> {
    attrs.get(key).and_then(|v| match v {
        AttributeValue::String(s) => Some(s.clone()),
        _ => None,
    })
}

fn get_bool_attr(attrs: &HashMap<String, AttributeValue>, key: &str) -> Option<bool> {
    attrs.get(key).and_then(|v| match v {
        AttributeValue::Boolean(b) => Some(*b),
        AttributeValue::String(s) => Some(s == "true"),
        _ => None,
    })
}

fn get_int_attr(attrs: &HashMap<String, AttributeValue>, key: &str) -> Option<i64> {
    attrs.get(key).and_then(|v| match v {
        AttributeValue::Integer(i) => Some(*i),
        AttributeValue::String(s) => s.parse().ok(),
        _ => None,
    })
}

fn get_duration_attr(attrs: &HashMap<String, AttributeValue>, key: &str) -> Option<Duration> {
    attrs.get(key).and_then(|v| match v {
        AttributeValue::Duration(d) => Some(*d),
        AttributeValue::String(s) => waypoint_dot::duration_serde::parse_duration_str(s).ok(),
        _ => None,
    })
}

// --- Conversions ---

fn node_def_to_pipeline_node(node_def: &NodeDef) -> PipelineNode {
    let attrs = &node_def.attrs;
    let id = node_def.id.clone();

    let shape = get_string_attr(attrs, "shape").unwrap_or_else(|| "box".to_string());
    let label = get_string_attr(attrs, "label").unwrap_or_else(|| id.clone());
    let classes = get_string_attr(attrs, "class")
        .map(|s| {
            s.split(|c: char| c.is_whitespace() || c == ',')
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    PipelineNode {
        label,
        shape,
        node_type: get_string_attr(attrs, "type"),
        prompt: get_string_attr(attrs, "prompt"),
        classes,
        llm_model: get_string_attr(attrs, "llm_model"),
        llm_provider: get_string_attr(attrs, "llm_provider"),
        reasoning_effort: get_string_attr(attrs, "reasoning_effort")
            .unwrap_or_else(|| REASONING_EFFORT_DEFAULT.to_string()),
        fidelity: get_string_attr(attrs, "fidelity"),
        max_retries: get_int_attr(attrs, "max_retries").map(|v| v as usize).unwrap_or(0),
        timeout: get_duration_attr(attrs, "timeout"),
        goal_gate: get_bool_attr(attrs, "goal_gate").unwrap_or(false),
        retry_target: get_string_attr(attrs, "retry_target"),
        fallback_retry_target: get_string_attr(attrs, "fallback_retry_target"),
        allow_partial: get_bool_attr(attrs, "allow_partial").unwrap_or(false),
        raw_attrs: attrs.clone(),
        id,
    }
}

fn edge_def_to_pipeline_edge(edge_def: &EdgeDef) -> PipelineEdge {
    let attrs = &edge_def.attrs;
    PipelineEdge {
        from: edge_def.from.clone(),
        to: edge_def.to.clone(),
        label: get_string_attr(attrs, "label"),
        condition: get_string_attr(attrs, "condition"),
        weight: get_int_attr(attrs, "weight").unwrap_or(1),
        loop_restart: get_bool_attr(attrs, "loop_restart").unwrap_or(false),
    }
}

impl PipelineGraph {
    pub fn from_dot(graph: DotGraph) -> waypoint_types::Result<Self> {
        let mut nodes = HashMap::new();
        for (id, node_def) in &graph.nodes {
            nodes.insert(id.clone(), node_def_to_pipeline_node(node_def));
        }

        let mut all_edges: Vec<PipelineEdge> =
            graph.edges.iter().map(edge_def_to_pipeline_edge).collect();

        // Sort edges by `from` so each node's outgoing edges form a
        // contiguous slice; ties keep declaration order.
        all_edges.sort_by(|a, b| a.from.cmp(&b.from));

        let mut adjacency: HashMap<String, (usize, usize)> = HashMap::new();
        let mut i = 0;
        while i < all_edges.len() {
            let start = i;
            let from = all_edges[i].from.clone();
            while i < all_edges.len() && all_edges[i].from == from {
                i += 1;
            }
            adjacency.insert(from, (start, i - start));
        }

        let goal = get_string_attr(&graph.attrs, "goal").unwrap_or_default();
        let default_max_retry = get_int_attr(&graph.attrs, "default_max_retry")
            .map(|v| v.max(0) as usize)
            .unwrap_or(0);
        let retry_target = get_string_attr(&graph.attrs, "retry_target");
        let fallback_retry_target = get_string_attr(&graph.attrs, "fallback_retry_target");
        let model_stylesheet = get_string_attr(&graph.attrs, "model_stylesheet");

        Ok(PipelineGraph {
            name: graph.name,
            goal,
            default_max_retry,
            retry_target,
            fallback_retry_target,
            model_stylesheet,
            attrs: graph.attrs,
            nodes,
            edges: all_edges,
            adjacency,
        })
    }

    /// Find the start node.
    pub fn start_node(&self) -> Option<&PipelineNode> {
        self.nodes
            .values()
            .find(|n| n.shape == "Mdiamond")
            .or_else(|| self.nodes.get("start").or_else(|| self.nodes.get("Start")))
    }

    /// Find the exit node.
    pub fn exit_node(&self) -> Option<&PipelineNode> {
        self.nodes.values().find(|n| n.shape == "Msquare").or_else(|| {
            ["exit", "end", "done"]
                .iter()
                .find_map(|id| self.nodes.get(*id))
        })
    }

    pub fn node(&self, id: &str) -> Option<&PipelineNode> {
        self.nodes.get(id)
    }

    pub fn outgoing_edges(&self, node_id: &str) -> &[PipelineEdge] {
        match self.adjacency.get(node_id) {
            Some(&(start, count)) => &self.edges[start..start + count],
            None => &[],
        }
    }

    pub fn all_nodes(&self) -> impl Iterator<Item = &PipelineNode> {
        self.nodes.values()
    }

    pub fn all_nodes_mut(&mut self) -> impl Iterator<Item = &mut PipelineNode> {
        self.nodes.values_mut()
    }

    pub fn all_edges(&self) -> &[PipelineEdge] {
        &self.edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_and_build(dot: &str) -> PipelineGraph {
        let graph = waypoint_dot::parse(dot).unwrap();
        PipelineGraph::from_dot(graph).unwrap()
    }

    #[test]
    fn from_dot_simple_linear_pipeline() {
        let pg = parse_and_build(
            r#"digraph Pipeline {
            start [shape="Mdiamond"]
            process [label="Process Data"]
            done [shape="Msquare"]
            start -> process -> done
        }"#,
        );

        assert_eq!(pg.name, "Pipeline");
        assert_eq!(pg.all_edges().len(), 2);
        assert!(pg.node("start").is_some());
        assert!(pg.node("process").is_some());
        assert!(pg.node("done").is_some());
        assert_eq!(pg.node("process").unwrap().label, "Process Data");
    }

    #[test]
    fn start_node_finds_mdiamond() {
        let pg = parse_and_build(
            r#"digraph G {
            begin [shape="Mdiamond", label="Start Here"]
            work [shape="box"]
            begin -> work
        }"#,
        );

        let start = pg.start_node().unwrap();
        assert_eq!(start.id, "begin");
    }

    #[test]
    fn start_node_falls_back_to_id() {
        let pg = parse_and_build(
            r#"digraph G {
            start [label="Go"]
            work [shape="box"]
            start -> work
        }"#,
        );

        assert_eq!(pg.start_node().unwrap().id, "start");
    }

    #[test]
    fn exit_node_finds_msquare() {
        let pg = parse_and_build(
            r#"digraph G {
            work -> finish
            finish [shape="Msquare"]
        }"#,
        );

        assert_eq!(pg.exit_node().unwrap().id, "finish");
    }

    #[test]
    fn outgoing_edges_returns_correct_edges() {
        let pg = parse_and_build(
            r#"digraph G {
            A -> B [label="first"]
            A -> C [label="second"]
            B -> C
        }"#,
        );

        let edges_a = pg.outgoing_edges("A");
        assert_eq!(edges_a.len(), 2);
        let labels: Vec<_> = edges_a.iter().filter_map(|e| e.label.as_deref()).collect();
        assert!(labels.contains(&"first"));
        assert!(labels.contains(&"second"));

        assert_eq!(pg.outgoing_edges("B").len(), 1);
        assert_eq!(pg.outgoing_edges("C").len(), 0);
    }

    #[test]
    fn typed_attribute_extraction() {
        let pg = parse_and_build(
            r#"digraph G {
            step [max_retries=3, goal_gate=true, timeout=30s, allow_partial=false]
        }"#,
        );

        let node = pg.node("step").unwrap();
        assert_eq!(node.max_retries, 3);
        assert!(node.goal_gate);
        assert_eq!(node.timeout, Some(Duration::from_secs(30)));
        assert!(!node.allow_partial);
        assert_eq!(node.reasoning_effort, REASONING_EFFORT_DEFAULT);
    }

    #[test]
    fn class_tokens_split_on_space_and_comma() {
        let pg = parse_and_build(
            r#"digraph G {
            a [class="fast gpu,experimental"]
        }"#,
        );
        let node = pg.node("a").unwrap();
        assert_eq!(node.classes, vec!["fast", "gpu", "experimental"]);
    }

    #[test]
    fn graph_level_attributes_extracted() {
        let pg = parse_and_build(
            r#"digraph G {
            goal = "Complete the pipeline"
            default_max_retry = 2
            retry_target = "plan"
            fallback_retry_target = "triage"
            A -> B
        }"#,
        );

        assert_eq!(pg.goal, "Complete the pipeline");
        assert_eq!(pg.default_max_retry, 2);
        assert_eq!(pg.retry_target.as_deref(), Some("plan"));
        assert_eq!(pg.fallback_retry_target.as_deref(), Some("triage"));
    }

    #[test]
    fn edge_weight_condition_and_loop_restart() {
        let pg = parse_and_build(
            r#"digraph G {
            A -> B [weight=5, condition="outcome=success", loop_restart=true]
        }"#,
        );

        let edges = pg.outgoing_edges("A");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].weight, 5);
        assert_eq!(edges[0].condition.as_deref(), Some("outcome=success"));
        assert!(edges[0].loop_restart);
    }

    #[test]
    fn edge_weight_defaults_to_one() {
        let pg = parse_and_build(r#"digraph G { A -> B }"#);
        assert_eq!(pg.outgoing_edges("A")[0].weight, 1);
    }

    #[test]
    fn default_shape_is_box() {
        let pg = parse_and_build(
            r#"digraph G {
            plain_node [label="No shape set"]
        }"#,
        );

        assert_eq!(pg.node("plain_node").unwrap().shape, "box");
    }

    #[test]
    fn raw_attrs_keep_handler_specific_keys() {
        let pg = parse_and_build(
            r#"digraph G {
            run_tests [shape="parallelogram", command="cargo test"]
        }"#,
        );
        let node = pg.node("run_tests").unwrap();
        assert_eq!(
            node.raw_attrs.get("command"),
            Some(&AttributeValue::String("cargo test".into()))
        );
    }
}
