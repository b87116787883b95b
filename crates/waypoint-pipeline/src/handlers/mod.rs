//! Node handlers beyond the trivial start/exit/conditional.

pub mod codergen;
pub mod human_gate;
pub mod parallel;
pub mod tool_shell;

pub use codergen::{CodergenConfig, CodergenHandler};
pub use human_gate::HumanGateHandler;
pub use parallel::{FanInHandler, ParallelHandler};
pub use tool_shell::ToolShellHandler;

// ---------------------------------------------------------------------------
// Shared test helpers used by child handler modules
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;

    use waypoint_dot::AttributeValue;

    use crate::graph::{PipelineGraph, PipelineNode, REASONING_EFFORT_DEFAULT};

    pub(crate) fn make_node(
        id: &str,
        shape: &str,
        prompt: Option<&str>,
        attrs: HashMap<String, AttributeValue>,
    ) -> PipelineNode {
        PipelineNode {
            id: id.to_string(),
            label: id.to_string(),
            shape: shape.to_string(),
            node_type: None,
            prompt: prompt.map(String::from),
            classes: Vec::new(),
            llm_model: None,
            llm_provider: None,
            reasoning_effort: REASONING_EFFORT_DEFAULT.to_string(),
            fidelity: None,
            max_retries: 0,
            timeout: None,
            goal_gate: false,
            retry_target: None,
            fallback_retry_target: None,
            allow_partial: false,
            raw_attrs: attrs,
        }
    }

    pub(crate) fn make_graph(dot: &str) -> PipelineGraph {
        let parsed = waypoint_dot::parse(dot).unwrap();
        PipelineGraph::from_dot(parsed).unwrap()
    }

    pub(crate) fn make_minimal_graph() -> PipelineGraph {
        make_graph(r#"digraph G { A -> B }"#)
    }
}
