//! Graph transforms applied between parsing and validation.
//!
//! Two transforms are required: the stylesheet transform resolves per-node
//! model/provider/retry/timeout defaults, and variable expansion
//! substitutes `$goal` (and other graph attributes as `$name`) in prompts.

use std::collections::HashMap;

use crate::graph::PipelineGraph;
use crate::stylesheet::{apply_stylesheet, parse_stylesheet};
use waypoint_dot::AttributeValue;

/// Apply all transforms to a pipeline graph in declared order.
pub fn apply_transforms(graph: &mut PipelineGraph) -> waypoint_types::Result<()> {
    apply_model_stylesheet(graph)?;
    expand_prompt_variables(graph);
    Ok(())
}

/// Apply the model stylesheet carried in the graph's `model_stylesheet` attr.
fn apply_model_stylesheet(graph: &mut PipelineGraph) -> waypoint_types::Result<()> {
    if let Some(css) = graph.model_stylesheet.clone() {
        let stylesheet = parse_stylesheet(&css)?;
        apply_stylesheet(graph, &stylesheet);
    }
    Ok(())
}

/// Expand `$name` references in node prompts from graph-level attributes.
/// `$goal` always resolves to the graph goal.
fn expand_prompt_variables(graph: &mut PipelineGraph) {
    let mut vars: HashMap<String, String> = graph
        .attrs
        .iter()
        .filter_map(|(k, v)| match v {
            AttributeValue::String(s) => Some((k.clone(), s.clone())),
            AttributeValue::Integer(i) => Some((k.clone(), i.to_string())),
            AttributeValue::Boolean(b) => Some((k.clone(), b.to_string())),
            AttributeValue::Float(f) => Some((k.clone(), f.to_string())),
            AttributeValue::Duration(_) => None,
        })
        .collect();
    vars.insert("goal".to_string(), graph.goal.clone());

    if graph.goal.is_empty() && vars.values().all(|v| v.is_empty()) {
        return;
    }

    for node in graph.all_nodes_mut() {
        if let Some(ref prompt) = node.prompt {
            let expanded = expand_variables(prompt, &vars);
            if expanded != *prompt {
                node.prompt = Some(expanded);
            }
        }
    }
}

/// Replace every `$key` occurrence with its value.
///
/// Longer keys substitute first so `$goalpost` is never clobbered by
/// `$goal` when both variables exist.
pub fn expand_variables(template: &str, vars: &HashMap<String, String>) -> String {
    let mut keys: Vec<&String> = vars.keys().collect();
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));

    let mut result = template.to_string();
    for key in keys {
        let pattern = format!("${}", key);
        result = result.replace(&pattern, &vars[key]);
    }
    result
}
