//! Deterministic edge selection.
//!
//! After a node completes, one outgoing edge is selected by a priority
//! cascade: single edge, condition match, preferred label, suggested next
//! ids, highest weight, lexical tiebreak on the target id. For a fixed
//! (edges, outcome, context) input the result never varies.

use crate::condition::{evaluate_condition, parse_condition};
use crate::graph::PipelineEdge;
use waypoint_types::Outcome;

/// Select the next edge to follow after a node completes.
/// Returns `None` when no edge applies (terminal node or dead end).
pub fn select_edge<'a>(
    edges: &'a [PipelineEdge],
    outcome: &Outcome,
    resolve: &dyn Fn(&str) -> String,
) -> Option<&'a PipelineEdge> {
    if edges.is_empty() {
        return None;
    }
    // Step 1: a single edge is followed unconditionally
    if edges.len() == 1 {
        return Some(&edges[0]);
    }

    // Step 2: conditional matches
    let condition_matches: Vec<&PipelineEdge> = edges
        .iter()
        .filter(|e| match e.condition.as_deref() {
            Some(cond) if !cond.trim().is_empty() => match parse_condition(cond) {
                Ok(expr) => evaluate_condition(&expr, resolve),
                Err(_) => false,
            },
            _ => false,
        })
        .collect();

    let candidates: Vec<&PipelineEdge> = match condition_matches.len() {
        1 => return Some(condition_matches[0]),
        n if n > 1 => condition_matches,
        _ => {
            // No condition fired: the unconditional edges compete
            let unconditional: Vec<&PipelineEdge> = edges
                .iter()
                .filter(|e| e.condition.as_deref().map_or(true, |c| c.trim().is_empty()))
                .collect();
            if unconditional.is_empty() {
                return None;
            }
            unconditional
        }
    };

    // Step 3: preferred label narrows the candidates
    let candidates = match outcome.preferred_label.as_deref() {
        Some(label) => {
            let normalized = normalize_label(label);
            let matching: Vec<&PipelineEdge> = candidates
                .iter()
                .copied()
                .filter(|e| {
                    e.label
                        .as_deref()
                        .map(|l| normalize_label(l) == normalized)
                        .unwrap_or(false)
                })
                .collect();
            match matching.len() {
                0 => candidates,
                1 => return Some(matching[0]),
                _ => matching,
            }
        }
        None => candidates,
    };

    // Step 4: first suggested target id that matches a candidate wins
    for suggested in &outcome.suggested_next_ids {
        if let Some(edge) = candidates.iter().copied().find(|e| e.to == *suggested) {
            return Some(edge);
        }
    }

    // Steps 5 and 6: highest weight, then lexicographically smallest target
    best_by_weight_then_lexical(&candidates)
}

/// Normalize a label for comparison: trim, lowercase, strip a leading
/// accelerator prefix like `[Y] ` (at most 10 chars inside the brackets).
pub fn normalize_label(label: &str) -> String {
    let s = label.trim().to_lowercase();
    regex::Regex::new(r"^\[[^\]]{1,10}\]\s*")
        .unwrap()
        .replace(&s, "")
        .to_string()
}

fn best_by_weight_then_lexical<'a>(edges: &[&'a PipelineEdge]) -> Option<&'a PipelineEdge> {
    edges.iter().copied().max_by(|a, b| {
        a.weight
            .cmp(&b.weight)
            .then(b.to.cmp(&a.to)) // lexical ascending = reverse compare
    })
}
