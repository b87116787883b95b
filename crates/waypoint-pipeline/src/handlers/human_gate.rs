//! Human gate handler — suspends the pipeline until an interviewer answers.

use std::sync::Arc;

use async_trait::async_trait;

use waypoint_types::{Context, Outcome, Result, StageStatus};

use crate::graph::PipelineNode;
use crate::handler::{HandlerScope, NodeHandler};
use crate::interviewer::{Interviewer, Question};

pub struct HumanGateHandler {
    interviewer: Arc<dyn Interviewer>,
}

impl HumanGateHandler {
    pub fn new(interviewer: Arc<dyn Interviewer>) -> Self {
        Self { interviewer }
    }
}

#[async_trait]
impl NodeHandler for HumanGateHandler {
    fn handler_type(&self) -> &str {
        "human.gate"
    }

    async fn execute(
        &self,
        node: &PipelineNode,
        _ctx: &Context,
        scope: &HandlerScope<'_>,
    ) -> Result<Outcome> {
        // The outgoing edges' non-empty labels become the option list
        let options: Vec<String> = scope
            .graph
            .outgoing_edges(&node.id)
            .iter()
            .filter_map(|e| e.label.clone())
            .filter(|l| !l.trim().is_empty())
            .collect();

        let text = node.prompt.clone().unwrap_or_else(|| node.label.clone());
        let question = if options.is_empty() {
            Question::free_text(text)
        } else {
            Question::single_select(text, options)
        };

        let answer = self.interviewer.ask(&question, scope.cancel).await?;

        // Canonical option string wins for edge matching; free text otherwise
        let preferred = answer
            .selected_options
            .first()
            .cloned()
            .or_else(|| {
                if answer.text.is_empty() {
                    None
                } else {
                    Some(answer.text.clone())
                }
            });

        Ok(Outcome {
            status: StageStatus::Success,
            preferred_label: preferred,
            suggested_next_ids: vec![],
            context_updates: std::collections::HashMap::new(),
            notes: "Human responded".into(),
            failure_reason: None,
        })
    }
}
