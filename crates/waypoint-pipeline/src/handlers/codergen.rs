//! Codergen handler — drives the agentic coding loop for one node.
//!
//! Writes `prompt.md` before the run and `response.md` after. The agent's
//! in-band failure sentinels ("[Error: …]", "[Turn limit reached]",
//! "[Tool round limit reached]") classify as retry; anything the session
//! raises classifies as a failed outcome.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use waypoint_agent::{is_failure_sentinel, AgentSession, SessionConfig, SessionProfile};
use waypoint_llm::{LlmClient, ReasoningEffort};
use waypoint_tools::{LocalExecutionEnvironment, ShellLimits};
use waypoint_types::{Context, Outcome, Result, WaypointError};

use crate::graph::PipelineNode;
use crate::handler::{HandlerScope, NodeHandler};

/// Defaults shared by every codergen session in a run.
#[derive(Debug, Clone)]
pub struct CodergenConfig {
    /// Workspace the agent's tools operate in.
    pub workspace: PathBuf,
    pub default_model: String,
    pub default_provider: String,
    pub max_turns: usize,
    pub max_tool_rounds: usize,
    pub default_command_timeout_ms: u64,
    pub max_command_timeout_ms: u64,
}

impl Default for CodergenConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            workspace: PathBuf::from("."),
            default_model: session.model,
            default_provider: "anthropic".to_string(),
            max_turns: session.max_turns,
            max_tool_rounds: session.max_tool_rounds,
            default_command_timeout_ms: session.default_command_timeout_ms,
            max_command_timeout_ms: session.max_command_timeout_ms,
        }
    }
}

pub struct CodergenHandler {
    client: Arc<LlmClient>,
    config: CodergenConfig,
}

impl CodergenHandler {
    pub fn new(client: Arc<LlmClient>, config: CodergenConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl NodeHandler for CodergenHandler {
    fn handler_type(&self) -> &str {
        "codergen"
    }

    async fn execute(
        &self,
        node: &PipelineNode,
        context: &Context,
        scope: &HandlerScope<'_>,
    ) -> Result<Outcome> {
        let prompt = node
            .prompt
            .clone()
            .unwrap_or_else(|| node.label.clone());

        let node_dir = scope.node_dir(&node.id).await?;
        tokio::fs::write(node_dir.join("prompt.md"), &prompt).await?;

        let mut updates = HashMap::new();
        updates.insert("last_action".into(), "codergen".into());

        if context.get("dry_run").await == "true" {
            tracing::info!(node = %node.id, "Dry run, skipping LLM call");
            tokio::fs::write(node_dir.join("response.md"), "(dry run)").await?;
            let mut outcome = Outcome::success("Dry run, no LLM call made");
            outcome.context_updates = updates;
            return Ok(outcome);
        }

        let provider = node
            .llm_provider
            .clone()
            .unwrap_or_else(|| self.config.default_provider.clone());
        let model = node
            .llm_model
            .clone()
            .unwrap_or_else(|| self.config.default_model.clone());

        let shell_limits = ShellLimits {
            default_timeout_ms: self.config.default_command_timeout_ms,
            max_timeout_ms: self.config.max_command_timeout_ms,
        };
        let profile = SessionProfile::for_provider(&provider, shell_limits);
        let env = Box::new(LocalExecutionEnvironment::new(&self.config.workspace));

        let session_config = SessionConfig {
            model,
            provider: Some(provider),
            goal: context.get("goal").await,
            reasoning_effort: ReasoningEffort::parse(&node.reasoning_effort),
            max_turns: self.config.max_turns,
            max_tool_rounds: self.config.max_tool_rounds,
            default_command_timeout_ms: self.config.default_command_timeout_ms,
            max_command_timeout_ms: self.config.max_command_timeout_ms,
            ..Default::default()
        };

        let mut session = AgentSession::new(self.client.clone(), profile, env, session_config);
        tracing::info!(node = %node.id, session = %session.id(), "Codergen session starting");

        let response = match session.process_input(&prompt, scope.cancel).await {
            Ok(text) => {
                session.close();
                text
            }
            Err(WaypointError::Cancelled) => return Err(WaypointError::Cancelled),
            Err(e) => {
                tracing::warn!(node = %node.id, error = %e, "Codergen session failed");
                let mut outcome = Outcome::fail(e.to_string());
                outcome.context_updates = updates;
                return Ok(outcome);
            }
        };

        tokio::fs::write(node_dir.join("response.md"), &response).await?;

        if is_failure_sentinel(&response) {
            let mut outcome = Outcome::retry(response);
            outcome.context_updates = updates;
            Ok(outcome)
        } else {
            let mut outcome = Outcome::success(response);
            outcome.context_updates = updates;
            Ok(outcome)
        }
    }
}
