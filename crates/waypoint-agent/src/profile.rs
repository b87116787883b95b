//! Session profiles: the tool surface and prompt conventions for a provider.

use waypoint_tools::{ExecutionEnvironment, ShellLimits, ToolProfile, ToolRegistry};

use crate::prompt_builder::SystemPromptBuilder;

const BASE_PROMPT: &str = "You are an autonomous coding agent working inside a workspace. \
Use the available tools to inspect and modify files and run commands. \
Work step by step and report what you did when finished.";

/// Everything provider-shaped a session needs: which tools exist, how the
/// system prompt is built, and whether reasoning effort is honored.
pub struct SessionProfile {
    pub provider: String,
    pub registry: ToolRegistry,
    pub base_prompt: String,
    pub supports_reasoning: bool,
}

impl SessionProfile {
    pub fn for_provider(provider: &str, shell_limits: ShellLimits) -> Self {
        let tool_profile = ToolProfile::for_provider(provider).with_shell_limits(shell_limits);
        Self {
            provider: provider.to_string(),
            registry: tool_profile.build_registry(),
            base_prompt: BASE_PROMPT.to_string(),
            supports_reasoning: matches!(provider, "anthropic" | "openai"),
        }
    }

    /// Build the system prompt for a session rooted at `env`.
    pub fn build_system_prompt(&self, env: &dyn ExecutionEnvironment, goal: &str) -> String {
        SystemPromptBuilder::new()
            .with_base(&self.base_prompt)
            .with_goal(goal)
            .with_tools(&self.registry.definitions())
            .with_environment(env)
            .build()
    }
}
