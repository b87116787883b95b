//! Provider-aligned tool profiles.
//!
//! Different LLM providers have different preferences for which tools to
//! expose. A [`ToolProfile`] selects which built-in tools are registered.

use crate::builtin::*;
use crate::tool::ToolRegistry;

/// Shell timeout configuration carried into the registry.
#[derive(Debug, Clone, Copy)]
pub struct ShellLimits {
    pub default_timeout_ms: u64,
    pub max_timeout_ms: u64,
}

impl Default for ShellLimits {
    fn default() -> Self {
        Self {
            default_timeout_ms: 10_000,
            max_timeout_ms: 600_000,
        }
    }
}

/// A profile that selects which tools to register for a given LLM provider.
pub struct ToolProfile {
    pub name: String,
    pub tools: Vec<String>,
    pub shell_limits: ShellLimits,
}

impl ToolProfile {
    /// Profile for Anthropic models (Claude).
    /// Uses edit_file with old_string/new_string pattern.
    pub fn anthropic() -> Self {
        Self {
            name: "anthropic".into(),
            tools: vec![
                "read_file".into(),
                "write_file".into(),
                "edit_file".into(),
                "shell".into(),
                "grep".into(),
                "glob".into(),
            ],
            shell_limits: ShellLimits::default(),
        }
    }

    /// Profile for OpenAI models. Adds apply_patch, which these models emit.
    pub fn openai() -> Self {
        Self {
            name: "openai".into(),
            tools: vec![
                "read_file".into(),
                "write_file".into(),
                "edit_file".into(),
                "shell".into(),
                "grep".into(),
                "glob".into(),
                "apply_patch".into(),
            ],
            shell_limits: ShellLimits::default(),
        }
    }

    /// Profile for Google Gemini models.
    pub fn gemini() -> Self {
        Self {
            name: "gemini".into(),
            tools: vec![
                "read_file".into(),
                "write_file".into(),
                "edit_file".into(),
                "shell".into(),
                "grep".into(),
                "glob".into(),
            ],
            shell_limits: ShellLimits::default(),
        }
    }

    /// Pick the profile matching a provider name; anthropic is the default.
    pub fn for_provider(provider: &str) -> Self {
        match provider {
            "openai" => Self::openai(),
            "google" | "gemini" => Self::gemini(),
            _ => Self::anthropic(),
        }
    }

    pub fn with_shell_limits(mut self, limits: ShellLimits) -> Self {
        self.shell_limits = limits;
        self
    }

    /// Build a [`ToolRegistry`] from this profile using the built-in tools.
    pub fn build_registry(&self) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for name in &self.tools {
            match name.as_str() {
                "read_file" => registry.register(ReadFileTool),
                "write_file" => registry.register(WriteFileTool),
                "edit_file" => registry.register(EditFileTool),
                "shell" => registry.register(ShellTool::new(
                    self.shell_limits.default_timeout_ms,
                    self.shell_limits.max_timeout_ms,
                )),
                "grep" => registry.register(GrepTool),
                "glob" => registry.register(GlobTool),
                "apply_patch" => registry.register(ApplyPatchTool),
                _ => {} // skip unknown tool names
            }
        }
        registry
    }
}
