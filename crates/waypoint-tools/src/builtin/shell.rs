use async_trait::async_trait;
use serde_json::json;

use crate::environment::ExecutionEnvironment;
use crate::tool::{Tool, ToolDefinition};
use crate::truncation::truncate_lines;

const MAX_OUTPUT_LINES: usize = 800;

/// Runs a command through the POSIX shell in the workspace.
///
/// The effective timeout is the smaller of the per-call override and the
/// configured maximum.
pub struct ShellTool {
    pub default_timeout_ms: u64,
    pub max_timeout_ms: u64,
}

impl Default for ShellTool {
    fn default() -> Self {
        Self {
            default_timeout_ms: 10_000,
            max_timeout_ms: 600_000,
        }
    }
}

impl ShellTool {
    pub fn new(default_timeout_ms: u64, max_timeout_ms: u64) -> Self {
        Self {
            default_timeout_ms,
            max_timeout_ms,
        }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "shell".to_string(),
            description:
                "Execute a shell command in the workspace. Returns combined stdout and stderr. \
                 Prefer heredocs over write_file for large file contents."
                    .to_string(),
            parameters: json!({
                "type": "object",
                "required": ["command"],
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The shell command to execute"
                    },
                    "timeout_ms": {
                        "type": "integer",
                        "description": "Timeout in milliseconds",
                        "default": self.default_timeout_ms
                    }
                }
            }),
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        env: &dyn ExecutionEnvironment,
    ) -> waypoint_types::Result<String> {
        let command = arguments
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| waypoint_types::WaypointError::ToolError {
                tool: "shell".into(),
                message: "command is required".into(),
            })?;

        let timeout_ms = arguments
            .get("timeout_ms")
            .and_then(|v| v.as_u64())
            .unwrap_or(self.default_timeout_ms)
            .min(self.max_timeout_ms);

        let result = env.exec_command(command, timeout_ms, None, None).await?;

        let combined = result.combined_output();
        let output = if result.exit_code == 0 {
            combined
        } else {
            format!("[Exit code: {}]\n{}", result.exit_code, combined)
        };

        Ok(truncate_lines(&output, MAX_OUTPUT_LINES))
    }
}
