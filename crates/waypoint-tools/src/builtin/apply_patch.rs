use async_trait::async_trait;
use serde_json::json;

use crate::environment::ExecutionEnvironment;
use crate::tool::{Tool, ToolDefinition};

const PATCH_TIMEOUT_MS: u64 = 30_000;

/// Applies a unified diff via the system `patch` binary.
///
/// The patch body is written to a temp file rather than piped through a
/// shell-quoted string. Strip level follows the path style: `a/`/`b/`
/// prefixed paths apply with `-p1`, absolute paths with `-p0`.
pub struct ApplyPatchTool;

fn detect_strip_level(patch: &str) -> u8 {
    for line in patch.lines() {
        if let Some(rest) = line
            .strip_prefix("--- ")
            .or_else(|| line.strip_prefix("+++ "))
        {
            let path = rest.split_whitespace().next().unwrap_or("");
            if path.starts_with("a/") || path.starts_with("b/") {
                return 1;
            }
            if path.starts_with('/') {
                return 0;
            }
        }
    }
    1
}

#[async_trait]
impl Tool for ApplyPatchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "apply_patch".to_string(),
            description:
                "Apply a unified diff to the workspace. For whole-file changes prefer write_file \
                 or a shell heredoc; patches are best for small localized edits."
                    .to_string(),
            parameters: json!({
                "type": "object",
                "required": ["patch"],
                "properties": {
                    "patch": {
                        "type": "string",
                        "description": "Unified diff text"
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
        let patch = arguments
            .get("patch")
            .and_then(|v| v.as_str())
            .ok_or_else(|| waypoint_types::WaypointError::ToolError {
                tool: "apply_patch".into(),
                message: "patch is required".into(),
            })?;

        let strip = detect_strip_level(patch);

        let temp_path =
            std::env::temp_dir().join(format!("waypoint-patch-{}.diff", uuid::Uuid::new_v4()));
        tokio::fs::write(&temp_path, patch).await?;

        let command = format!("patch -p{} -i '{}'", strip, temp_path.display());
        let result = env
            .exec_command(&command, PATCH_TIMEOUT_MS, None, None)
            .await;

        // Temp file cleanup runs on every path, including errors
        let _ = tokio::fs::remove_file(&temp_path).await;
        let result = result?;

        if result.exit_code != 0 {
            return Err(waypoint_types::WaypointError::ToolError {
                tool: "apply_patch".into(),
                message: format!(
                    "patch -p{} failed (exit {}): {}",
                    strip,
                    result.exit_code,
                    result.combined_output().trim()
                ),
            });
        }

        Ok(format!("Patch applied with -p{}\n{}", strip, result.stdout))
    }
}
