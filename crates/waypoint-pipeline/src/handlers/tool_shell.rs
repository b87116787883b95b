//! Tool-shell handler — runs the node's `command` attribute in a shell.
//!
//! Writes `stdout.txt` and `stderr.txt` into the node's artifact directory.
//! Exit 0 maps to success; a non-zero exit maps to retry with stderr in the
//! outcome notes so the engine's retry policy drives re-execution.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use waypoint_dot::AttributeValue;

use waypoint_types::{Context, Outcome, Result, StageStatus, WaypointError};

use crate::graph::PipelineNode;
use crate::handler::{HandlerScope, NodeHandler};

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);
const NOTES_LIMIT: usize = 4096;

pub struct ToolShellHandler;

fn clamp_notes(text: &str) -> String {
    if text.len() <= NOTES_LIMIT {
        return text.to_string();
    }
    let mut cut = NOTES_LIMIT;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...(truncated)", &text[..cut])
}

#[async_trait]
impl NodeHandler for ToolShellHandler {
    fn handler_type(&self) -> &str {
        "tool.shell"
    }

    async fn execute(
        &self,
        node: &PipelineNode,
        context: &Context,
        scope: &HandlerScope<'_>,
    ) -> Result<Outcome> {
        let command = node
            .raw_attrs
            .get("command")
            .and_then(|v| match v {
                AttributeValue::String(s) => Some(s.clone()),
                _ => None,
            })
            .ok_or_else(|| WaypointError::HandlerError {
                handler: "tool.shell".into(),
                node: node.id.clone(),
                message: "Missing command attribute".into(),
            })?;

        tracing::info!(node = %node.id, command = %command, "Executing tool command");

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(&command);
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        // Timeout and cancellation drop the child; make the drop kill it
        cmd.kill_on_drop(true);

        let workdir = context.get("workdir").await;
        if !workdir.is_empty() {
            cmd.current_dir(&workdir);
        }

        let child = cmd.spawn().map_err(|e| WaypointError::HandlerError {
            handler: "tool.shell".into(),
            node: node.id.clone(),
            message: format!("Failed to spawn command: {}", e),
        })?;

        let timeout_dur = node.timeout.unwrap_or(DEFAULT_COMMAND_TIMEOUT);
        let output = tokio::select! {
            out = tokio::time::timeout(timeout_dur, child.wait_with_output()) => {
                match out {
                    Ok(io_result) => io_result.map_err(|e| WaypointError::HandlerError {
                        handler: "tool.shell".into(),
                        node: node.id.clone(),
                        message: format!("Command execution failed: {}", e),
                    })?,
                    Err(_) => {
                        return Ok(Outcome::retry(format!(
                            "Command timed out after {}ms",
                            timeout_dur.as_millis()
                        )));
                    }
                }
            }
            _ = scope.cancel.cancelled() => return Err(WaypointError::Cancelled),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        // Artifacts first, outcome second
        let node_dir = scope.node_dir(&node.id).await?;
        write_artifact(&node_dir, "stdout.txt", &stdout).await;
        write_artifact(&node_dir, "stderr.txt", &stderr).await;

        tracing::info!(
            node = %node.id,
            exit_code,
            stdout_len = stdout.len(),
            stderr_len = stderr.len(),
            "Tool command completed"
        );

        let mut updates = HashMap::new();
        updates.insert("last_tool_command".into(), command);
        updates.insert(format!("{}.exit_code", node.id), exit_code.to_string());

        if output.status.success() {
            Ok(Outcome {
                status: StageStatus::Success,
                preferred_label: None,
                suggested_next_ids: vec![],
                context_updates: updates,
                notes: clamp_notes(&stdout),
                failure_reason: None,
            })
        } else {
            Ok(Outcome {
                status: StageStatus::Retry,
                preferred_label: None,
                suggested_next_ids: vec![],
                context_updates: updates,
                notes: clamp_notes(&format!("exit code {}: {}", exit_code, stderr)),
                failure_reason: None,
            })
        }
    }
}

async fn write_artifact(dir: &Path, name: &str, content: &str) {
    if let Err(e) = tokio::fs::write(dir.join(name), content).await {
        tracing::warn!(artifact = name, error = %e, "Failed to write artifact");
    }
}
