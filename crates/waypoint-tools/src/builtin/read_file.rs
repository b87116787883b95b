use std::path::Path;

use async_trait::async_trait;
use serde_json::json;

use crate::environment::ExecutionEnvironment;
use crate::tool::{Tool, ToolDefinition};
use crate::truncation::truncate_bytes;

const MAX_OUTPUT_BYTES: usize = 50_000;

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "read_file".to_string(),
            description: "Read a file from the filesystem. Returns content with line numbers."
                .to_string(),
            parameters: json!({
                "type": "object",
                "required": ["path"],
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path to the file to read"
                    },
                    "offset": {
                        "type": "integer",
                        "description": "Line number to start reading from (1-based)"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of lines to read",
                        "default": 2000
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
        let path = arguments
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| waypoint_types::WaypointError::ToolError {
                tool: "read_file".into(),
                message: "path is required".into(),
            })?;

        let offset = arguments
            .get("offset")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize);

        let limit = arguments
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(2000);

        let content = env.read_file(Path::new(path)).await.map_err(|e| {
            waypoint_types::WaypointError::ToolError {
                tool: "read_file".into(),
                message: format!("Cannot read {}: {}", path, e),
            }
        })?;

        let lines: Vec<&str> = content.lines().collect();
        let start = offset.unwrap_or(1).saturating_sub(1);
        let end = (start + limit).min(lines.len());
        let selected = if start < lines.len() {
            &lines[start..end]
        } else {
            &[]
        };

        let width = if end == 0 { 1 } else { end.to_string().len() };
        let numbered: Vec<String> = selected
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{:>width$} | {}", start + i + 1, line, width = width))
            .collect();

        Ok(truncate_bytes(&numbered.join("\n"), MAX_OUTPUT_BYTES))
    }
}
