use std::path::Path;

use async_trait::async_trait;
use serde_json::json;

use crate::environment::ExecutionEnvironment;
use crate::tool::{Tool, ToolDefinition};

pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "edit_file".to_string(),
            description: "Edit a file by replacing an exact string with a new string.".to_string(),
            parameters: json!({
                "type": "object",
                "required": ["path", "old_string", "new_string"],
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path to the file to edit"
                    },
                    "old_string": {
                        "type": "string",
                        "description": "The exact string to find and replace; must occur exactly once"
                    },
                    "new_string": {
                        "type": "string",
                        "description": "The replacement string"
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
                tool: "edit_file".into(),
                message: "path is required".into(),
            })?;

        let old_string = arguments
            .get("old_string")
            .and_then(|v| v.as_str())
            .ok_or_else(|| waypoint_types::WaypointError::ToolError {
                tool: "edit_file".into(),
                message: "old_string is required".into(),
            })?;

        let new_string = arguments
            .get("new_string")
            .and_then(|v| v.as_str())
            .ok_or_else(|| waypoint_types::WaypointError::ToolError {
                tool: "edit_file".into(),
                message: "new_string is required".into(),
            })?;

        let file_path = Path::new(path);
        let content = env.read_file(file_path).await.map_err(|e| {
            waypoint_types::WaypointError::ToolError {
                tool: "edit_file".into(),
                message: format!("Cannot read {}: {}", path, e),
            }
        })?;

        let match_count = content.matches(old_string).count();

        if match_count == 0 {
            return Err(waypoint_types::WaypointError::ToolError {
                tool: "edit_file".into(),
                message: format!("old_string not found in {}", path),
            });
        }

        if match_count > 1 {
            // Report line numbers of each occurrence to help disambiguation
            let mut occurrences = Vec::new();
            let mut search_start = 0;
            while let Some(pos) = content[search_start..].find(old_string) {
                let abs_pos = search_start + pos;
                let line_num = content[..abs_pos].lines().count();
                occurrences.push(line_num);
                search_start = abs_pos + old_string.len();
            }
            return Err(waypoint_types::WaypointError::ToolError {
                tool: "edit_file".into(),
                message: format!(
                    "old_string found {} times in {} (at lines: {:?}); provide more surrounding context to make it unique",
                    match_count, path, occurrences
                ),
            });
        }

        let new_content = content.replacen(old_string, new_string, 1);
        env.write_file(file_path, &new_content).await?;

        Ok(format!("Successfully replaced 1 occurrence in {}", path))
    }
}
