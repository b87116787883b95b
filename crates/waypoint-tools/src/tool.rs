use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::environment::ExecutionEnvironment;

/// Definition of a tool that can be presented to an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON-schema object describing the parameters, including "required".
    pub parameters: serde_json::Value,
}

/// Trait for tools that can be invoked by an agent.
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;
    async fn execute(
        &self,
        arguments: serde_json::Value,
        env: &dyn ExecutionEnvironment,
    ) -> waypoint_types::Result<String>;
}

/// Registry that holds named tools and provides lookup and invocation.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let def = tool.definition();
        self.tools.insert(def.name, Box::new(tool));
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Invoke a tool by name with a raw JSON arguments string.
    ///
    /// An empty argument string reads as `{}`; malformed JSON is a tool error.
    pub async fn invoke(
        &self,
        name: &str,
        raw_arguments: &str,
        env: &dyn ExecutionEnvironment,
    ) -> waypoint_types::Result<String> {
        let tool = self
            .get(name)
            .ok_or_else(|| waypoint_types::WaypointError::ToolError {
                tool: name.to_string(),
                message: format!("Unknown tool: {}", name),
            })?;

        let arguments: serde_json::Value = if raw_arguments.trim().is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(raw_arguments).map_err(|e| {
                waypoint_types::WaypointError::ToolError {
                    tool: name.to_string(),
                    message: format!("Invalid tool arguments JSON: {}", e),
                }
            })?
        };

        tool.execute(arguments, env).await
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
