//! System prompt builder.
//!
//! Assembles the agent's system prompt from ordered sections: base prompt,
//! goal, task instructions, tool descriptions, environment facts.

use waypoint_tools::{ExecutionEnvironment, ToolDefinition};

/// Builds a complete system prompt for an agent session.
pub struct SystemPromptBuilder {
    sections: Vec<PromptSection>,
}

#[derive(Debug, Clone)]
struct PromptSection {
    heading: String,
    content: String,
    priority: u8, // 0 = highest
}

impl SystemPromptBuilder {
    pub fn new() -> Self {
        Self {
            sections: Vec::new(),
        }
    }

    /// Add the base system prompt (always first).
    pub fn with_base(mut self, prompt: &str) -> Self {
        self.sections.push(PromptSection {
            heading: String::new(),
            content: prompt.to_string(),
            priority: 0,
        });
        self
    }

    /// Add the pipeline goal.
    pub fn with_goal(mut self, goal: &str) -> Self {
        if !goal.is_empty() {
            self.sections.push(PromptSection {
                heading: "Goal".to_string(),
                content: goal.to_string(),
                priority: 1,
            });
        }
        self
    }

    /// Add node-specific prompt/instructions.
    pub fn with_task(mut self, prompt: &str) -> Self {
        self.sections.push(PromptSection {
            heading: "Task".to_string(),
            content: prompt.to_string(),
            priority: 2,
        });
        self
    }

    /// Add tool descriptions as a section.
    pub fn with_tools(mut self, tool_definitions: &[ToolDefinition]) -> Self {
        if !tool_definitions.is_empty() {
            let mut content = String::from("You have access to the following tools:\n\n");
            for tool in tool_definitions {
                content.push_str(&format!("- **{}**: {}\n", tool.name, tool.description));
            }
            content.push_str(
                "\nFor files longer than ~200 lines, write them with a shell heredoc rather \
                 than write_file.\n",
            );
            self.sections.push(PromptSection {
                heading: "Available Tools".to_string(),
                content,
                priority: 3,
            });
        }
        self
    }

    /// Add workspace facts from the execution environment.
    pub fn with_environment(mut self, env: &dyn ExecutionEnvironment) -> Self {
        let content = format!(
            "Working directory: {}\nPlatform: {}\n",
            env.working_directory().display(),
            env.platform()
        );
        self.sections.push(PromptSection {
            heading: "Environment".to_string(),
            content,
            priority: 4,
        });
        self
    }

    /// Build the final system prompt.
    pub fn build(mut self) -> String {
        self.sections.sort_by_key(|s| s.priority);
        let mut parts = Vec::new();
        for section in &self.sections {
            if section.heading.is_empty() {
                parts.push(section.content.clone());
            } else {
                parts.push(format!("# {}\n\n{}", section.heading, section.content));
            }
        }
        parts.join("\n\n")
    }
}

impl Default for SystemPromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_assemble_in_priority_order() {
        let prompt = SystemPromptBuilder::new()
            .with_task("Fix the bug")
            .with_goal("Ship the release")
            .with_base("You are a coding agent.")
            .build();

        let base_pos = prompt.find("You are a coding agent.").unwrap();
        let goal_pos = prompt.find("# Goal").unwrap();
        let task_pos = prompt.find("# Task").unwrap();
        assert!(base_pos < goal_pos);
        assert!(goal_pos < task_pos);
    }

    #[test]
    fn empty_goal_adds_no_section() {
        let prompt = SystemPromptBuilder::new()
            .with_base("base")
            .with_goal("")
            .build();
        assert!(!prompt.contains("# Goal"));
    }

    #[test]
    fn tools_section_lists_names() {
        let defs = vec![ToolDefinition {
            name: "read_file".into(),
            description: "Read a file".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let prompt = SystemPromptBuilder::new().with_tools(&defs).build();
        assert!(prompt.contains("**read_file**"));
        assert!(prompt.contains("heredoc"));
    }

    #[test]
    fn no_tools_no_section() {
        let prompt = SystemPromptBuilder::new().with_base("x").with_tools(&[]).build();
        assert!(!prompt.contains("Available Tools"));
    }
}
