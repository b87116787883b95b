//! Tool trait, built-in tools, and execution environment for Waypoint agents.
//!
//! Provides the `Tool` trait and `ToolRegistry`, the `ExecutionEnvironment`
//! abstraction with a local-filesystem implementation, the built-in tool set
//! (read_file, write_file, edit_file, shell, grep, glob, apply_patch),
//! provider tool profiles, and the output truncation policy.

pub mod builtin;
pub mod environment;
pub mod local_env;
pub mod profiles;
pub mod tool;
pub mod truncation;

pub use builtin::{
    ApplyPatchTool, EditFileTool, GlobTool, GrepTool, ReadFileTool, ShellTool, WriteFileTool,
};
pub use environment::{DirEntry, ExecResult, ExecutionEnvironment, GrepOptions};
pub use local_env::LocalExecutionEnvironment;
pub use profiles::{ShellLimits, ToolProfile};
pub use tool::{Tool, ToolDefinition, ToolRegistry};
