//! Pipeline execution engine, node handlers, validation, and edge selection.
//!
//! This crate implements the core Waypoint runner: DOT graph traversal,
//! handler dispatch, deterministic edge selection, goal gate enforcement,
//! retry/backoff, checkpoint/resume, the on-disk artifact layout, and the
//! human-gate file protocol.

pub mod artifacts;
pub mod checkpoint;
pub mod condition;
pub mod edge_selection;
pub mod engine;
pub mod events;
pub mod graph;
pub mod handler;
pub mod handlers;
pub mod interviewer;
pub mod retry;
pub mod stylesheet;
pub mod transforms;
pub mod validation;

pub use artifacts::{read_result, read_status, write_result, write_status, NodeStatus, RunResult};
pub use checkpoint::{clear_checkpoint, load_checkpoint, save_checkpoint, PipelineCheckpoint};
pub use condition::{evaluate_condition, parse_condition, try_parse, Clause, ConditionExpr, Operator};
pub use edge_selection::{normalize_label, select_edge};
pub use engine::{base_registry, default_registry, EngineConfig, PipelineEngine, PipelineResult};
pub use events::{EventEmitter, PipelineEvent};
pub use graph::{is_exit_node, is_start_node, PipelineEdge, PipelineGraph, PipelineNode};
pub use handler::{
    ConditionalHandler, ExitHandler, HandlerRegistry, HandlerScope, NodeHandler, StartHandler,
};
pub use handlers::{
    CodergenConfig, CodergenHandler, FanInHandler, HumanGateHandler, ParallelHandler,
    ToolShellHandler,
};
pub use interviewer::{
    Answer, AutoApproveInterviewer, ConsoleInterviewer, FileBasedInterviewer, GateQuestion,
    Interviewer, Question, QuestionType, RecordingInterviewer, PENDING_FILE,
};
pub use retry::BackoffPolicy;
pub use stylesheet::{apply_stylesheet, parse_stylesheet, Declaration, Rule, Selector, Stylesheet};
pub use transforms::{apply_transforms, expand_variables};
pub use validation::{validate, validate_or_raise, Diagnostic, LintRule, Severity};
