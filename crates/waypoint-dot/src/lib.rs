//! DOT parser for the strict Graphviz subset used by Waypoint pipelines.
//!
//! Parses `digraph Name { ... }` with nodes, edges, subgraphs, and typed
//! attributes into a flat [`DotGraph`]: subgraphs introduce no id scope, so
//! their nodes and edges land in the top-level graph with the subgraph's
//! `node [...]` defaults applied.
//!
//! # Example
//! ```
//! let dot = r#"digraph Pipeline { start -> process -> done }"#;
//! let graph = waypoint_dot::parse(dot).unwrap();
//! assert_eq!(graph.name, "Pipeline");
//! assert_eq!(graph.edges.len(), 2);
//! ```

pub mod ast;
pub mod duration_serde;
mod parser;

pub use ast::*;
pub use parser::parse;
