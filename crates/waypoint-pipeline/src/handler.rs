//! Node handler trait, execution scope, and handler registry.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use waypoint_types::{Context, Outcome, Result};

use crate::graph::{PipelineGraph, PipelineNode};

// ---------------------------------------------------------------------------
// HandlerScope
// ---------------------------------------------------------------------------

/// Everything a handler sees besides the node and the context: the graph,
/// the artifact root, the run's cancellation token, and the registry (the
/// parallel handler dispatches child handlers through it).
pub struct HandlerScope<'a> {
    pub graph: &'a PipelineGraph,
    pub logs_root: &'a Path,
    pub cancel: &'a CancellationToken,
    pub registry: &'a HandlerRegistry,
}

impl<'a> HandlerScope<'a> {
    /// Directory for this node's artifacts, created on demand.
    pub async fn node_dir(&self, node_id: &str) -> Result<std::path::PathBuf> {
        let dir = self.logs_root.join(node_id);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }
}

// ---------------------------------------------------------------------------
// NodeHandler trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// The handler type identifier (e.g. "start", "exit", "codergen").
    fn handler_type(&self) -> &str;

    /// Execute this handler for a given node.
    async fn execute(
        &self,
        node: &PipelineNode,
        context: &Context,
        scope: &HandlerScope<'_>,
    ) -> Result<Outcome>;
}

// ---------------------------------------------------------------------------
// HandlerRegistry
// ---------------------------------------------------------------------------

pub struct HandlerRegistry {
    handlers: HashMap<String, Box<dyn NodeHandler>>,
    shape_to_type: HashMap<String, String>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        let mut shape_to_type = HashMap::new();
        shape_to_type.insert("Mdiamond".into(), "start".into());
        shape_to_type.insert("Msquare".into(), "exit".into());
        shape_to_type.insert("box".into(), "codergen".into());
        shape_to_type.insert("hexagon".into(), "human.gate".into());
        shape_to_type.insert("diamond".into(), "conditional".into());
        shape_to_type.insert("component".into(), "parallel".into());
        shape_to_type.insert("tripleoctagon".into(), "parallel.fan_in".into());
        shape_to_type.insert("parallelogram".into(), "tool.shell".into());

        Self {
            handlers: HashMap::new(),
            shape_to_type,
        }
    }

    pub fn register(&mut self, handler: impl NodeHandler + 'static) {
        let t = handler.handler_type().to_string();
        self.handlers.insert(t, Box::new(handler));
    }

    /// Map a custom shape to a handler type for caller-registered handlers.
    pub fn map_shape(&mut self, shape: impl Into<String>, handler_type: impl Into<String>) {
        self.shape_to_type.insert(shape.into(), handler_type.into());
    }

    /// Resolve a node to its handler type using 3-step priority:
    /// 1. Explicit `type` attribute on the node
    /// 2. Shape-based mapping
    /// 3. Default: `"codergen"`
    ///
    /// Special case: conditional nodes with a prompt route to `"codergen"`
    /// so the prompt actually runs against the LLM. The conditional handler
    /// is a pass-through for pure routing nodes with no prompt.
    pub fn resolve_type(&self, node: &PipelineNode) -> String {
        let resolved = if let Some(ref t) = node.node_type {
            t.clone()
        } else if let Some(t) = self.shape_to_type.get(&node.shape) {
            t.clone()
        } else {
            "codergen".to_string()
        };

        if resolved == "conditional" && node.prompt.is_some() {
            return "codergen".to_string();
        }
        resolved
    }

    pub fn get(&self, handler_type: &str) -> Option<&dyn NodeHandler> {
        self.handlers.get(handler_type).map(|h| h.as_ref())
    }

    pub fn has(&self, handler_type: &str) -> bool {
        self.handlers.contains_key(handler_type)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Trivial built-in handlers
// ---------------------------------------------------------------------------

pub struct StartHandler;

#[async_trait]
impl NodeHandler for StartHandler {
    fn handler_type(&self) -> &str {
        "start"
    }

    async fn execute(
        &self,
        _node: &PipelineNode,
        _ctx: &Context,
        _scope: &HandlerScope<'_>,
    ) -> Result<Outcome> {
        Ok(Outcome::success("Pipeline started"))
    }
}

pub struct ExitHandler;

#[async_trait]
impl NodeHandler for ExitHandler {
    fn handler_type(&self) -> &str {
        "exit"
    }

    async fn execute(
        &self,
        _node: &PipelineNode,
        _ctx: &Context,
        _scope: &HandlerScope<'_>,
    ) -> Result<Outcome> {
        Ok(Outcome::success("Pipeline completed"))
    }
}

pub struct ConditionalHandler;

#[async_trait]
impl NodeHandler for ConditionalHandler {
    fn handler_type(&self) -> &str {
        "conditional"
    }

    async fn execute(
        &self,
        _node: &PipelineNode,
        _ctx: &Context,
        _scope: &HandlerScope<'_>,
    ) -> Result<Outcome> {
        Ok(Outcome::success("Conditional pass-through"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
