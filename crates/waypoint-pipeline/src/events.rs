//! Pipeline event system for observability.
//!
//! The engine emits [`PipelineEvent`]s via a `tokio::sync::broadcast`
//! channel so external observers (loggers, the dashboard, tests) can follow
//! execution without coupling to engine internals.

use serde::{Deserialize, Serialize};

/// Events emitted during pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    PipelineStarted {
        pipeline_name: String,
        node_count: usize,
    },
    PipelineCompleted {
        pipeline_name: String,
        completed_nodes: Vec<String>,
        duration_ms: u64,
    },
    PipelineFailed {
        pipeline_name: String,
        error: String,
    },
    StageStarted {
        node_id: String,
        handler_type: String,
    },
    StageCompleted {
        node_id: String,
        status: String,
        duration_ms: u64,
    },
    StageRetrying {
        node_id: String,
        attempt: u32,
    },
    EdgeSelected {
        from_node: String,
        to_node: String,
        edge_label: Option<String>,
    },
    GoalGateChecked {
        node_id: String,
        satisfied: bool,
    },
    CheckpointSaved {
        node_id: String,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<PipelineEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
