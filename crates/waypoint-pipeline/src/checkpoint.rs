//! Checkpoint save/restore for crash recovery.
//!
//! After each node completes the engine persists a [`PipelineCheckpoint`]
//! to `<logs_root>/checkpoint.json`. On restart, [`load_checkpoint`]
//! restores progress so the pipeline resumes from the recorded node.
//! Writes go through a temp file plus rename so readers never observe a
//! half-written checkpoint.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Snapshot of pipeline execution state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineCheckpoint {
    /// The node execution resumes from.
    pub current_node_id: String,
    /// Completed node ids in execution order. Duplicates are meaningful:
    /// a repeated id records a loop iteration.
    pub completed_nodes: Vec<String>,
    /// Snapshot of the pipeline context.
    pub context: HashMap<String, String>,
    /// Retry attempts consumed per node.
    pub retry_counts: HashMap<String, u32>,
    /// RFC 3339 timestamp of when the checkpoint was created.
    pub timestamp: String,
}

impl PipelineCheckpoint {
    pub fn new(
        current_node_id: String,
        completed_nodes: Vec<String>,
        context: HashMap<String, String>,
        retry_counts: HashMap<String, u32>,
    ) -> Self {
        Self {
            current_node_id,
            completed_nodes,
            context,
            retry_counts,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Save a checkpoint to `<logs_root>/checkpoint.json` atomically.
pub async fn save_checkpoint(
    checkpoint: &PipelineCheckpoint,
    logs_root: &Path,
) -> waypoint_types::Result<PathBuf> {
    tokio::fs::create_dir_all(logs_root).await?;
    let path = logs_root.join("checkpoint.json");
    let tmp = logs_root.join("checkpoint.json.tmp");
    let json = serde_json::to_string_pretty(checkpoint)?;
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, &path).await?;
    tracing::debug!(path = %path.display(), "Checkpoint saved");
    Ok(path)
}

/// Load the checkpoint from a directory, `Ok(None)` when absent.
pub async fn load_checkpoint(
    logs_root: &Path,
) -> waypoint_types::Result<Option<PipelineCheckpoint>> {
    let path = logs_root.join("checkpoint.json");
    if !tokio::fs::try_exists(&path).await? {
        return Ok(None);
    }
    let json = tokio::fs::read_to_string(&path).await?;
    let checkpoint: PipelineCheckpoint = serde_json::from_str(&json)?;
    Ok(Some(checkpoint))
}

/// Delete the checkpoint (e.g. to restart a run from scratch).
pub async fn clear_checkpoint(logs_root: &Path) -> waypoint_types::Result<()> {
    let path = logs_root.join("checkpoint.json");
    if tokio::fs::try_exists(&path).await? {
        tokio::fs::remove_file(&path).await?;
    }
    Ok(())
}
