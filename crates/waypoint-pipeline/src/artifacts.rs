//! On-disk run artifacts: per-node `status.json` and the final `result.json`.
//!
//! Writers are best-effort from the engine's point of view (a failed status
//! write never aborts a run); readers tolerate missing or partial files,
//! which is what the dashboard and CLI rely on.

use std::path::Path;

use serde::{Deserialize, Serialize};

use waypoint_types::{Outcome, StageStatus};

/// Contents of `<logs_root>/<node_id>/status.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatus {
    pub node_id: String,
    pub status: StageStatus,
    pub preferred_label: Option<String>,
    pub notes: String,
}

/// Contents of `<logs_root>/result.json`, written on exit-node termination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub status: StageStatus,
    pub completed_nodes: Vec<String>,
    /// RFC 3339 completion timestamp.
    pub finished: String,
}

/// Write `<logs_root>/<node_id>/status.json`.
pub async fn write_status(
    logs_root: &Path,
    node_id: &str,
    outcome: &Outcome,
) -> waypoint_types::Result<()> {
    let dir = logs_root.join(node_id);
    tokio::fs::create_dir_all(&dir).await?;
    let status = NodeStatus {
        node_id: node_id.to_string(),
        status: outcome.status,
        preferred_label: outcome.preferred_label.clone(),
        notes: outcome.notes.clone(),
    };
    let json = serde_json::to_string_pretty(&status)?;
    tokio::fs::write(dir.join("status.json"), json).await?;
    Ok(())
}

/// Read a node's status file; `None` on missing or unparsable content.
pub async fn read_status(logs_root: &Path, node_id: &str) -> Option<NodeStatus> {
    let path = logs_root.join(node_id).join("status.json");
    let json = tokio::fs::read_to_string(&path).await.ok()?;
    serde_json::from_str(&json).ok()
}

/// Write `<logs_root>/result.json`.
pub async fn write_result(
    logs_root: &Path,
    status: StageStatus,
    completed_nodes: &[String],
) -> waypoint_types::Result<()> {
    tokio::fs::create_dir_all(logs_root).await?;
    let result = RunResult {
        status,
        completed_nodes: completed_nodes.to_vec(),
        finished: chrono::Utc::now().to_rfc3339(),
    };
    let json = serde_json::to_string_pretty(&result)?;
    tokio::fs::write(logs_root.join("result.json"), json).await?;
    Ok(())
}

/// Read the run result; `None` on missing or unparsable content.
pub async fn read_result(logs_root: &Path) -> Option<RunResult> {
    let json = tokio::fs::read_to_string(logs_root.join("result.json"))
        .await
        .ok()?;
    serde_json::from_str(&json).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_types::Outcome;

    #[tokio::test]
    async fn status_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut outcome = Outcome::success("all good");
        outcome.preferred_label = Some("approve".into());

        write_status(dir.path(), "plan", &outcome).await.unwrap();
        let status = read_status(dir.path(), "plan").await.unwrap();
        assert_eq!(status.node_id, "plan");
        assert_eq!(status.status, StageStatus::Success);
        assert_eq!(status.preferred_label.as_deref(), Some("approve"));
        assert_eq!(status.notes, "all good");
    }

    #[tokio::test]
    async fn missing_status_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_status(dir.path(), "ghost").await.is_none());
    }

    #[tokio::test]
    async fn partial_status_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        let node_dir = dir.path().join("broken");
        tokio::fs::create_dir_all(&node_dir).await.unwrap();
        tokio::fs::write(node_dir.join("status.json"), "{\"node_id\": \"bro")
            .await
            .unwrap();
        assert!(read_status(dir.path(), "broken").await.is_none());
    }

    #[tokio::test]
    async fn result_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let completed = vec!["start".to_string(), "work".to_string(), "done".to_string()];
        write_result(dir.path(), StageStatus::Success, &completed)
            .await
            .unwrap();

        let result = read_result(dir.path()).await.unwrap();
        assert_eq!(result.status, StageStatus::Success);
        assert_eq!(result.completed_nodes, completed);
        // Timestamp parses back as RFC 3339
        assert!(chrono::DateTime::parse_from_rfc3339(&result.finished).is_ok());
    }
}
