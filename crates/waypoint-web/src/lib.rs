//! Read-only dashboard over a pipeline run's on-disk state.
//!
//! Serves whatever exists under the run directory: checkpoint, per-node
//! status files, artifacts, the final result, and the currently pending
//! gate. The one write path is the gate-answer endpoint, which drops an
//! `answer.json` the engine's file interviewer consumes. Every read
//! tolerates missing or partially written files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use waypoint_pipeline::{Answer, GateQuestion, PENDING_FILE};

/// Paths the dashboard reads from.
#[derive(Clone)]
pub struct DashboardState {
    pub logs_root: PathBuf,
    pub gates_root: PathBuf,
}

impl DashboardState {
    /// Conventional layout under one working directory: `logs/` + `gates/`.
    pub fn for_working_dir(working_dir: impl Into<PathBuf>) -> Self {
        let dir = working_dir.into();
        Self {
            logs_root: dir.join("logs"),
            gates_root: dir.join("gates"),
        }
    }
}

/// Build the dashboard router.
pub fn router(state: DashboardState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/state", get(api_state))
        .route("/api/logs/:node", get(api_node_artifacts))
        .route("/api/logs/:node/:file", get(api_artifact_content))
        .route("/api/gate", get(api_gate))
        .route("/api/gate/answer", post(api_gate_answer))
        .with_state(Arc::new(state))
}

/// Serve the dashboard until the process exits.
pub async fn serve(state: DashboardState, port: u16) -> waypoint_types::Result<()> {
    let app = router(state);
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Dashboard listening");
    axum::serve(listener, app)
        .await
        .map_err(waypoint_types::WaypointError::Io)
}

// ---------------------------------------------------------------------------
// State reading (plain functions so they test without a server)
// ---------------------------------------------------------------------------

/// Parse a JSON file, `None` when missing or malformed.
async fn read_json_file(path: &Path) -> Option<Value> {
    let text = tokio::fs::read_to_string(path).await.ok()?;
    serde_json::from_str(&text).ok()
}

/// Aggregate view over the run directory.
pub async fn run_state(state: &DashboardState) -> Value {
    let checkpoint = read_json_file(&state.logs_root.join("checkpoint.json")).await;
    let result = read_json_file(&state.logs_root.join("result.json")).await;

    let mut nodes = Vec::new();
    if let Ok(mut entries) = tokio::fs::read_dir(&state.logs_root).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            if let Some(status) = read_json_file(&entry.path().join("status.json")).await {
                nodes.push(status);
            }
        }
    }
    nodes.sort_by(|a, b| {
        a.get("node_id")
            .and_then(Value::as_str)
            .unwrap_or("")
            .cmp(b.get("node_id").and_then(Value::as_str).unwrap_or(""))
    });

    json!({
        "checkpoint": checkpoint,
        "result": result,
        "nodes": nodes,
    })
}

/// Artifact file names for one node.
pub async fn node_artifacts(state: &DashboardState, node: &str) -> Vec<String> {
    let mut files = Vec::new();
    if let Ok(mut entries) = tokio::fs::read_dir(state.logs_root.join(node)).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            if let Some(name) = entry.file_name().to_str() {
                files.push(name.to_string());
            }
        }
    }
    files.sort();
    files
}

/// The currently pending gate question, if any.
pub async fn pending_gate(state: &DashboardState) -> Option<GateQuestion> {
    let gate_id = tokio::fs::read_to_string(state.gates_root.join(PENDING_FILE))
        .await
        .ok()?;
    let question_path = state
        .gates_root
        .join(gate_id.trim())
        .join("question.json");
    let json = tokio::fs::read_to_string(question_path).await.ok()?;
    serde_json::from_str(&json).ok()
}

/// Write an answer for the pending gate. Returns the gate id.
pub async fn answer_pending_gate(
    state: &DashboardState,
    answer: &Answer,
) -> waypoint_types::Result<String> {
    let gate_id = tokio::fs::read_to_string(state.gates_root.join(PENDING_FILE))
        .await
        .map_err(|_| waypoint_types::WaypointError::Other("No pending gate".into()))?;
    let gate_id = gate_id.trim().to_string();
    let path = state.gates_root.join(&gate_id).join("answer.json");
    tokio::fs::write(&path, serde_json::to_string_pretty(answer)?).await?;
    Ok(gate_id)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn index(State(state): State<Arc<DashboardState>>) -> Html<String> {
    let run = run_state(&state).await;
    let mut rows = String::new();
    if let Some(nodes) = run.get("nodes").and_then(Value::as_array) {
        for node in nodes {
            rows.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                node.get("node_id").and_then(Value::as_str).unwrap_or("?"),
                node.get("status").and_then(Value::as_str).unwrap_or("?"),
                node.get("notes").and_then(Value::as_str).unwrap_or(""),
            ));
        }
    }
    let result_line = match run.get("result") {
        Some(Value::Object(r)) => format!(
            "Run finished: {}",
            r.get("status").and_then(Value::as_str).unwrap_or("?")
        ),
        _ => "Run in progress (or not started)".to_string(),
    };
    let gate_line = match pending_gate(&state).await {
        Some(q) => format!("Pending gate <b>{}</b>: {}", q.gate_id, q.text),
        None => "No pending gate".to_string(),
    };

    Html(format!(
        "<!doctype html><html><head><title>Waypoint</title></head><body>\
         <h1>Waypoint run</h1><p>{result_line}</p><p>{gate_line}</p>\
         <table border=\"1\"><tr><th>node</th><th>status</th><th>notes</th></tr>\n{rows}</table>\
         </body></html>"
    ))
}

async fn api_state(State(state): State<Arc<DashboardState>>) -> Json<Value> {
    Json(run_state(&state).await)
}

async fn api_node_artifacts(
    State(state): State<Arc<DashboardState>>,
    UrlPath(node): UrlPath<String>,
) -> Json<Value> {
    Json(json!({ "node": node, "artifacts": node_artifacts(&state, &node).await }))
}

async fn api_artifact_content(
    State(state): State<Arc<DashboardState>>,
    UrlPath((node, file)): UrlPath<(String, String)>,
) -> Result<String, StatusCode> {
    // Path components only; no traversal out of the run directory
    if node.contains(['/', '\\']) || file.contains(['/', '\\']) || node == ".." || file == ".." {
        return Err(StatusCode::BAD_REQUEST);
    }
    tokio::fs::read_to_string(state.logs_root.join(&node).join(&file))
        .await
        .map_err(|_| StatusCode::NOT_FOUND)
}

async fn api_gate(State(state): State<Arc<DashboardState>>) -> Json<Value> {
    match pending_gate(&state).await {
        Some(question) => Json(json!({ "pending": question })),
        None => Json(json!({ "pending": null })),
    }
}

#[derive(Debug, Deserialize)]
struct AnswerBody {
    text: String,
    #[serde(default)]
    selected_options: Vec<String>,
}

async fn api_gate_answer(
    State(state): State<Arc<DashboardState>>,
    Json(body): Json<AnswerBody>,
) -> Result<Json<Value>, StatusCode> {
    let answer = Answer {
        text: body.text,
        selected_options: body.selected_options,
    };
    match answer_pending_gate(&state, &answer).await {
        Ok(gate_id) => Ok(Json(json!({ "answered": gate_id }))),
        Err(_) => Err(StatusCode::NOT_FOUND),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
