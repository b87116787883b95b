//! Shared types, errors, context, and outcome for the Waypoint pipeline engine.
//!
//! This crate provides the foundational types used across all other Waypoint crates:
//! - `WaypointError` — unified error taxonomy
//! - `Context` — thread-safe key-value store for pipeline state
//! - `Outcome` — result of executing a node handler

use serde::{Deserialize, Serialize};

/// Unified error type for all Waypoint subsystems.
#[derive(Debug, thiserror::Error)]
pub enum WaypointError {
    // === LLM Provider Errors ===
    #[error("Provider {provider} returned HTTP {status}: {message}")]
    ProviderError {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Rate limited by {provider}")]
    RateLimited {
        provider: String,
        retry_after_ms: Option<u64>,
    },

    #[error("Authentication failed for provider {provider}")]
    AuthError { provider: String },

    #[error("Model or resource not found on {provider}: {message}")]
    NotFound { provider: String, message: String },

    #[error("Content filtered by {provider}: {message}")]
    ContentFilter { provider: String, message: String },

    #[error("Request to {provider} timed out after {timeout_ms}ms")]
    RequestTimeout { provider: String, timeout_ms: u64 },

    // === Parser Errors ===
    #[error("DOT parse error at line {line}, col {col}: {message}")]
    ParseError {
        line: usize,
        col: usize,
        message: String,
        source_snippet: Option<String>,
    },

    // === Pipeline Errors ===
    #[error("Missing configuration: {0}")]
    ConfigError(String),

    #[error("Pipeline validation failed: {0}")]
    ValidationError(String),

    #[error("Handler '{handler}' failed on node '{node}': {message}")]
    HandlerError {
        handler: String,
        node: String,
        message: String,
    },

    #[error("Node '{node}' timed out after {timeout_ms}ms")]
    NodeTimeout { node: String, timeout_ms: u64 },

    #[error("Max retries exhausted for node '{node}' after {attempts} attempts")]
    RetriesExhausted { node: String, attempts: usize },

    #[error("Operation cancelled")]
    Cancelled,

    // === Tool Errors ===
    #[error("Tool '{tool}' error: {message}")]
    ToolError { tool: String, message: String },

    #[error("Command timed out after {timeout_ms}ms")]
    CommandTimeout { timeout_ms: u64 },

    // === Agent Errors ===
    #[error("Session is {state}, cannot accept input")]
    SessionBusy { state: String },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl WaypointError {
    /// Returns `true` if the error is transient and the operation may succeed on retry.
    ///
    /// Provider HTTP errors are retryable iff the status is 5xx or 529.
    pub fn is_retryable(&self) -> bool {
        match self {
            WaypointError::RateLimited { .. }
            | WaypointError::CommandTimeout { .. }
            | WaypointError::NodeTimeout { .. }
            | WaypointError::RequestTimeout { .. } => true,
            WaypointError::ProviderError { status, .. } => *status >= 500 || *status == 529,
            _ => false,
        }
    }

    /// Returns `true` if the error is permanent and retrying will not help.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WaypointError::AuthError { .. }
                | WaypointError::NotFound { .. }
                | WaypointError::ContentFilter { .. }
                | WaypointError::ConfigError(_)
                | WaypointError::ValidationError(_)
        )
    }
}

/// A convenience alias for `Result<T, WaypointError>`.
pub type Result<T> = std::result::Result<T, WaypointError>;

// ---------------------------------------------------------------------------
// Context — thread-safe key-value store for pipeline state
// ---------------------------------------------------------------------------

use std::collections::HashMap;
use std::sync::Arc;

/// Thread-safe key→string store shared across pipeline nodes.
///
/// Reads are total: a missing key reads as the empty string. Cloning a
/// `Context` yields another handle to the **same** inner state; use
/// [`clone_isolated`](Context::clone_isolated) to get a deep copy for
/// parallel branch isolation.
#[derive(Clone)]
pub struct Context {
    inner: Arc<tokio::sync::RwLock<HashMap<String, String>>>,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(tokio::sync::RwLock::new(HashMap::new())),
        }
    }

    /// Create a context pre-populated from a snapshot map.
    pub fn from_map(values: HashMap<String, String>) -> Self {
        Self {
            inner: Arc::new(tokio::sync::RwLock::new(values)),
        }
    }

    /// Insert or overwrite a key.
    pub async fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.write().await.insert(key.into(), value.into());
    }

    /// Read a value by key. Missing keys read as `""`.
    pub async fn get(&self, key: &str) -> String {
        self.inner.read().await.get(key).cloned().unwrap_or_default()
    }

    /// Shallow copy of the current values map.
    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.inner.read().await.clone()
    }

    /// Deep copy that is fully independent of the original context.
    pub async fn clone_isolated(&self) -> Context {
        Context::from_map(self.snapshot().await)
    }

    /// Merge `updates` into the context. Existing keys not present in
    /// `updates` are preserved.
    pub async fn apply_updates(&self, updates: HashMap<String, String>) {
        self.inner.write().await.extend(updates);
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// StageStatus — outcome status of a pipeline node
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    PartialSuccess,
    Retry,
    Fail,
}

impl StageStatus {
    /// The lowercase name used in edge conditions and on-disk artifacts.
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Success => "success",
            StageStatus::PartialSuccess => "partial_success",
            StageStatus::Retry => "retry",
            StageStatus::Fail => "fail",
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome — result of executing a node handler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub status: StageStatus,
    pub preferred_label: Option<String>,
    pub suggested_next_ids: Vec<String>,
    pub context_updates: HashMap<String, String>,
    pub notes: String,
    pub failure_reason: Option<String>,
}

impl Outcome {
    /// Create a successful outcome with the given notes.
    pub fn success(notes: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Success,
            preferred_label: None,
            suggested_next_ids: Vec::new(),
            context_updates: HashMap::new(),
            notes: notes.into(),
            failure_reason: None,
        }
    }

    /// Create a retry outcome with the given notes.
    pub fn retry(notes: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Retry,
            preferred_label: None,
            suggested_next_ids: Vec::new(),
            context_updates: HashMap::new(),
            notes: notes.into(),
            failure_reason: None,
        }
    }

    /// Create a failed outcome with the given reason.
    pub fn fail(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            status: StageStatus::Fail,
            preferred_label: None,
            suggested_next_ids: Vec::new(),
            context_updates: HashMap::new(),
            notes: String::new(),
            failure_reason: Some(reason),
        }
    }

    /// Create an outcome with a specific status and preferred label.
    pub fn with_label(status: StageStatus, label: impl Into<String>) -> Self {
        Self {
            status,
            preferred_label: Some(label.into()),
            suggested_next_ids: Vec::new(),
            context_updates: HashMap::new(),
            notes: String::new(),
            failure_reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_provider_error() {
        let err = WaypointError::ProviderError {
            provider: "openai".into(),
            status: 500,
            message: "internal server error".into(),
        };
        assert_eq!(
            err.to_string(),
            "Provider openai returned HTTP 500: internal server error"
        );
    }

    #[test]
    fn error_display_auth_error() {
        let err = WaypointError::AuthError {
            provider: "openai".into(),
        };
        assert_eq!(err.to_string(), "Authentication failed for provider openai");
    }

    #[test]
    fn error_display_parse_error() {
        let err = WaypointError::ParseError {
            line: 10,
            col: 5,
            message: "unexpected token".into(),
            source_snippet: Some("digraph {".into()),
        };
        assert_eq!(
            err.to_string(),
            "DOT parse error at line 10, col 5: unexpected token"
        );
    }

    #[test]
    fn error_display_validation() {
        let err = WaypointError::ValidationError("no start node".into());
        assert_eq!(err.to_string(), "Pipeline validation failed: no start node");
    }

    #[test]
    fn error_display_handler_error() {
        let err = WaypointError::HandlerError {
            handler: "codergen".into(),
            node: "summarize".into(),
            message: "prompt too long".into(),
        };
        assert_eq!(
            err.to_string(),
            "Handler 'codergen' failed on node 'summarize': prompt too long"
        );
    }

    // --- is_retryable ---

    #[test]
    fn retryable_rate_limited() {
        let err = WaypointError::RateLimited {
            provider: "x".into(),
            retry_after_ms: Some(1000),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn retryable_provider_5xx() {
        let err = WaypointError::ProviderError {
            provider: "x".into(),
            status: 503,
            message: "unavailable".into(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn retryable_provider_529() {
        let err = WaypointError::ProviderError {
            provider: "x".into(),
            status: 529,
            message: "overloaded".into(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn not_retryable_provider_4xx() {
        let err = WaypointError::ProviderError {
            provider: "x".into(),
            status: 400,
            message: "bad request".into(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn retryable_timeouts() {
        assert!(WaypointError::CommandTimeout { timeout_ms: 5000 }.is_retryable());
        assert!(WaypointError::NodeTimeout {
            node: "n".into(),
            timeout_ms: 5000
        }
        .is_retryable());
    }

    #[test]
    fn not_retryable_auth_error() {
        let err = WaypointError::AuthError {
            provider: "x".into(),
        };
        assert!(!err.is_retryable());
    }

    // --- is_terminal ---

    #[test]
    fn terminal_classification() {
        assert!(WaypointError::AuthError {
            provider: "x".into()
        }
        .is_terminal());
        assert!(WaypointError::NotFound {
            provider: "x".into(),
            message: "no such model".into()
        }
        .is_terminal());
        assert!(WaypointError::ContentFilter {
            provider: "x".into(),
            message: "blocked".into()
        }
        .is_terminal());
        assert!(WaypointError::ConfigError("missing key".into()).is_terminal());
        assert!(WaypointError::ValidationError("bad".into()).is_terminal());
        assert!(!WaypointError::RateLimited {
            provider: "x".into(),
            retry_after_ms: None
        }
        .is_terminal());
    }

    // --- From impls ---

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: WaypointError = io_err.into();
        assert!(matches!(err, WaypointError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: WaypointError = json_err.into();
        assert!(matches!(err, WaypointError::Json(_)));
    }

    // --- Context ---

    #[tokio::test]
    async fn context_set_and_get_round_trip() {
        let ctx = Context::new();
        ctx.set("key", "hello").await;
        assert_eq!(ctx.get("key").await, "hello");
    }

    #[tokio::test]
    async fn context_missing_key_reads_empty() {
        let ctx = Context::new();
        assert_eq!(ctx.get("missing").await, "");
    }

    #[tokio::test]
    async fn context_clone_isolated_is_independent() {
        let ctx = Context::new();
        ctx.set("a", "1").await;

        let isolated = ctx.clone_isolated().await;
        isolated.set("a", "999").await;
        isolated.set("b", "2").await;

        // Original is unaffected
        assert_eq!(ctx.get("a").await, "1");
        assert_eq!(ctx.get("b").await, "");
    }

    #[tokio::test]
    async fn context_apply_updates_merges() {
        let ctx = Context::new();
        ctx.set("keep", "old").await;
        ctx.set("overwrite", "old").await;

        let mut updates = HashMap::new();
        updates.insert("overwrite".into(), "new".into());
        updates.insert("added".into(), "fresh".into());
        ctx.apply_updates(updates).await;

        assert_eq!(ctx.get("keep").await, "old");
        assert_eq!(ctx.get("overwrite").await, "new");
        assert_eq!(ctx.get("added").await, "fresh");
    }

    #[tokio::test]
    async fn context_snapshot_returns_current_values() {
        let ctx = Context::new();
        ctx.set("x", "10").await;
        ctx.set("y", "20").await;

        let snap = ctx.snapshot().await;
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.get("x").map(String::as_str), Some("10"));
        assert_eq!(snap.get("y").map(String::as_str), Some("20"));
    }

    // --- StageStatus ---

    #[test]
    fn stage_status_serializes_to_snake_case() {
        assert_eq!(
            serde_json::to_string(&StageStatus::Success).unwrap(),
            "\"success\""
        );
        assert_eq!(
            serde_json::to_string(&StageStatus::PartialSuccess).unwrap(),
            "\"partial_success\""
        );
        assert_eq!(
            serde_json::to_string(&StageStatus::Retry).unwrap(),
            "\"retry\""
        );
        assert_eq!(serde_json::to_string(&StageStatus::Fail).unwrap(), "\"fail\"");
    }

    #[test]
    fn stage_status_as_str_matches_serde() {
        for status in [
            StageStatus::Success,
            StageStatus::PartialSuccess,
            StageStatus::Retry,
            StageStatus::Fail,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    // --- Outcome ---

    #[test]
    fn outcome_success_constructor() {
        let o = Outcome::success("all good");
        assert_eq!(o.status, StageStatus::Success);
        assert_eq!(o.notes, "all good");
        assert!(o.preferred_label.is_none());
        assert!(o.failure_reason.is_none());
        assert!(o.suggested_next_ids.is_empty());
        assert!(o.context_updates.is_empty());
    }

    #[test]
    fn outcome_retry_constructor() {
        let o = Outcome::retry("try again");
        assert_eq!(o.status, StageStatus::Retry);
        assert_eq!(o.notes, "try again");
    }

    #[test]
    fn outcome_fail_constructor() {
        let o = Outcome::fail("something broke");
        assert_eq!(o.status, StageStatus::Fail);
        assert_eq!(o.failure_reason, Some("something broke".to_string()));
        assert!(o.notes.is_empty());
    }

    #[test]
    fn outcome_with_label_constructor() {
        let o = Outcome::with_label(StageStatus::Success, "approve");
        assert_eq!(o.status, StageStatus::Success);
        assert_eq!(o.preferred_label, Some("approve".to_string()));
    }

}
