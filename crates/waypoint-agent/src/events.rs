//! Session event bus.
//!
//! Agent sessions emit [`SessionEvent`]s through a `tokio::sync::broadcast`
//! channel so observers (loggers, UIs, the pipeline engine) can follow
//! progress without coupling to the loop internals. Delivery is best-effort
//! in arrival order; events emitted with no subscribers are dropped.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    SessionStart,
    UserInput,
    AssistantTextDelta,
    ToolCallStart,
    ToolCallEnd,
    SessionEnd,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub session_id: String,
    pub data: HashMap<String, String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl SessionEvent {
    pub fn new(kind: SessionEventKind, session_id: impl Into<String>) -> Self {
        Self {
            kind,
            session_id: session_id.into(),
            data: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct SessionEvents {
    sender: tokio::sync::broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    pub fn emit(&self, event: SessionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emitter_sends_and_receives() {
        let events = SessionEvents::new(16);
        let mut rx = events.subscribe();

        events.emit(
            SessionEvent::new(SessionEventKind::ToolCallStart, "sess-1")
                .with("tool", "read_file"),
        );

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, SessionEventKind::ToolCallStart);
        assert_eq!(event.session_id, "sess-1");
        assert_eq!(event.data.get("tool").map(String::as_str), Some("read_file"));
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let events = SessionEvents::new(16);
        let mut rx1 = events.subscribe();
        let mut rx2 = events.subscribe();

        events.emit(SessionEvent::new(SessionEventKind::SessionEnd, "s"));

        assert_eq!(rx1.recv().await.unwrap().kind, SessionEventKind::SessionEnd);
        assert_eq!(rx2.recv().await.unwrap().kind, SessionEventKind::SessionEnd);
    }

    #[test]
    fn emit_with_no_subscribers_does_not_panic() {
        let events = SessionEvents::new(16);
        events.emit(SessionEvent::new(SessionEventKind::Error, "s").with("message", "boom"));
    }

    #[test]
    fn event_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&SessionEventKind::AssistantTextDelta).unwrap(),
            "\"assistant_text_delta\""
        );
        assert_eq!(
            serde_json::to_string(&SessionEventKind::SessionStart).unwrap(),
            "\"session_start\""
        );
    }
}
