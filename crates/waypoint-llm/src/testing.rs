//! Deterministic provider doubles for tests and dry runs.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{
    FinishReason, ProviderAdapter, Request, Response, StreamEvent, ToolCall, Usage,
};
use waypoint_types::WaypointError;

/// Build a plain-text response with sensible defaults.
pub fn text_response(text: impl Into<String>) -> Response {
    Response {
        id: format!("scripted-{}", uuid::Uuid::new_v4()),
        model: "scripted-model".into(),
        provider: "scripted".into(),
        text: text.into(),
        tool_calls: Vec::new(),
        reasoning: None,
        usage: Usage::default(),
        finish_reason: FinishReason::Stop,
    }
}

/// Build a response that requests a single tool call.
pub fn tool_call_response(id: &str, name: &str, arguments: &str) -> Response {
    Response {
        id: format!("scripted-{}", uuid::Uuid::new_v4()),
        model: "scripted-model".into(),
        provider: "scripted".into(),
        text: String::new(),
        tool_calls: vec![ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }],
        reasoning: None,
        usage: Usage::default(),
        finish_reason: FinishReason::ToolCalls,
    }
}

/// Plays back a fixed sequence of completions (or errors), one per call.
///
/// When the script runs out the last configured fallback text repeats, so a
/// session that makes one extra call does not panic the test.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<Response, WaypointError>>>,
    fallback_text: String,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<Response>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().map(Ok).collect()),
            fallback_text: "No more scripted responses".into(),
        }
    }

    /// A provider that answers every call with the same text.
    pub fn always_text(text: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback_text: text.into(),
        }
    }

    /// Script a mix of successes and provider errors, in call order.
    pub fn from_results(results: Vec<Result<Response, WaypointError>>) -> Self {
        Self {
            script: Mutex::new(results.into_iter().collect()),
            fallback_text: "No more scripted responses".into(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    async fn complete(&self, _request: &Request) -> Result<Response, WaypointError> {
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => Ok(text_response(self.fallback_text.clone())),
        }
    }

    fn stream(&self, _request: &Request) -> Pin<Box<dyn Stream<Item = StreamEvent> + Send + '_>> {
        let next = self.script.lock().unwrap().pop_front();
        let events = match next {
            Some(Ok(resp)) => vec![
                StreamEvent::StreamStart {
                    id: resp.id.clone(),
                    model: resp.model.clone(),
                },
                StreamEvent::TextStart,
                StreamEvent::TextDelta {
                    text: resp.text.clone(),
                },
                StreamEvent::TextEnd,
                StreamEvent::Finish {
                    usage: resp.usage,
                    finish_reason: resp.finish_reason,
                },
            ],
            Some(Err(e)) => vec![StreamEvent::Error(std::sync::Arc::new(e))],
            None => {
                let resp = text_response(self.fallback_text.clone());
                vec![
                    StreamEvent::TextDelta {
                        text: resp.text.clone(),
                    },
                    StreamEvent::Finish {
                        usage: resp.usage,
                        finish_reason: resp.finish_reason,
                    },
                ]
            }
        };
        Box::pin(tokio_stream::iter(events))
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn supports_reasoning(&self) -> bool {
        false
    }

    fn context_window_size(&self) -> usize {
        128_000
    }
}
