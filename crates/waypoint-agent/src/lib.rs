//! Bounded agentic coding loop: LLM + tool execution cycle.
//!
//! [`AgentSession`] turns one user input (typically a codergen node prompt)
//! into a final assistant answer: build request -> call provider -> execute
//! tool calls sequentially -> feed results back -> repeat, under hard turn
//! and tool-round limits with loop detection. Limit and provider failures
//! surface as bracketed sentinel strings in the final answer rather than
//! errors; the pipeline's codergen handler classifies those into retries.

pub mod events;
pub mod loop_detection;
pub mod profile;
pub mod prompt_builder;

pub use events::{SessionEvent, SessionEventKind, SessionEvents};
pub use loop_detection::{detect_loop, loop_guidance, LoopDetector};
pub use profile::SessionProfile;
pub use prompt_builder::SystemPromptBuilder;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use waypoint_llm::{
    ContentPart, LlmClient, Message, ReasoningEffort, Request, Role, ToolCall, Usage,
};
use waypoint_tools::{truncation::truncate_bytes, ExecutionEnvironment};
use waypoint_types::WaypointError;

// ---------------------------------------------------------------------------
// Sentinels
// ---------------------------------------------------------------------------

pub const TURN_LIMIT_SENTINEL: &str = "[Turn limit reached]";
pub const TOOL_ROUND_LIMIT_SENTINEL: &str = "[Tool round limit reached]";

pub fn error_sentinel(message: &str) -> String {
    format!("[Error: {}]", message)
}

/// True when an assistant answer is one of the in-band failure sentinels.
pub fn is_failure_sentinel(text: &str) -> bool {
    text == TURN_LIMIT_SENTINEL || text == TOOL_ROUND_LIMIT_SENTINEL || text.starts_with("[Error:")
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for an agent session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub model: String,
    pub provider: Option<String>,
    pub goal: String,
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Maximum provider calls per input.
    pub max_turns: usize,
    /// Maximum tool-use rounds per input.
    pub max_tool_rounds: usize,
    /// Default timeout for shell commands in milliseconds.
    pub default_command_timeout_ms: u64,
    /// Upper bound any per-call timeout override is clamped to.
    pub max_command_timeout_ms: u64,
    pub enable_loop_detection: bool,
    pub loop_detection_window: usize,
    pub max_subagent_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5-20250929".to_string(),
            provider: None,
            goal: String::new(),
            reasoning_effort: None,
            max_turns: 50,
            max_tool_rounds: 200,
            default_command_timeout_ms: 10_000,
            max_command_timeout_ms: 600_000,
            enable_loop_detection: true,
            loop_detection_window: 10,
            max_subagent_depth: 2,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState / Turn
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Closed,
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Closed => "closed",
        }
    }
}

/// A single entry in the conversation history.
#[derive(Debug, Clone)]
pub enum Turn {
    User {
        content: String,
        timestamp: DateTime<Utc>,
    },
    Assistant {
        content: String,
        tool_calls: Vec<ToolCall>,
        reasoning: Option<String>,
        usage: Usage,
        response_id: String,
        timestamp: DateTime<Utc>,
    },
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        content: String,
        is_error: bool,
        timestamp: DateTime<Utc>,
    },
    /// User-injected guidance surfaced to the model before its next answer.
    Steering {
        content: String,
        timestamp: DateTime<Utc>,
    },
}

// ---------------------------------------------------------------------------
// AgentSession
// ---------------------------------------------------------------------------

/// Session-level fallback cap for tool outputs (tools also self-truncate).
const MAX_TOOL_OUTPUT_BYTES: usize = 30_000;

pub struct AgentSession {
    id: String,
    client: Arc<LlmClient>,
    profile: SessionProfile,
    env: Box<dyn ExecutionEnvironment>,
    config: SessionConfig,
    system_prompt: String,
    history: Vec<Turn>,
    state: SessionState,
    steering_queue: Vec<String>,
    detector: LoopDetector,
    events: SessionEvents,
}

impl AgentSession {
    pub fn new(
        client: Arc<LlmClient>,
        profile: SessionProfile,
        env: Box<dyn ExecutionEnvironment>,
        config: SessionConfig,
    ) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let system_prompt = profile.build_system_prompt(env.as_ref(), &config.goal);
        let detector = LoopDetector::new(config.loop_detection_window);
        let events = SessionEvents::default();
        events.emit(
            SessionEvent::new(SessionEventKind::SessionStart, &id).with("model", &config.model),
        );
        tracing::info!(session_id = %id, model = %config.model, "Agent session created");
        Self {
            id,
            client,
            profile,
            env,
            config,
            system_prompt,
            history: Vec::new(),
            state: SessionState::Idle,
            steering_queue: Vec::new(),
            detector,
            events,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn events(&self) -> &SessionEvents {
        &self.events
    }

    /// Queue guidance the model must see before its next answer.
    pub fn steer(&mut self, message: impl Into<String>) {
        self.steering_queue.push(message.into());
    }

    /// Close the session; further inputs are rejected.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
        self.events
            .emit(SessionEvent::new(SessionEventKind::SessionEnd, &self.id));
    }

    fn drain_steering(&mut self) {
        for msg in self.steering_queue.drain(..) {
            self.history.push(Turn::Steering {
                content: msg,
                timestamp: Utc::now(),
            });
        }
    }

    /// Process one user input through the LLM + tool loop.
    ///
    /// Returns the final assistant text. Limit hits and provider failures
    /// return a sentinel string (see [`is_failure_sentinel`]).
    pub async fn process_input(
        &mut self,
        input: &str,
        cancel: &CancellationToken,
    ) -> waypoint_types::Result<String> {
        if self.state != SessionState::Idle {
            return Err(WaypointError::SessionBusy {
                state: self.state.name().to_string(),
            });
        }
        self.state = SessionState::Running;
        self.detector.reset();

        self.events.emit(
            SessionEvent::new(SessionEventKind::UserInput, &self.id)
                .with("length", input.len().to_string()),
        );

        self.history.push(Turn::User {
            content: input.to_string(),
            timestamp: Utc::now(),
        });
        self.drain_steering();

        let result = self.run_tool_loop(cancel).await;
        self.state = SessionState::Idle;
        result
    }

    async fn run_tool_loop(&mut self, cancel: &CancellationToken) -> waypoint_types::Result<String> {
        let mut turns = 0usize;
        let mut rounds = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(WaypointError::Cancelled);
            }

            if turns >= self.config.max_turns {
                tracing::info!(session_id = %self.id, turns, "Turn limit reached");
                self.push_assistant_sentinel(TURN_LIMIT_SENTINEL);
                return Ok(TURN_LIMIT_SENTINEL.to_string());
            }
            if rounds >= self.config.max_tool_rounds {
                tracing::info!(session_id = %self.id, rounds, "Tool round limit reached");
                self.push_assistant_sentinel(TOOL_ROUND_LIMIT_SENTINEL);
                return Ok(TOOL_ROUND_LIMIT_SENTINEL.to_string());
            }

            let request = self.build_request();
            let response = tokio::select! {
                r = self.client.complete(&request) => r,
                _ = cancel.cancelled() => return Err(WaypointError::Cancelled),
            };

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    let sentinel = error_sentinel(&e.to_string());
                    tracing::warn!(session_id = %self.id, error = %e, "Provider call failed");
                    self.events.emit(
                        SessionEvent::new(SessionEventKind::Error, &self.id)
                            .with("message", e.to_string()),
                    );
                    self.push_assistant_sentinel(&sentinel);
                    return Ok(sentinel);
                }
            };

            turns += 1;
            tracing::debug!(
                session_id = %self.id,
                turn = turns,
                tool_calls = response.tool_calls.len(),
                "Provider response"
            );

            let tool_calls = response.tool_calls.clone();
            let text = response.text.clone();
            self.history.push(Turn::Assistant {
                content: response.text,
                tool_calls: tool_calls.clone(),
                reasoning: response.reasoning,
                usage: response.usage,
                response_id: response.id,
                timestamp: Utc::now(),
            });

            if tool_calls.is_empty() {
                return Ok(text);
            }

            // Execute tool calls sequentially in declaration order
            let mut looping = false;
            for tc in &tool_calls {
                if cancel.is_cancelled() {
                    return Err(WaypointError::Cancelled);
                }

                self.events.emit(
                    SessionEvent::new(SessionEventKind::ToolCallStart, &self.id)
                        .with("tool", &tc.name)
                        .with("call_id", &tc.id),
                );

                let (content, is_error) = if self.profile.registry.get(&tc.name).is_none() {
                    (format!("Unknown tool: {}", tc.name), true)
                } else {
                    match self
                        .profile
                        .registry
                        .invoke(&tc.name, &tc.arguments, self.env.as_ref())
                        .await
                    {
                        Ok(output) => (truncate_bytes(&output, MAX_TOOL_OUTPUT_BYTES), false),
                        Err(e) => (e.to_string(), true),
                    }
                };

                self.events.emit(
                    SessionEvent::new(SessionEventKind::ToolCallEnd, &self.id)
                        .with("tool", &tc.name)
                        .with("call_id", &tc.id)
                        .with("is_error", is_error.to_string()),
                );

                self.history.push(Turn::ToolResult {
                    tool_call_id: tc.id.clone(),
                    tool_name: tc.name.clone(),
                    content,
                    is_error,
                    timestamp: Utc::now(),
                });

                if self.config.enable_loop_detection
                    && self.detector.record_and_check(&tc.name, &tc.arguments)
                {
                    looping = true;
                }
            }

            self.drain_steering();

            if looping {
                let guidance = loop_guidance();
                tracing::warn!(session_id = %self.id, "Tool-call loop detected");
                self.push_assistant_sentinel(&guidance);
                return Ok(guidance);
            }

            rounds += 1;
        }
    }

    fn push_assistant_sentinel(&mut self, text: &str) {
        self.history.push(Turn::Assistant {
            content: text.to_string(),
            tool_calls: Vec::new(),
            reasoning: None,
            usage: Usage::default(),
            response_id: String::new(),
            timestamp: Utc::now(),
        });
    }

    /// Project the history into a provider request.
    fn build_request(&self) -> Request {
        let mut messages = Vec::new();

        if !self.system_prompt.is_empty() {
            messages.push(Message::system(&self.system_prompt));
        }

        for turn in &self.history {
            match turn {
                Turn::User { content, .. } => {
                    messages.push(Message::user(content));
                }
                Turn::Assistant {
                    content,
                    tool_calls,
                    ..
                } => {
                    let mut parts = Vec::new();
                    if !content.is_empty() {
                        parts.push(ContentPart::Text {
                            text: content.clone(),
                        });
                    }
                    for tc in tool_calls {
                        parts.push(ContentPart::ToolCall {
                            id: tc.id.clone(),
                            name: tc.name.clone(),
                            arguments: tc.arguments.clone(),
                        });
                    }
                    messages.push(Message {
                        role: Role::Assistant,
                        content: parts,
                        tool_call_id: None,
                    });
                }
                Turn::ToolResult {
                    tool_call_id,
                    content,
                    is_error,
                    ..
                } => {
                    messages.push(Message::tool_result(tool_call_id, content, *is_error));
                }
                Turn::Steering { content, .. } => {
                    messages.push(Message::system(content));
                }
            }
        }

        let tools: Vec<waypoint_llm::ToolDefinition> = self
            .profile
            .registry
            .definitions()
            .into_iter()
            .map(|td| waypoint_llm::ToolDefinition {
                name: td.name,
                description: td.description,
                parameters: td.parameters,
            })
            .collect();

        Request {
            model: self.config.model.clone(),
            messages,
            tools,
            reasoning_effort: if self.profile.supports_reasoning {
                self.config.reasoning_effort
            } else {
                None
            },
            provider: self.config.provider.clone(),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
