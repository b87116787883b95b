//! Provider-neutral LLM client for Waypoint.
//!
//! Defines the normalized request/response model, the [`ProviderAdapter`]
//! contract concrete back-end adapters implement, the routing
//! [`LlmClient`] with its middleware chain, and deterministic provider
//! doubles for tests and dry runs. Wire adapters for specific vendors live
//! outside this workspace; they plug in through [`LlmClient::register_provider`].

mod client;
mod provider;
pub mod testing;
mod types;

pub use client::{
    detect_api_keys, CostTrackingMiddleware, LlmClient, LoggingMiddleware, Middleware,
    ModelCatalog, ModelInfo,
};
pub use provider::{default_http_client, DynProvider, ProviderAdapter};
pub use types::{
    ContentPart, FinishReason, Message, ReasoningEffort, Request, Response, ResponseFormat, Role,
    StreamEvent, ToolCall, ToolChoice, ToolDefinition, Usage,
};
