use async_trait::async_trait;
use futures_core::Stream;
use std::pin::Pin;
use std::time::Duration;

use crate::{Request, Response, StreamEvent};

/// Default overall cap on a single provider HTTP exchange.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Build the shared HTTP client adapters are expected to use.
///
/// No per-request timeout is imposed on provider calls beyond this overall
/// cap; streaming responses count against the same budget.
pub fn default_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(DEFAULT_REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

// ---------------------------------------------------------------------------
// ProviderAdapter
// ---------------------------------------------------------------------------

/// The contract a concrete LLM back-end adapter fulfills.
///
/// Adapters live outside this workspace; the engine only depends on this
/// trait. Errors must use the typed provider variants on
/// [`waypoint_types::WaypointError`] so retry classification works.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn complete(&self, request: &Request)
        -> Result<Response, waypoint_types::WaypointError>;
    fn stream(&self, request: &Request) -> Pin<Box<dyn Stream<Item = StreamEvent> + Send + '_>>;
    fn name(&self) -> &str;
    fn default_model(&self) -> &str;
    fn supports_tools(&self) -> bool;
    fn supports_streaming(&self) -> bool;
    fn supports_reasoning(&self) -> bool;
    fn context_window_size(&self) -> usize;
}

// ---------------------------------------------------------------------------
// DynProvider
// ---------------------------------------------------------------------------

pub struct DynProvider(Box<dyn ProviderAdapter>);

impl std::fmt::Debug for DynProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DynProvider").field(&self.0.name()).finish()
    }
}

impl DynProvider {
    pub fn new(provider: impl ProviderAdapter + 'static) -> Self {
        Self(Box::new(provider))
    }

    pub async fn complete(
        &self,
        request: &Request,
    ) -> Result<Response, waypoint_types::WaypointError> {
        self.0.complete(request).await
    }

    pub fn stream(
        &self,
        request: &Request,
    ) -> Pin<Box<dyn Stream<Item = StreamEvent> + Send + '_>> {
        self.0.stream(request)
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn default_model(&self) -> &str {
        self.0.default_model()
    }

    pub fn supports_tools(&self) -> bool {
        self.0.supports_tools()
    }

    pub fn supports_streaming(&self) -> bool {
        self.0.supports_streaming()
    }

    pub fn supports_reasoning(&self) -> bool {
        self.0.supports_reasoning()
    }

    pub fn context_window_size(&self) -> usize {
        self.0.context_window_size()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
