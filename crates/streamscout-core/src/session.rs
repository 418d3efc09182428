use async_trait::async_trait;

use crate::error::AppError;

/// One exclusive browser session, owned by a single scan task for its
/// lifetime. Sessions are never shared across tasks or rounds.
///
/// Trait object because one orchestrator drives whatever driver the
/// binary wires in (Chromium in production, scripted mocks in tests).
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate the session's page to a URL.
    async fn navigate(&mut self, url: &str) -> Result<(), AppError>;

    /// URLs observed in network traffic since the last call, already
    /// filtered to the pattern the session was opened with.
    async fn events(&mut self) -> Result<Vec<String>, AppError>;

    /// Drop any buffered, not-yet-consumed network events.
    async fn clear_events(&mut self) -> Result<(), AppError>;

    /// Run a script in the page. Transport for profile DOM steps.
    async fn evaluate(&mut self, js: &str) -> Result<(), AppError>;

    /// Release the session. Called exactly once on every task exit path.
    async fn close(self: Box<Self>) -> Result<(), AppError>;
}

/// Opens fresh browser sessions filtered to manifest-style requests.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, filter_pattern: &str) -> Result<Box<dyn BrowserSession>, AppError>;
}
