use std::time::Duration;

use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct NavigationResult {
    pub url: String,
    pub title: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("{action} timed out after {timeout:?}")]
    Timeout { action: String, timeout: Duration },

    #[error("script evaluation failed: {0}")]
    Eval(String),

    #[error("no element matches {0}")]
    NoElement(String),

    #[error("screenshot failed: {0}")]
    Screenshot(String),

    #[error("driver closed")]
    Closed,

    #[error("not supported: {0}")]
    NotSupported(String),
}

impl DriverError {
    /// Errors that end the session rather than the current attempt.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DriverError::Closed)
    }
}

/// One live page handle. Every session owns exactly one driver exclusively;
/// all page interaction in the engine goes through this seam so tests can
/// substitute a scripted implementation.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Full page transition to a URL.
    async fn navigate(&mut self, url: &str) -> Result<NavigationResult, DriverError>;

    /// URL the page currently shows.
    async fn current_url(&mut self) -> Result<String, DriverError>;

    /// Evaluate a script in the page context and return its JSON value.
    /// Implementations guarantee the snapshot script is installed first.
    async fn eval(&mut self, script: &str) -> Result<serde_json::Value, DriverError>;

    /// Trusted-input click on the first element matching a CSS or XPath
    /// expression.
    async fn click(&mut self, selector: &str) -> Result<(), DriverError>;

    /// Clear and fill the first matching input element.
    async fn fill(&mut self, selector: &str, text: &str) -> Result<(), DriverError>;

    /// Send a key to the first matching element.
    async fn press(&mut self, selector: &str, key: &str) -> Result<(), DriverError>;

    /// Capture the current viewport as PNG bytes.
    async fn screenshot(&mut self) -> Result<Vec<u8>, DriverError> {
        Err(DriverError::NotSupported("screenshot".into()))
    }

    /// Release the page resource. Idempotent.
    async fn close(&mut self) -> Result<(), DriverError>;
}
