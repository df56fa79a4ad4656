//! Progress reporting. The control loop talks to the outside world only
//! through this interface; transports subscribe however they like.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Starting,
    Navigating,
    Analyzing,
    Planning,
    Executing,
    StepSuccess,
    StepFailed,
    Done,
    Failed,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Starting => "starting",
            SessionStatus::Navigating => "navigating",
            SessionStatus::Analyzing => "analyzing",
            SessionStatus::Planning => "planning",
            SessionStatus::Executing => "executing",
            SessionStatus::StepSuccess => "step_success",
            SessionStatus::StepFailed => "step_failed",
            SessionStatus::Done => "done",
            SessionStatus::Failed => "failed",
            SessionStatus::Completed => "completed",
        }
    }

    /// `done` and `failed` end a session; `completed` is the trailing
    /// close notice emitted after either.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Done | SessionStatus::Failed | SessionStatus::Completed
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One progress notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub status: SessionStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    /// PNG bytes; transports encode these for their own wire format.
    #[serde(skip)]
    pub screenshot: Option<Vec<u8>>,
}

impl ProgressEvent {
    pub fn new(status: SessionStatus, message: impl Into<String>) -> Self {
        ProgressEvent {
            status,
            message: message.into(),
            step_id: None,
            screenshot: None,
        }
    }

    pub fn with_step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }

    pub fn with_screenshot(mut self, png: Vec<u8>) -> Self {
        self.screenshot = Some(png);
        self
    }
}

#[async_trait]
pub trait Observer: Send + Sync {
    async fn notify(&self, event: ProgressEvent);
}

/// Discards everything.
pub struct NullObserver;

#[async_trait]
impl Observer for NullObserver {
    async fn notify(&self, _event: ProgressEvent) {}
}

/// Forwards events into an unbounded channel; dropped receivers are
/// tolerated silently so a disappearing client cannot stall the loop.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelObserver { tx }, rx)
    }
}

#[async_trait]
impl Observer for ChannelObserver {
    async fn notify(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}
