//! Outbound progress messages
//!
//! The chat side is reached only through `reply` and `edit`. Delivery is
//! best effort; callers log failures and carry on.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tracing::warn;

/// Identifies a message that can be edited later
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageHandle(pub String);

impl MessageHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum ReporterError {
    #[error("message delivery failed: {0}")]
    Delivery(String),

    #[error("unknown message {0}")]
    UnknownMessage(MessageHandle),
}

#[async_trait]
pub trait Reporter: Send + Sync {
    /// Post a new message in reply to the conversation origin
    async fn reply(&self, content: &str) -> Result<MessageHandle, ReporterError>;

    /// Replace the content of an earlier message
    async fn edit(&self, handle: &MessageHandle, content: &str)
        -> Result<MessageHandle, ReporterError>;
}

/// `reply`, logging instead of failing
pub async fn reply_logged(reporter: &dyn Reporter, content: &str) -> Option<MessageHandle> {
    match reporter.reply(content).await {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Failed to send reply: {e}");
            None
        }
    }
}

/// `edit`, logging instead of failing
pub async fn edit_logged(reporter: &dyn Reporter, handle: &MessageHandle, content: &str) {
    if let Err(e) = reporter.edit(handle, content).await {
        warn!(message = %handle, "Failed to edit message: {e}");
    }
}

/// Prints every message to stdout
#[derive(Default)]
pub struct ConsoleReporter {
    next_id: AtomicU64,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Reporter for ConsoleReporter {
    async fn reply(&self, content: &str) -> Result<MessageHandle, ReporterError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = MessageHandle(format!("console-{id}"));
        println!("[{handle}] {content}");
        Ok(handle)
    }

    async fn edit(
        &self,
        handle: &MessageHandle,
        content: &str,
    ) -> Result<MessageHandle, ReporterError> {
        println!("[{handle} edited] {content}");
        Ok(handle.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReporterCall {
    Reply {
        handle: MessageHandle,
        content: String,
    },
    Edit {
        handle: MessageHandle,
        content: String,
    },
}

impl ReporterCall {
    pub fn content(&self) -> &str {
        match self {
            ReporterCall::Reply { content, .. } | ReporterCall::Edit { content, .. } => content,
        }
    }
}

/// Records every call; optionally fails all of them
#[derive(Default)]
pub struct RecordingReporter {
    calls: Mutex<Vec<ReporterCall>>,
    next_id: AtomicU64,
    failing: bool,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<ReporterCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn replies(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ReporterCall::Reply { content, .. } => Some(content),
                ReporterCall::Edit { .. } => None,
            })
            .collect()
    }

    pub fn last_content(&self) -> Option<String> {
        self.calls().last().map(|c| c.content().to_string())
    }

    fn record(&self, call: ReporterCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl Reporter for RecordingReporter {
    async fn reply(&self, content: &str) -> Result<MessageHandle, ReporterError> {
        if self.failing {
            return Err(ReporterError::Delivery("recording reporter is failing".into()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = MessageHandle(format!("msg-{id}"));
        self.record(ReporterCall::Reply {
            handle: handle.clone(),
            content: content.to_string(),
        });
        Ok(handle)
    }

    async fn edit(
        &self,
        handle: &MessageHandle,
        content: &str,
    ) -> Result<MessageHandle, ReporterError> {
        if self.failing {
            return Err(ReporterError::Delivery("recording reporter is failing".into()));
        }
        self.record(ReporterCall::Edit {
            handle: handle.clone(),
            content: content.to_string(),
        });
        Ok(handle.clone())
    }
}
