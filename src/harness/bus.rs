//! In-process stand-in for the chat transport

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::debug;

use crate::reporter::{MessageHandle, Reporter, ReporterError};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SimEventKind {
    Reply,
    Edit,
}

/// One reporter call observed on the bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimEvent {
    pub conversation: String,
    pub kind: SimEventKind,
    pub handle: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only event log with broadcast fan-out
pub struct EventBus {
    log: Mutex<Vec<SimEvent>>,
    sender: broadcast::Sender<SimEvent>,
    next_handle: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            log: Mutex::new(Vec::new()),
            sender,
            next_handle: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, event: SimEvent) {
        debug!(
            conversation = %event.conversation,
            kind = ?event.kind,
            handle = %event.handle,
            "Simulated message"
        );
        if let Ok(mut log) = self.log.lock() {
            log.push(event.clone());
        }
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SimEvent> {
        self.sender.subscribe()
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Ordered events of one conversation
    pub fn events_for(&self, conversation: &str) -> Vec<SimEvent> {
        self.log
            .lock()
            .map(|l| {
                l.iter()
                    .filter(|e| e.conversation == conversation)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn next_handle(&self) -> MessageHandle {
        let id = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
        MessageHandle(format!("sim-{id}"))
    }
}

/// Reporter that publishes its calls on an [`EventBus`]
pub struct SimulatedReporter {
    bus: Arc<EventBus>,
    conversation: String,
}

impl SimulatedReporter {
    pub fn new(bus: Arc<EventBus>, conversation: impl Into<String>) -> Self {
        Self {
            bus,
            conversation: conversation.into(),
        }
    }

    pub fn conversation(&self) -> &str {
        &self.conversation
    }

    fn emit(&self, kind: SimEventKind, handle: &MessageHandle, content: &str) {
        self.bus.publish(SimEvent {
            conversation: self.conversation.clone(),
            kind,
            handle: handle.0.clone(),
            content: content.to_string(),
            timestamp: Utc::now(),
        });
    }
}

#[async_trait]
impl Reporter for SimulatedReporter {
    async fn reply(&self, content: &str) -> Result<MessageHandle, ReporterError> {
        let handle = self.bus.next_handle();
        self.emit(SimEventKind::Reply, &handle, content);
        Ok(handle)
    }

    async fn edit(
        &self,
        handle: &MessageHandle,
        content: &str,
    ) -> Result<MessageHandle, ReporterError> {
        self.emit(SimEventKind::Edit, handle, content);
        Ok(handle.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_are_logged_and_broadcast() {
        let bus = Arc::new(EventBus::new());
        let mut rx = bus.subscribe();
        let first = SimulatedReporter::new(Arc::clone(&bus), "a");
        let second = SimulatedReporter::new(Arc::clone(&bus), "b");

        let handle = first.reply("hello").await.unwrap();
        second.reply("other").await.unwrap();
        first.edit(&handle, "hello again").await.unwrap();

        let events = bus.events_for("a");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, SimEventKind::Reply);
        assert_eq!(events[1].kind, SimEventKind::Edit);
        assert_eq!(events[1].handle, handle.0);
        assert_eq!(bus.events().len(), 3);

        assert_eq!(rx.recv().await.unwrap().content, "hello");
    }
}
