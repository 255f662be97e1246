//! src/eventbus/mod.rs
//!
//! In-process event bus fanning out to every subscriber via bounded MPSC
//! queues. The realtime API and anything else interested in message changes
//! subscribe here. Publishing never waits on a subscriber.

use std::sync::Arc;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::warn;
use wainbox_common::models::Message;

/// Events published whenever the message store changes.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// A message was persisted (inbound from a webhook or outbound from the UI).
    NewMessage(Message),

    /// A delivery receipt changed the status of a stored message.
    StatusUpdate(Message),

    /// Free-form notice, e.g. an ingestion run finished.
    SystemMessage(String),
}

impl ChatEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ChatEvent::NewMessage(_) => "new_message",
            ChatEvent::StatusUpdate(_) => "status_update",
            ChatEvent::SystemMessage(_) => "system_message",
        }
    }

    /// Wire form pushed to realtime listeners: `{"event": ..., "data": ...}`.
    pub fn to_json(&self) -> Value {
        let data = match self {
            ChatEvent::NewMessage(m) | ChatEvent::StatusUpdate(m) => to_value_or_null(m),
            ChatEvent::SystemMessage(text) => Value::String(text.clone()),
        };
        json!({ "event": self.event_type(), "data": data })
    }
}

fn to_value_or_null<T: Serialize>(item: &T) -> Value {
    serde_json::to_value(item).unwrap_or_else(|e| {
        warn!("Failed to serialize event payload: {}", e);
        Value::Null
    })
}

/// Each subscriber gets its own `mpsc::Sender<ChatEvent>`.
///
/// - A subscriber whose buffer is full is dropped; its receiver sees the
///   queued events and then `None`.
/// - Subscribers whose receiver was dropped are removed on the next publish.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<ChatEvent>>>>,
    shutdown_tx: watch::Sender<bool>,
    pub shutdown_rx: watch::Receiver<bool>,
}

const DEFAULT_BUFFER_SIZE: usize = 1024;

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            subscribers: Arc::new(Mutex::new(vec![])),
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn subscribe(&self, buffer_size: Option<usize>) -> mpsc::Receiver<ChatEvent> {
        let size = buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let (tx, rx) = mpsc::channel(size);
        let mut subs = self.subscribers.lock().await;
        subs.push(tx);
        rx
    }

    pub async fn subscriber_count(&self) -> usize {
        let mut subs = self.subscribers.lock().await;
        subs.retain(|s| !s.is_closed());
        subs.len()
    }

    /// Publish an event to all live subscribers without waiting on any of them.
    pub async fn publish(&self, event: ChatEvent) {
        let mut subs = self.subscribers.lock().await;
        subs.retain(|s| match s.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Dropping subscriber that fell behind on {} events", event.event_type());
                false
            }
            Err(TrySendError::Closed(_)) => false,
        });
    }
}
