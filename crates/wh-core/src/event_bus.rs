//! Event Bus
//!
//! The seam between the host application's events and the webhook engine.
//! The engine only ever subscribes callbacks and (for lifecycle events) publishes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::trace;

/// Callback invoked with the arguments an event was published with
pub type EventCallback = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Publish/subscribe by event name
pub trait EventBus: Send + Sync {
    fn subscribe(&self, event: &str, callback: EventCallback);

    /// Invoke every callback subscribed to `event`, in subscription order
    fn publish(&self, event: &str, args: &[Value]);
}

/// Synchronous in-process bus
///
/// Callbacks run on the publishing thread. The subscriber list is snapshotted
/// before callbacks run, so a callback may subscribe further callbacks; those
/// only see later publications.
#[derive(Default)]
pub struct InMemoryEventBus {
    subscribers: RwLock<HashMap<String, Vec<EventCallback>>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self, event: &str) -> usize {
        self.subscribers.read().get(event).map_or(0, Vec::len)
    }
}

impl EventBus for InMemoryEventBus {
    fn subscribe(&self, event: &str, callback: EventCallback) {
        self.subscribers
            .write()
            .entry(event.to_string())
            .or_default()
            .push(callback);
    }

    fn publish(&self, event: &str, args: &[Value]) {
        let callbacks = match self.subscribers.read().get(event) {
            Some(callbacks) => callbacks.clone(),
            None => return,
        };

        trace!(event = %event, subscribers = callbacks.len(), "Publishing event");
        for callback in callbacks {
            callback(args);
        }
    }
}
