//! Webhook Registry
//!
//! In-memory table of event -> ordered targets. Every registration also
//! subscribes a dispatch callback on the event bus, so the listing and the
//! live subscriptions never diverge.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::info;

use wh_common::{Formatter, WebhookRegistration};

use crate::dispatcher::Dispatcher;
use crate::event_bus::EventBus;
use crate::Result;

/// Event -> targets, both in registration order
pub type WebhookListing = IndexMap<String, Vec<String>>;

#[derive(Default)]
struct RegistryState {
    listing: WebhookListing,
    registrations: Vec<WebhookRegistration>,
}

pub struct WebhookRegistry {
    bus: Arc<dyn EventBus>,
    dispatcher: Arc<dyn Dispatcher>,
    state: RwLock<RegistryState>,
}

impl WebhookRegistry {
    pub fn new(bus: Arc<dyn EventBus>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            bus,
            dispatcher,
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Register `target` to receive a POST on every occurrence of `event`.
    ///
    /// Duplicates are kept: registering the same pair twice sends twice.
    pub fn register(
        &self,
        event: impl Into<String>,
        target: impl Into<String>,
        formatter: Option<Formatter>,
    ) -> Result<()> {
        let registration = WebhookRegistration::new(event, target, formatter)?;

        // Held across subscribe so a concurrent list() never sees a
        // subscription without its listing entry.
        let mut state = self.state.write();

        let dispatcher = self.dispatcher.clone();
        let subscribed = registration.clone();
        self.bus.subscribe(
            &registration.event,
            Arc::new(move |args: &[Value]| dispatcher.send(subscribed.request_for(args))),
        );

        state
            .listing
            .entry(registration.event.clone())
            .or_default()
            .push(registration.target.clone());

        info!(
            event = %registration.event,
            target = %registration.target,
            formatter = registration.formatter.is_some(),
            "Registered webhook"
        );
        state.registrations.push(registration);
        Ok(())
    }

    /// Snapshot of every registration so far
    pub fn list(&self) -> WebhookListing {
        self.state.read().listing.clone()
    }

    pub fn targets(&self, event: &str) -> Vec<String> {
        self.state
            .read()
            .listing
            .get(event)
            .cloned()
            .unwrap_or_default()
    }

    pub fn registrations(&self) -> Vec<WebhookRegistration> {
        self.state.read().registrations.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
