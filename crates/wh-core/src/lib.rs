//! Webhook Dispatch Core
//!
//! This crate provides the event-to-webhook engine:
//! - EventBus: publish/subscribe seam to the host's events
//! - WebhookRegistry: event -> ordered targets, one bus subscription per registration
//! - HttpDispatcher: fire-and-forget outbound POSTs on background tasks
//! - InboundFilters: ping response, ping permission and route naming filter chains
//! - LifecycleHooks: setup, register-events and ready extension points
//! - Webhooks: the service tying these together, plus its process-wide factory

pub mod bootstrap;
pub mod dispatcher;
pub mod event_bus;
pub mod filters;
pub mod inbound;
pub mod lifecycle;
pub mod registry;
pub mod webhooks;

pub use dispatcher::{Dispatcher, HttpDispatcher, HttpDispatcherConfig};
pub use event_bus::{EventBus, EventCallback, InMemoryEventBus};
pub use filters::FilterChain;
pub use inbound::{InboundFilters, PingContext, PingReply, PingRequest};
pub use lifecycle::LifecycleHooks;
pub use registry::{WebhookListing, WebhookRegistry};
pub use webhooks::{Webhooks, WebhooksBuilder};

pub use wh_common::{
    formatter, DeliveryOutcome, DispatchRequest, Formatter, PingResponse, WebhookError,
    WebhookRegistration, EVENT_HEADER,
};

pub type Result<T> = std::result::Result<T, WebhookError>;
