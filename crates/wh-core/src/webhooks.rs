//! Webhooks service
//!
//! Owns the registry and wires it to the event bus, the dispatcher, the
//! lifecycle hooks and the inbound filters. Construct one with
//! [`Webhooks::builder`], or go through [`Webhooks::factory`] for the
//! process-wide instance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info};

use wh_common::Formatter;
use wh_config::{WebhooksConfig, DEFAULT_INIT_EVENT};

use crate::dispatcher::{Dispatcher, HttpDispatcher, HttpDispatcherConfig};
use crate::event_bus::{EventBus, InMemoryEventBus};
use crate::inbound::InboundFilters;
use crate::lifecycle::LifecycleHooks;
use crate::registry::{WebhookListing, WebhookRegistry};
use crate::Result;

static INSTANCE: RwLock<Option<Arc<Webhooks>>> = parking_lot::const_rwlock(None);

pub struct Webhooks {
    registry: WebhookRegistry,
    bus: Arc<dyn EventBus>,
    hooks: Arc<LifecycleHooks>,
    inbound: Arc<InboundFilters>,
    init_event: String,
    is_setup: AtomicBool,
}

impl Webhooks {
    pub fn builder() -> WebhooksBuilder {
        WebhooksBuilder::default()
    }

    /// The process-wide instance, created from `builder` (or defaults) when
    /// none exists yet or when `force_new` is set. A builder passed while an
    /// instance already exists and `force_new` is false is ignored.
    pub fn factory(builder: Option<WebhooksBuilder>, force_new: bool) -> Result<Arc<Webhooks>> {
        let mut slot = INSTANCE.write();
        if let (Some(existing), false) = (slot.as_ref(), force_new) {
            return Ok(existing.clone());
        }

        let instance = Arc::new(builder.unwrap_or_default().build()?);
        *slot = Some(instance.clone());
        debug!(force_new, "Created webhooks instance");
        Ok(instance)
    }

    /// The process-wide instance, if [`Webhooks::factory`] has created one
    pub fn instance() -> Option<Arc<Webhooks>> {
        INSTANCE.read().clone()
    }

    /// Fire the setup hooks, then subscribe the register-events phase to the
    /// host init event. A failed setup leaves nothing subscribed and may be
    /// retried; after a successful one, calling it again is a no-op.
    pub fn setup(self: &Arc<Self>) -> Result<()> {
        if self.is_setup.swap(true, Ordering::SeqCst) {
            debug!("Webhooks already set up");
            return Ok(());
        }

        if let Err(e) = self.hooks.run_setup(self) {
            self.is_setup.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let weak: Weak<Webhooks> = Arc::downgrade(self);
        self.bus.subscribe(
            &self.init_event,
            Arc::new(move |_args: &[Value]| {
                if let Some(webhooks) = weak.upgrade() {
                    webhooks.register_send_events();
                }
            }),
        );

        info!(init_event = %self.init_event, "Webhooks set up");
        Ok(())
    }

    pub fn is_setup(&self) -> bool {
        self.is_setup.load(Ordering::SeqCst)
    }

    /// Fire the register hooks so external code can add send events.
    /// Returns how many hooks failed.
    pub fn register_send_events(&self) -> usize {
        self.hooks.run_register(self)
    }

    /// Send a POST to `target` whenever `event` is published
    pub fn register_send_event(
        &self,
        event: impl Into<String>,
        target: impl Into<String>,
        formatter: Option<Formatter>,
    ) -> Result<()> {
        self.registry.register(event, target, formatter)
    }

    pub fn list(&self) -> WebhookListing {
        self.registry.list()
    }

    /// Publish a host event on the bus this service listens on
    pub fn publish(&self, event: &str, args: &[Value]) {
        self.bus.publish(event, args);
    }

    pub fn registry(&self) -> &WebhookRegistry {
        &self.registry
    }

    pub fn hooks(&self) -> &Arc<LifecycleHooks> {
        &self.hooks
    }

    pub fn inbound(&self) -> &Arc<InboundFilters> {
        &self.inbound
    }

    pub fn init_event(&self) -> &str {
        &self.init_event
    }
}

/// Constructor injection for [`Webhooks`]
#[derive(Default)]
pub struct WebhooksBuilder {
    bus: Option<Arc<dyn EventBus>>,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    dispatcher_config: Option<HttpDispatcherConfig>,
    hooks: Option<Arc<LifecycleHooks>>,
    inbound: Option<Arc<InboundFilters>>,
    init_event: Option<String>,
}

impl WebhooksBuilder {
    /// Dispatcher settings and init event taken from the loaded configuration
    pub fn from_config(config: &WebhooksConfig) -> Self {
        Self::default()
            .dispatcher_config(HttpDispatcherConfig::from(&config.dispatch))
            .init_event(config.lifecycle.init_event.clone())
    }

    pub fn bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Overrides the default HTTP dispatcher
    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn dispatcher_config(mut self, config: HttpDispatcherConfig) -> Self {
        self.dispatcher_config = Some(config);
        self
    }

    pub fn hooks(mut self, hooks: Arc<LifecycleHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn inbound(mut self, inbound: Arc<InboundFilters>) -> Self {
        self.inbound = Some(inbound);
        self
    }

    pub fn init_event(mut self, event: impl Into<String>) -> Self {
        self.init_event = Some(event.into());
        self
    }

    /// Without an injected dispatcher this builds an [`HttpDispatcher`],
    /// which needs a running tokio runtime.
    pub fn build(self) -> Result<Webhooks> {
        let bus = self
            .bus
            .unwrap_or_else(|| Arc::new(InMemoryEventBus::new()));
        let dispatcher = match self.dispatcher {
            Some(dispatcher) => dispatcher,
            None => Arc::new(HttpDispatcher::new(self.dispatcher_config.unwrap_or_default())?),
        };

        Ok(Webhooks {
            registry: WebhookRegistry::new(bus.clone(), dispatcher),
            bus,
            hooks: self.hooks.unwrap_or_default(),
            inbound: self.inbound.unwrap_or_default(),
            init_event: self
                .init_event
                .unwrap_or_else(|| DEFAULT_INIT_EVENT.to_string()),
            is_setup: AtomicBool::new(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use wh_common::{DispatchRequest, WebhookError};

    #[derive(Default)]
    struct RecordingDispatcher {
        sent: Mutex<Vec<DispatchRequest>>,
    }

    impl Dispatcher for RecordingDispatcher {
        fn send(&self, request: DispatchRequest) {
            self.sent.lock().push(request);
        }
    }

    fn create_webhooks() -> (Arc<Webhooks>, Arc<RecordingDispatcher>) {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let webhooks = Webhooks::builder()
            .dispatcher(dispatcher.clone())
            .build()
            .unwrap();
        (Arc::new(webhooks), dispatcher)
    }

    #[test]
    fn test_register_hook_fires_on_init_event() {
        let (webhooks, dispatcher) = create_webhooks();
        webhooks.hooks().on_register(|wh| {
            wh.register_send_event("order.created", "https://a.test/hook", None)
        });

        webhooks.setup().unwrap();
        assert!(webhooks.list().is_empty());

        webhooks.publish("init", &[]);
        assert_eq!(webhooks.list()["order.created"], vec!["https://a.test/hook".to_string()]);

        webhooks.publish("order.created", &[json!({"id": 42})]);
        let sent = dispatcher.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body, json!({"action": "order.created"}));
    }

    #[test]
    fn test_register_hook_not_fired_before_setup() {
        let (webhooks, _) = create_webhooks();
        webhooks.hooks().on_register(|wh| wh.register_send_event("a", "https://a.test", None));

        webhooks.publish("init", &[]);
        assert!(webhooks.list().is_empty());
    }

    #[test]
    fn test_setup_is_idempotent() {
        let (webhooks, _) = create_webhooks();
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        webhooks.hooks().on_setup(move |_| {
            *counter.lock() += 1;
            Ok(())
        });
        webhooks.hooks().on_register(|wh| wh.register_send_event("a", "https://a.test", None));

        webhooks.setup().unwrap();
        webhooks.setup().unwrap();
        webhooks.publish("init", &[]);

        assert_eq!(*calls.lock(), 1);
        assert_eq!(webhooks.registry().len(), 1);
    }

    #[test]
    fn test_failing_setup_hook_is_setup_error() {
        let (webhooks, _) = create_webhooks();
        webhooks.hooks().on_setup(|_| Err(WebhookError::config("missing signing key")));

        let err = webhooks.setup().unwrap_err();
        assert!(matches!(err, WebhookError::Setup { .. }));
        assert!(err.to_string().contains("missing signing key"));
        assert!(!webhooks.is_setup());
    }

    #[test]
    fn test_failed_setup_leaves_init_unsubscribed_and_retry_subscribes_once() {
        let (webhooks, dispatcher) = create_webhooks();
        let attempts = Arc::new(Mutex::new(0));
        let counter = attempts.clone();
        webhooks.hooks().on_setup(move |_| {
            let mut attempts = counter.lock();
            *attempts += 1;
            if *attempts == 1 {
                Err(WebhookError::setup("dependency wiring failed"))
            } else {
                Ok(())
            }
        });
        webhooks.hooks().on_register(|wh| wh.register_send_event("order.created", "https://a.test", None));

        assert!(webhooks.setup().is_err());
        webhooks.publish("init", &[]);
        assert!(webhooks.list().is_empty());

        webhooks.setup().unwrap();
        webhooks.publish("init", &[]);
        assert_eq!(webhooks.list()["order.created"], vec!["https://a.test".to_string()]);

        webhooks.publish("order.created", &[]);
        assert_eq!(dispatcher.sent.lock().len(), 1);
    }

    #[test]
    fn test_failing_register_hook_does_not_stop_others() {
        let (webhooks, _) = create_webhooks();
        webhooks.hooks().on_register(|wh| wh.register_send_event("", "https://a.test", None));
        webhooks.hooks().on_register(|wh| wh.register_send_event("b", "https://b.test", None));

        webhooks.setup().unwrap();
        assert_eq!(webhooks.register_send_events(), 1);
        assert_eq!(webhooks.list().len(), 1);
    }

    #[test]
    fn test_custom_init_event() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let webhooks = Arc::new(
            Webhooks::builder()
                .dispatcher(dispatcher)
                .init_event("app.booted")
                .build()
                .unwrap(),
        );
        webhooks.hooks().on_register(|wh| wh.register_send_event("a", "https://a.test", None));
        webhooks.setup().unwrap();

        webhooks.publish("init", &[]);
        assert!(webhooks.list().is_empty());
        webhooks.publish("app.booted", &[]);
        assert_eq!(webhooks.list().len(), 1);
    }

    #[test]
    fn test_dropped_instance_ignores_init() {
        let bus = Arc::new(InMemoryEventBus::new());
        let hooks = Arc::new(LifecycleHooks::new());
        let fired = Arc::new(Mutex::new(false));
        let flag = fired.clone();
        hooks.on_register(move |_| {
            *flag.lock() = true;
            Ok(())
        });

        let webhooks = Arc::new(
            Webhooks::builder()
                .bus(bus.clone())
                .hooks(hooks)
                .dispatcher(Arc::new(RecordingDispatcher::default()))
                .build()
                .unwrap(),
        );
        webhooks.setup().unwrap();
        drop(webhooks);

        bus.publish("init", &[]);
        assert!(!*fired.lock());
    }

    // The only test in this crate touching the process-wide instance
    #[test]
    fn test_factory_reuses_and_force_new_replaces() {
        let builder = || Webhooks::builder().dispatcher(Arc::new(RecordingDispatcher::default()));

        let first = Webhooks::factory(Some(builder()), true).unwrap();
        first.register_send_event("a", "https://a.test", None).unwrap();

        let same = Webhooks::factory(Some(builder()), false).unwrap();
        assert!(Arc::ptr_eq(&first, &same));
        assert_eq!(same.list().len(), 1);

        let fresh = Webhooks::factory(Some(builder()), true).unwrap();
        assert!(!Arc::ptr_eq(&first, &fresh));
        assert!(fresh.list().is_empty());

        let current = Webhooks::instance().unwrap();
        assert!(Arc::ptr_eq(&current, &fresh));
    }
}
