//! Lifecycle hooks
//!
//! Extension points fired around setup:
//! - setup: once, after the service has subscribed itself to the host init event
//! - register: when the host publishes its init event; the place to call `register_send_event`
//! - ready: once setup has succeeded

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, info};

use wh_common::WebhookError;

use crate::webhooks::Webhooks;
use crate::Result;

pub type SetupHook = Arc<dyn Fn(&Webhooks) -> Result<()> + Send + Sync>;
pub type RegisterHook = Arc<dyn Fn(&Webhooks) -> Result<()> + Send + Sync>;
pub type ReadyHook = Arc<dyn Fn(&Webhooks) + Send + Sync>;

#[derive(Default)]
pub struct LifecycleHooks {
    setup: RwLock<Vec<SetupHook>>,
    register: RwLock<Vec<RegisterHook>>,
    ready: RwLock<Vec<ReadyHook>>,
}

impl LifecycleHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_setup<F>(&self, hook: F)
    where
        F: Fn(&Webhooks) -> Result<()> + Send + Sync + 'static,
    {
        self.setup.write().push(Arc::new(hook));
    }

    pub fn on_register<F>(&self, hook: F)
    where
        F: Fn(&Webhooks) -> Result<()> + Send + Sync + 'static,
    {
        self.register.write().push(Arc::new(hook));
    }

    pub fn on_ready<F>(&self, hook: F)
    where
        F: Fn(&Webhooks) + Send + Sync + 'static,
    {
        self.ready.write().push(Arc::new(hook));
    }

    /// The first failing hook aborts setup
    pub(crate) fn run_setup(&self, webhooks: &Webhooks) -> Result<()> {
        let hooks = self.setup.read().clone();
        for hook in hooks {
            hook(webhooks).map_err(|e| match e {
                WebhookError::Setup { .. } => e,
                other => WebhookError::setup(other.to_string()),
            })?;
        }
        Ok(())
    }

    /// A failing register hook is logged; the remaining hooks still run
    pub(crate) fn run_register(&self, webhooks: &Webhooks) -> usize {
        let hooks = self.register.read().clone();
        let mut failures = 0;
        for hook in hooks {
            if let Err(e) = hook(webhooks) {
                failures += 1;
                error!(error = %e, "Webhook registration hook failed");
            }
        }
        info!(registered = webhooks.registry().len(), failures, "Register-events phase complete");
        failures
    }

    pub(crate) fn run_ready(&self, webhooks: &Webhooks) {
        let hooks = self.ready.read().clone();
        for hook in hooks {
            hook(webhooks);
        }
    }
}
