//! Bootstrap
//!
//! Brings a webhooks instance to the ready state: setup, then the ready hooks.
//! A setup failure is returned untouched so the process can halt with it.

use std::sync::Arc;

use tracing::{error, info};

use wh_config::WebhooksConfig;

use crate::webhooks::Webhooks;
use crate::Result;

pub fn ready(webhooks: &Arc<Webhooks>) -> Result<()> {
    if let Err(e) = webhooks.setup() {
        error!(error = %e, "Webhooks setup failed");
        return Err(e);
    }

    webhooks.hooks().run_ready(webhooks);
    info!("Webhooks ready");
    Ok(())
}

/// Register hook adding the `[[webhooks]]` entries of the configuration
pub fn register_static_webhooks(webhooks: &Webhooks, config: &WebhooksConfig) {
    let entries = config.webhooks.clone();
    webhooks.hooks().on_register(move |wh| {
        for entry in &entries {
            wh.register_send_event(entry.event.as_str(), entry.target.as_str(), None)?;
        }
        Ok(())
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use parking_lot::Mutex;
    use wh_common::{DispatchRequest, WebhookError};
    use wh_config::StaticWebhook;

    struct NullDispatcher;

    impl Dispatcher for NullDispatcher {
        fn send(&self, _request: DispatchRequest) {}
    }

    fn create_webhooks() -> Arc<Webhooks> {
        Arc::new(
            Webhooks::builder()
                .dispatcher(Arc::new(NullDispatcher))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_ready_runs_setup_then_ready_hooks() {
        let webhooks = create_webhooks();
        let order = Arc::new(Mutex::new(Vec::new()));

        let seen = order.clone();
        webhooks.hooks().on_ready(move |_| seen.lock().push("ready"));
        let seen = order.clone();
        webhooks.hooks().on_setup(move |_| {
            seen.lock().push("setup");
            Ok(())
        });

        ready(&webhooks).unwrap();
        assert!(webhooks.is_setup());
        assert_eq!(*order.lock(), vec!["setup", "ready"]);
    }

    #[test]
    fn test_setup_failure_skips_ready_hooks() {
        let webhooks = create_webhooks();
        let fired = Arc::new(Mutex::new(false));
        let flag = fired.clone();
        webhooks.hooks().on_ready(move |_| *flag.lock() = true);
        webhooks.hooks().on_setup(|_| Err(WebhookError::setup("dependency wiring failed")));

        let err = ready(&webhooks).unwrap_err();
        assert_eq!(err.to_string(), "Setup error: dependency wiring failed");
        assert!(!*fired.lock());
    }

    #[test]
    fn test_static_webhooks_register_on_init() {
        let webhooks = create_webhooks();
        let mut config = WebhooksConfig::default();
        config.webhooks = vec![
            StaticWebhook { event: "order.created".into(), target: "https://a.test".into() },
            StaticWebhook { event: "order.created".into(), target: "https://b.test".into() },
        ];

        register_static_webhooks(&webhooks, &config);
        ready(&webhooks).unwrap();
        webhooks.publish(&config.lifecycle.init_event, &[]);

        assert_eq!(
            webhooks.list()["order.created"],
            vec!["https://a.test".to_string(), "https://b.test".to_string()]
        );
    }
}
