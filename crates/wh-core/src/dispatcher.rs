//! Webhook Dispatcher
//!
//! Sends one outbound POST per event occurrence and target. Delivery is
//! fire-and-forget: the request is built on the caller's thread, handed to a
//! background task, and its outcome is only logged and counted. Nothing is
//! retried.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use wh_common::{DeliveryOutcome, DispatchRequest, Formatter, WebhookError};
use wh_config::DispatchConfig;

use crate::Result;

/// Hands a built request off for delivery without waiting on it
pub trait Dispatcher: Send + Sync {
    /// Must return without waiting for the network
    fn send(&self, request: DispatchRequest);

    /// Build the request for one occurrence and send it
    fn dispatch(&self, event: &str, target: &str, formatter: Option<&Formatter>, args: &[Value]) {
        self.send(DispatchRequest::build(event, target, formatter, args));
    }
}

/// HTTP dispatcher configuration
#[derive(Debug, Clone)]
pub struct HttpDispatcherConfig {
    pub connect_timeout: Duration,
    /// Bounds how long a background delivery can live
    pub request_timeout: Duration,
    /// Deliveries in flight at once; further deliveries are dropped
    pub max_in_flight: usize,
    pub user_agent: String,
}

impl Default for HttpDispatcherConfig {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

impl From<&DispatchConfig> for HttpDispatcherConfig {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            request_timeout: config.request_timeout(),
            max_in_flight: config.max_in_flight,
            user_agent: config.user_agent.clone(),
        }
    }
}

/// Dispatcher that POSTs JSON bodies with reqwest on a tokio runtime
pub struct HttpDispatcher {
    config: HttpDispatcherConfig,
    client: reqwest::Client,
    runtime: Handle,
    permits: Arc<Semaphore>,
}

impl HttpDispatcher {
    /// Must be called from within a tokio runtime; deliveries are spawned on it
    pub fn new(config: HttpDispatcherConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            WebhookError::setup(format!("HTTP dispatcher needs a tokio runtime: {}", e))
        })?;
        Self::with_runtime(config, runtime)
    }

    pub fn with_runtime(config: HttpDispatcherConfig, runtime: Handle) -> Result<Self> {
        if config.max_in_flight == 0 {
            return Err(WebhookError::config("max_in_flight must be greater than zero"));
        }
        if config.max_in_flight > Semaphore::MAX_PERMITS {
            return Err(WebhookError::config(format!(
                "max_in_flight must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| WebhookError::Http(e.to_string()))?;

        info!(
            request_timeout = ?config.request_timeout,
            max_in_flight = config.max_in_flight,
            "HTTP dispatcher ready"
        );

        Ok(Self {
            permits: Arc::new(Semaphore::new(config.max_in_flight)),
            config,
            client,
            runtime,
        })
    }

    /// Deliveries currently running in the background
    pub fn in_flight(&self) -> usize {
        self.config.max_in_flight - self.permits.available_permits()
    }

    /// POST a request and report what happened. Never fails.
    pub async fn deliver(client: &reqwest::Client, request: &DispatchRequest) -> DeliveryOutcome {
        let mut builder = client.post(&request.target).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        match builder.send().await {
            Ok(response) => DeliveryOutcome::from_status(response.status().as_u16()),
            Err(e) => DeliveryOutcome::TransportError { message: e.to_string() },
        }
    }
}

impl Dispatcher for HttpDispatcher {
    fn send(&self, request: DispatchRequest) {
        let permit = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(
                    event = %request.event,
                    target = %request.target,
                    max_in_flight = self.config.max_in_flight,
                    "Dispatch capacity exhausted, dropping webhook delivery"
                );
                metrics::counter!("webhooks_dispatch_total", "outcome" => "dropped").increment(1);
                return;
            }
        };

        let delivery_id = Uuid::new_v4();
        debug!(
            delivery_id = %delivery_id,
            event = %request.event,
            target = %request.target,
            "Scheduling webhook delivery"
        );
        metrics::counter!("webhooks_dispatch_total", "outcome" => "scheduled").increment(1);

        let client = self.client.clone();
        self.runtime.spawn(async move {
            let _permit = permit;
            let outcome = HttpDispatcher::deliver(&client, &request).await;

            match &outcome {
                DeliveryOutcome::Success { status } => {
                    debug!(
                        delivery_id = %delivery_id,
                        event = %request.event,
                        target = %request.target,
                        status = status,
                        "Webhook delivered"
                    );
                }
                DeliveryOutcome::HttpError { status } => {
                    warn!(
                        delivery_id = %delivery_id,
                        event = %request.event,
                        target = %request.target,
                        status = status,
                        "Webhook target answered with an error status"
                    );
                }
                DeliveryOutcome::TransportError { message } => {
                    error!(
                        delivery_id = %delivery_id,
                        event = %request.event,
                        target = %request.target,
                        error = %message,
                        "Webhook delivery failed"
                    );
                }
            }

            metrics::counter!("webhooks_delivery_total", "outcome" => outcome.label()).increment(1);
        });
    }
}
