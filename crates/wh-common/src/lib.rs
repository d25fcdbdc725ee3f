use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Core Webhook Types
// ============================================================================

/// Header naming the event that triggered an outbound webhook
pub const EVENT_HEADER: &str = "X-Webhook-Event";

/// Transforms the arguments an event was published with into the outbound body.
///
/// Formatters are pure data transformations. They must not perform I/O or
/// register further webhooks.
pub type Formatter = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// Wrap a closure as a [`Formatter`]
pub fn formatter<F>(f: F) -> Formatter
where
    F: Fn(&[Value]) -> Value + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A single event -> target association
#[derive(Clone)]
pub struct WebhookRegistration {
    pub event: String,
    pub target: String,
    pub formatter: Option<Formatter>,
}

impl WebhookRegistration {
    /// Validates that neither the event nor the target is blank.
    ///
    /// The target is not parsed as a URL; a malformed target simply fails at
    /// delivery time.
    pub fn new(
        event: impl Into<String>,
        target: impl Into<String>,
        formatter: Option<Formatter>,
    ) -> Result<Self> {
        let event = event.into();
        let target = target.into();

        if event.trim().is_empty() {
            return Err(WebhookError::EmptyEvent);
        }
        if target.trim().is_empty() {
            return Err(WebhookError::EmptyTarget { event });
        }

        Ok(Self { event, target, formatter })
    }

    /// Build the request for one occurrence of this registration's event
    pub fn request_for(&self, args: &[Value]) -> DispatchRequest {
        DispatchRequest::build(&self.event, &self.target, self.formatter.as_ref(), args)
    }
}

impl fmt::Debug for WebhookRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookRegistration")
            .field("event", &self.event)
            .field("target", &self.target)
            .field("formatter", &self.formatter.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Outbound request built per event occurrence. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchRequest {
    pub event: String,
    pub target: String,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

impl DispatchRequest {
    pub fn build(
        event: &str,
        target: &str,
        formatter: Option<&Formatter>,
        args: &[Value],
    ) -> Self {
        let body = match formatter {
            Some(format) => format(args),
            None => Self::default_body(event),
        };

        let mut headers = BTreeMap::new();
        headers.insert(EVENT_HEADER.to_string(), event.to_string());

        Self {
            event: event.to_string(),
            target: target.to_string(),
            headers,
            body,
        }
    }

    /// Body sent when a registration has no formatter
    pub fn default_body(event: &str) -> Value {
        serde_json::json!({ "action": event })
    }
}

// ============================================================================
// Delivery Types
// ============================================================================

/// What happened to a background delivery. Only logged and counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Target answered 2xx
    Success { status: u16 },
    /// Target answered with a non-2xx status
    HttpError { status: u16 },
    /// Connection, TLS or timeout failure
    TransportError { message: String },
}

impl DeliveryOutcome {
    pub fn from_status(status: u16) -> Self {
        if (200..300).contains(&status) {
            DeliveryOutcome::Success { status }
        } else {
            DeliveryOutcome::HttpError { status }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryOutcome::Success { .. })
    }

    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryOutcome::Success { .. } => "success",
            DeliveryOutcome::HttpError { .. } => "http_error",
            DeliveryOutcome::TransportError { .. } => "transport_error",
        }
    }
}

// ============================================================================
// Inbound Ping Types
// ============================================================================

/// Message of the response returned when nothing handled a ping
pub const PING_NOT_HANDLED_MESSAGE: &str =
    "Error Method Not Allowed: No handler configured to accept pings from this source.";

/// Status/body pair a ping resolves to
#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct PingResponse {
    pub status: u16,
    #[schema(value_type = Object)]
    pub body: Value,
}

impl PingResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// 405 returned when no ping filter replaced the response
    pub fn not_handled() -> Self {
        Self::new(
            405,
            serde_json::json!({
                "success": false,
                "message": PING_NOT_HANDLED_MESSAGE,
            }),
        )
    }

    /// Reply for `GET /ping`
    pub fn listening() -> Self {
        Self::new(200, serde_json::json!({ "message": "listening" }))
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Registration error: event identifier must not be empty")]
    EmptyEvent,

    #[error("Registration error: target for event '{event}' must not be empty")]
    EmptyTarget { event: String },

    #[error("Setup error: {message}")]
    Setup { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WebhookError {
    pub fn setup(message: impl Into<String>) -> Self {
        Self::Setup { message: message.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, WebhookError>;
