//! Inbound Filters
//!
//! Extension points behind the HTTP surface. The core keeps no ping handlers of
//! its own: it hands a default 405 response through the ping filter chain and
//! lets registered filters replace it.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, warn};

use wh_common::PingResponse;

use crate::filters::FilterChain;

/// Read-only view of an inbound request, independent of the HTTP framework
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PingRequest {
    pub method: String,
    pub path: String,
    pub query: BTreeMap<String, String>,
    /// Keys are lower-cased
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

impl PingRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Query parameter, falling back to a top-level field of a JSON object body
    pub fn param(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.query.get(name) {
            return Some(Value::String(value.clone()));
        }
        self.body.as_ref().and_then(|body| body.get(name)).cloned()
    }
}

/// Context handed to every ping filter
#[derive(Debug, Clone)]
pub struct PingContext {
    pub source: String,
    pub request: PingRequest,
}

/// What a ping filter returns: a full response or bare data
#[derive(Debug, Clone, PartialEq)]
pub enum PingReply {
    Response(PingResponse),
    Data(Value),
}

impl PingReply {
    /// Bare data becomes a 200 response carrying that data
    pub fn into_response(self) -> PingResponse {
        match self {
            PingReply::Response(response) => response,
            PingReply::Data(data) => PingResponse::new(200, data),
        }
    }
}

impl From<PingResponse> for PingReply {
    fn from(response: PingResponse) -> Self {
        PingReply::Response(response)
    }
}

impl From<Value> for PingReply {
    fn from(data: Value) -> Self {
        PingReply::Data(data)
    }
}

/// Filter chains consulted by the inbound HTTP surface
#[derive(Debug, Default)]
pub struct InboundFilters {
    /// May replace the reply for a ping from a given source
    pub ping: FilterChain<PingReply, PingContext>,
    /// Running value starts as JSON `true`; only a JSON boolean is accepted
    pub permission: FilterChain<Value, PingRequest>,
    pub namespace: FilterChain<String>,
    pub rest_base: FilterChain<String>,
}

impl InboundFilters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a ping handler for one `source`; other sources pass through untouched
    pub fn add_ping_handler<F>(&self, source: impl Into<String>, handler: F)
    where
        F: Fn(&PingRequest) -> PingReply + Send + Sync + 'static,
    {
        let source = source.into();
        self.ping.add(move |reply, ctx| {
            if ctx.source == source {
                handler(&ctx.request)
            } else {
                reply
            }
        });
    }

    /// Resolve the response for `/ping/{source}`
    pub fn ping(&self, source: &str, request: PingRequest) -> PingResponse {
        let context = PingContext {
            source: source.to_string(),
            request,
        };
        let reply = self
            .ping
            .apply(PingReply::Response(PingResponse::not_handled()), &context);
        let response = reply.into_response();

        debug!(source = %source, status = response.status, "Ping resolved");
        response
    }

    /// Fails closed: any non-boolean result from the chain denies access
    pub fn permission_check(&self, request: &PingRequest) -> bool {
        match self.permission.apply(Value::Bool(true), request) {
            Value::Bool(permitted) => permitted,
            other => {
                warn!(value = %other, "Ping permission filter returned a non-boolean, denying");
                false
            }
        }
    }

    pub fn resolve_namespace(&self, configured: &str) -> String {
        self.namespace.apply(configured.to_string(), &())
    }

    pub fn resolve_rest_base(&self, configured: &str) -> String {
        self.rest_base.apply(configured.to_string(), &())
    }
}
