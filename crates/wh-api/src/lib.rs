//! Webhooks API
//!
//! HTTP endpoints, nested under the configured namespace (`webhooks/v1`):
//! - `GET /{rest_base}`: registered events and their targets (open)
//! - `GET /ping`: liveness of the inbound surface (permission-gated)
//! - `ANY /ping/{source}`: inbound callbacks routed through the ping filters (permission-gated)
//! - `GET /openapi.json`: OpenAPI document

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use tracing::{debug, info, warn};
use utoipa::OpenApi;

use wh_common::{PingResponse, WebhookError};
use wh_config::RouteConfig;
use wh_core::{PingRequest, WebhookListing, Webhooks};

pub mod model;
use model::{ApiError, ListeningResponse, PingNotHandledResponse};

/// Path segments the listing route may not take
const RESERVED_SEGMENTS: &[&str] = &["ping", "openapi.json"];

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub webhooks: Arc<Webhooks>,
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Webhooks API",
        version = "1.0.0",
        description = "Registered webhook listing and inbound ping callbacks"
    ),
    tags(
        (name = "webhooks", description = "Outbound webhook registrations"),
        (name = "ping", description = "Inbound callbacks from third parties")
    ),
    paths(list_webhooks, ping_status, ping),
    components(schemas(ApiError, ListeningResponse, PingNotHandledResponse))
)]
pub struct ApiDoc;

/// Build the router. Namespace and rest base pass through their override
/// filters here, exactly once; later overrides do not move the routes.
pub fn create_router(webhooks: Arc<Webhooks>, routes: &RouteConfig) -> wh_core::Result<Router> {
    let inbound = webhooks.inbound();
    let namespace = inbound
        .resolve_namespace(&routes.namespace)
        .trim_matches('/')
        .to_string();
    let rest_base = inbound
        .resolve_rest_base(&routes.rest_base)
        .trim_matches('/')
        .to_string();

    if namespace.is_empty() || rest_base.is_empty() {
        return Err(WebhookError::config("route namespace and rest base must not be empty"));
    }
    if RESERVED_SEGMENTS.contains(&rest_base.as_str()) {
        return Err(WebhookError::config(format!(
            "rest base '{}' collides with a built-in route",
            rest_base
        )));
    }

    info!(
        namespace = %namespace,
        rest_base = %rest_base,
        "Registering webhook routes"
    );

    let state = AppState { webhooks };
    let api = Router::new()
        .route(&format!("/{}", rest_base), get(list_webhooks))
        .route("/ping", get(ping_status))
        .route("/ping/:source", any(ping))
        .route("/openapi.json", get(openapi_json))
        .with_state(state);

    Ok(Router::new().nest(&format!("/{}", namespace), api))
}

/// List registered events and their targets
#[utoipa::path(
    get,
    path = "/list",
    tag = "webhooks",
    responses(
        (status = 200, description = "Event -> target URLs, in registration order", body = std::collections::HashMap<String, Vec<String>>)
    )
)]
pub async fn list_webhooks(State(state): State<AppState>) -> Json<WebhookListing> {
    Json(state.webhooks.list())
}

/// Check that the inbound surface is listening
#[utoipa::path(
    get,
    path = "/ping",
    tag = "ping",
    responses(
        (status = 200, description = "Listening", body = ListeningResponse),
        (status = 403, description = "Denied by a permission filter", body = ApiError)
    )
)]
pub async fn ping_status(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let request = build_ping_request(&method, &uri, &headers, &Bytes::new());
    if !state.webhooks.inbound().permission_check(&request) {
        return forbidden();
    }

    let listening = PingResponse::listening();
    (StatusCode::OK, Json(listening.body)).into_response()
}

/// Inbound callback from `source`; answered by whichever ping filter claims it.
///
/// Accepts any method.
#[utoipa::path(
    post,
    path = "/ping/{source}",
    tag = "ping",
    params(
        ("source" = String, Path, description = "Caller identifier, word characters only")
    ),
    request_body(content = String, description = "Raw callback payload, parsed as JSON when possible"),
    responses(
        (status = 200, description = "Handled by a registered ping filter"),
        (status = 403, description = "Denied by a permission filter", body = ApiError),
        (status = 404, description = "Source is not a word", body = ApiError),
        (status = 405, description = "No handler accepts pings from this source", body = PingNotHandledResponse)
    )
)]
pub async fn ping(
    State(state): State<AppState>,
    Path(source): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !is_valid_source(&source) {
        debug!(source = %source, "Rejected ping source segment");
        return (StatusCode::NOT_FOUND, Json(ApiError::no_route())).into_response();
    }

    let request = build_ping_request(&method, &uri, &headers, &body);
    let inbound = state.webhooks.inbound();
    if !inbound.permission_check(&request) {
        return forbidden();
    }

    let response = inbound.ping(&source, request);
    let handled = response != PingResponse::not_handled();
    metrics::counter!("webhooks_ping_total", "handled" => handled.to_string()).increment(1);

    match StatusCode::from_u16(response.status) {
        Ok(status) => (status, Json(response.body)).into_response(),
        Err(_) => {
            warn!(source = %source, status = response.status, "Ping filter returned an invalid status code");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::invalid_response(response.status)),
            )
                .into_response()
        }
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

fn forbidden() -> Response {
    (StatusCode::FORBIDDEN, Json(ApiError::forbidden())).into_response()
}

/// ASCII word characters only
fn is_valid_source(source: &str) -> bool {
    !source.is_empty() && source.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn build_ping_request(method: &Method, uri: &Uri, headers: &HeaderMap, body: &Bytes) -> PingRequest {
    let mut request = PingRequest::new(method.as_str(), uri.path());
    if let Ok(Query(query)) = Query::<BTreeMap<String, String>>::try_from_uri(uri) {
        request.query = query;
    }

    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            request.headers.insert(name.as_str().to_string(), value.to_string());
        }
    }

    if !body.is_empty() {
        request.body = Some(match serde_json::from_slice(body) {
            Ok(json) => json,
            Err(_) => serde_json::Value::String(String::from_utf8_lossy(body).into_owned()),
        });
    }

    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_source_pattern() {
        assert!(is_valid_source("stripe"));
        assert!(is_valid_source("git_hub2"));
        assert!(!is_valid_source("git-hub"));
        assert!(!is_valid_source("a.b"));
        assert!(!is_valid_source(""));
    }

    #[test]
    fn test_build_ping_request_parses_json_body() {
        let mut headers = HeaderMap::new();
        headers.insert("x-signature", "abc".parse().unwrap());
        let uri: Uri = "/webhooks/v1/ping/stripe?mode=test".parse().unwrap();

        let request = build_ping_request(
            &Method::POST,
            &uri,
            &headers,
            &Bytes::from_static(br#"{"id":7}"#),
        );

        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/webhooks/v1/ping/stripe");
        assert_eq!(request.header("x-signature"), Some("abc"));
        assert_eq!(request.param("mode"), Some(json!("test")));
        assert_eq!(request.body, Some(json!({"id": 7})));
    }

    #[test]
    fn test_build_ping_request_keeps_non_json_body_as_text() {
        let request = build_ping_request(
            &Method::PUT,
            &"/x".parse().unwrap(),
            &HeaderMap::new(),
            &Bytes::from_static(b"a=1&b=2"),
        );
        assert_eq!(request.body, Some(json!("a=1&b=2")));

        let empty = build_ping_request(
            &Method::GET,
            &"/x".parse().unwrap(),
            &HeaderMap::new(),
            &Bytes::new(),
        );
        assert_eq!(empty.body, None);
    }

    #[test]
    fn test_openapi_lists_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/list"));
        assert!(doc.paths.paths.contains_key("/ping"));
        assert!(doc.paths.paths.contains_key("/ping/{source}"));
    }

    #[test]
    fn test_openapi_ping_declares_raw_body() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
        let body = &doc["paths"]["/ping/{source}"]["post"]["requestBody"];
        assert!(body["content"].is_object());
        assert_eq!(body["description"], "Raw callback payload, parsed as JSON when possible");
    }
}
