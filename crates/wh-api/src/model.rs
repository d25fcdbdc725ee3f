use serde::Serialize;
use utoipa::ToSchema;

/// Standard API error response
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn forbidden() -> Self {
        Self {
            error: "FORBIDDEN".to_string(),
            message: "Sorry, you are not allowed to do that.".to_string(),
            details: None,
        }
    }

    pub fn no_route() -> Self {
        Self {
            error: "NOT_FOUND".to_string(),
            message: "No route was found matching the URL and request method.".to_string(),
            details: None,
        }
    }

    pub fn invalid_response(status: u16) -> Self {
        Self {
            error: "INTERNAL_ERROR".to_string(),
            message: "Ping handler produced an invalid response".to_string(),
            details: Some(serde_json::json!({ "status": status })),
        }
    }
}

/// Reply of `GET /ping`
#[derive(Debug, Serialize, ToSchema)]
pub struct ListeningResponse {
    /// Always `listening`
    pub message: String,
}

/// Default reply of `/ping/{source}` when no handler accepts the source
#[derive(Debug, Serialize, ToSchema)]
pub struct PingNotHandledResponse {
    pub success: bool,
    pub message: String,
}
