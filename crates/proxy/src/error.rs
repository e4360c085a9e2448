//! API error type that maps [`GatewayError`] variants to HTTP responses.

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use assistgate_types::GatewayError;
use serde_json::json;

/// Wrapper around [`GatewayError`] that implements [`IntoResponse`].
///
/// Upstream replies are passed through with their own status and body;
/// everything else gets the `OpenAI` error envelope.
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl ApiError {
    /// Returns `(status, error_type, error_code)` for the wrapped error.
    fn classify(&self) -> (StatusCode, &'static str, &'static str) {
        match &self.0 {
            GatewayError::Auth(_) => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "invalid_api_key",
            ),
            GatewayError::CredentialsNotFound => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "credentials_not_found",
            ),
            GatewayError::Translation(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "translation_error",
            ),
            GatewayError::Http(_) => (StatusCode::BAD_GATEWAY, "server_error", "upstream_error"),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                "internal_error",
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let GatewayError::Upstream { status, body } = self.0 {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            let content_type = if serde_json::from_str::<serde_json::Value>(&body).is_ok() {
                "application/json"
            } else {
                "text/plain; charset=utf-8"
            };
            return (status, [(header::CONTENT_TYPE, content_type)], body).into_response();
        }

        let (status, error_type, error_code) = self.classify();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (
            status,
            Json(json!({
                "error": {
                    "message": self.0.to_string(),
                    "type": error_type,
                    "code": error_code,
                }
            })),
        )
            .into_response()
    }
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        Self(e)
    }
}
