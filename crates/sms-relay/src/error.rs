//! Error types for the relay.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use sms_store::StoreError;
use thiserror::Error;
use tracing::error;

/// Message shown to readers when nothing is waiting for them.
pub const NOT_FOUND_MESSAGE: &str = "no message or expired";

/// Relay error types.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Malformed payload: missing content")]
    MalformedPayload,

    #[error("Invalid sender: {0:?} contains no phone number")]
    InvalidSender(String),

    #[error("No message for {0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub msg: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let (status, msg) = match &self {
            RelayError::MalformedPayload => (StatusCode::BAD_REQUEST, "malformed payload".to_string()),
            RelayError::InvalidSender(_) => (StatusCode::BAD_REQUEST, "invalid sender".to_string()),
            RelayError::NotFound(_) => (StatusCode::BAD_REQUEST, NOT_FOUND_MESSAGE.to_string()),
            RelayError::StoreUnavailable(e) => {
                error!("Store error: {}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "server error".to_string())
            }
        };

        let body = ErrorResponse {
            status: "error",
            msg,
        };

        (status, Json(body)).into_response()
    }
}
