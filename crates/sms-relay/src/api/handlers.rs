//! HTTP request handlers.

use super::types::{DeliveredResponse, HealthResponse, IngestRequest};
use super::AppState;
use crate::error::RelayError;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use sms_store::ConnectionState;
use tracing::warn;

/// Health check endpoint. 200 only while the store is usable.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.relay.store_state();
    let (code, status) = if store == ConnectionState::Ready {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        code,
        Json(HealthResponse {
            status,
            store: store.as_str(),
            backend: state.relay.store_backend(),
        }),
    )
}

/// Webhook for the SMS forwarder.
pub async fn ingest_sms(
    State(state): State<AppState>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<&'static str, RelayError> {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!("Rejected malformed webhook payload: {}", rejection);
            return Err(RelayError::MalformedPayload);
        }
    };

    let content = request.content.unwrap_or_default();
    let sender = request.from.unwrap_or_default();

    state.relay.ingest(&sender, &content).await?;

    Ok("OK")
}

/// Read and delete the pending message for a phone number.
pub async fn get_sms(
    State(state): State<AppState>,
    Path(phone): Path<String>,
) -> Result<Json<DeliveredResponse>, RelayError> {
    let delivered = state.relay.retrieve(&phone).await?;

    Ok(Json(DeliveredResponse {
        status: "success",
        phone: delivered.phone,
        msg: delivered.body,
    }))
}

/// Anything not routed: bare 404.
pub async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
