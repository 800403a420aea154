//! HTTP API for the relay.

mod handlers;
mod middleware;
mod types;

pub use handlers::*;
pub use middleware::logging_middleware;
pub use types::*;

use crate::relay::SmsRelay;
use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Default request body limit for the webhook.
pub const DEFAULT_BODY_LIMIT: usize = 64 * 1024;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<SmsRelay>,
}

impl AppState {
    /// Create new application state.
    pub fn new(relay: SmsRelay) -> Self {
        Self {
            relay: Arc::new(relay),
        }
    }
}

/// Create the API router with the default body limit.
pub fn create_router(state: AppState) -> Router {
    create_router_with_body_limit(state, DEFAULT_BODY_LIMIT)
}

/// Create the API router with a custom body limit.
pub fn create_router_with_body_limit(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::health).fallback(handlers::not_found))
        .route(
            "/webhook/sms",
            post(handlers::ingest_sms).fallback(handlers::not_found),
        )
        .route(
            "/get-sms/:phone",
            get(handlers::get_sms).fallback(handlers::not_found),
        )
        // Unknown paths and wrong methods both get a bare 404
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum_middleware::from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
