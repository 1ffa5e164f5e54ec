//! Axum router construction.

use std::time::Duration;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer, trace::TraceLayer};

use super::{handlers, middleware, state::AppState};

/// Build the application [`Router`] with all routes and middleware attached.
///
/// The secure-api layer sits innermost so tracing and compression see the
/// ciphertext, not the plaintext.
pub fn build(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/secure-api-test/form", get(handlers::form))
        .route("/secure-api-test/param", get(handlers::param))
        .route("/secure-api-test/response", get(handlers::response))
        .route("/secure-api-test/request", post(handlers::request))
        .route("/secure-api-test/echo", post(handlers::echo))
        .route("/secure-api-test/plain/echo", post(handlers::echo))
        .fallback(handlers::not_found)
        .layer(from_fn_with_state(state.clone(), middleware::secure_api))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CompressionLayer::new())
        .with_state(state)
}
