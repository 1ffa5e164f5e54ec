//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use secure_api_core::SecureApi;

use super::routes::RoutePolicy;

/// Application state shared across all request handlers.
///
/// All fields are cheaply cloneable so that Axum can clone the state for each
/// request without copying key material.
#[derive(Clone)]
pub struct AppState {
    /// Immutable cipher, signature and field-decoding bundle.
    pub api: Arc<SecureApi>,
    /// Which routes are decrypted and encrypted.
    pub routes: Arc<RoutePolicy>,
    /// Largest body the middleware reads into memory.
    pub max_body_bytes: usize,
}

impl AppState {
    /// Create a new [`AppState`], deriving the route policy from the
    /// middleware settings.
    pub fn new(api: SecureApi, max_body_bytes: usize) -> Self {
        let settings = api.settings();
        let routes = RoutePolicy::new(&settings.encrypt_url, &settings.decrypt_url);
        Self {
            api: Arc::new(api),
            routes: Arc::new(routes),
            max_body_bytes,
        }
    }
}
