//! Response envelopes returned by the HTTP surface.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Result envelope
// ---------------------------------------------------------------------------

/// `{code, message, data}` envelope used by the demo endpoints.
///
/// When `response_body_data_field` is configured as `"data"`, only the `data`
/// member of this envelope is encrypted on the way out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResult<T> {
    pub code: u16,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResult<T> {
    /// 200 carrying `data`.
    pub fn success_with(message: impl Into<String>, data: T) -> Self {
        Self {
            code: 200,
            message: message.into(),
            data: Some(data),
        }
    }
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"bad_request"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `"ok"`, or `"disabled"` when the middleware is switched off.
    pub status: String,
    pub enabled: bool,
    /// `COMMON` or `SESSION_KEY`.
    pub mode: String,
    pub cipher_algorithm: String,
    /// Only reported in `SESSION_KEY` mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key_cipher_algorithm: Option<String>,
    pub sign_enabled: bool,
}
