//! Common error types shared across crates.

use thiserror::Error;

/// Top-level service error type.
///
/// Variants map to HTTP status codes returned to callers:
/// - [`ServiceError::BadRequest`] → 400
/// - [`ServiceError::Unauthorized`] → 401
/// - [`ServiceError::EncryptionFailure`] → 500
/// - [`ServiceError::PayloadTooLarge`] → 413
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request could not be read: bad ciphertext, a missing session key,
    /// or parameters that do not build the target type.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The payload signature did not verify.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Encrypting or signing a response failed.
    #[error("encryption failure: {0}")]
    EncryptionFailure(String),

    /// The request body exceeds the configured limit.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::BadRequest(_) => 400,
            ServiceError::Unauthorized(_) => 401,
            ServiceError::EncryptionFailure(_) => 500,
            ServiceError::PayloadTooLarge(_) => 413,
            ServiceError::Internal(_) => 500,
        }
    }

    /// Short machine-readable code used in [`crate::ErrorResponse`].
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::BadRequest(_) => "bad_request",
            ServiceError::Unauthorized(_) => "unauthorized",
            ServiceError::EncryptionFailure(_) => "encryption_failure",
            ServiceError::PayloadTooLarge(_) => "payload_too_large",
            ServiceError::Internal(_) => "internal",
        }
    }
}
