//! HTTP rendering of middleware failures.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::{protocol::ErrorResponse, ServiceError};
use secure_api_core::{FieldDecodeError, SecureApiError};
use tracing::warn;

/// A [`ServiceError`] plus the machine code reported to the caller.
#[derive(Debug)]
pub struct ApiError {
    pub error: ServiceError,
    pub code: &'static str,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ServiceError::BadRequest(message.into()).into()
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ServiceError::Unauthorized(message.into()).into()
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        ServiceError::PayloadTooLarge(message.into()).into()
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ServiceError::Internal(message.into()).into()
    }
}

impl From<ServiceError> for ApiError {
    fn from(error: ServiceError) -> Self {
        let code = error.code();
        Self { error, code }
    }
}

/// Caller mistakes are 400, signature problems 401, everything else 500.
impl From<SecureApiError> for ApiError {
    fn from(e: SecureApiError) -> Self {
        let message = e.to_string();
        let error = match e {
            SecureApiError::SignatureError => ServiceError::Unauthorized(message),
            _ if e.is_client_error() => ServiceError::BadRequest(message),
            _ => ServiceError::EncryptionFailure(message),
        };
        Self {
            error,
            code: e.code(),
        }
    }
}

impl From<FieldDecodeError> for ApiError {
    fn from(e: FieldDecodeError) -> Self {
        Self::bad_request(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        warn!(status = status.as_u16(), code = self.code, error = %self.error, "request rejected");
        let message = match &self.error {
            ServiceError::BadRequest(m)
            | ServiceError::Unauthorized(m)
            | ServiceError::EncryptionFailure(m)
            | ServiceError::PayloadTooLarge(m)
            | ServiceError::Internal(m) => m.clone(),
        };
        (status, Json(ErrorResponse::new(self.code, message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_status() {
        let status = |e: SecureApiError| ApiError::from(e).error.http_status();
        assert_eq!(status(SecureApiError::DecryptError), 400);
        assert_eq!(status(SecureApiError::SessionKeyEmpty), 400);
        assert_eq!(status(SecureApiError::SessionKeyDecryptError), 400);
        assert_eq!(status(SecureApiError::SignatureError), 401);
        assert_eq!(status(SecureApiError::EncryptError), 500);
        assert_eq!(status(SecureApiError::KeyError), 500);
    }

    #[test]
    fn taxonomy_code_is_kept() {
        let e = ApiError::from(SecureApiError::SessionKeyEmpty);
        assert_eq!(e.code, "SESSION_KEY_EMPTY");
    }

    #[test]
    fn build_failures_are_bad_requests() {
        let e = ApiError::from(FieldDecodeError {
            type_name: "User",
            message: "invalid type".into(),
        });
        assert_eq!(e.error.http_status(), 400);
        assert_eq!(e.code, "bad_request");
    }

    #[test]
    fn oversized_bodies_are_413() {
        let e = ApiError::payload_too_large("body exceeds 16 bytes");
        assert_eq!(e.error.http_status(), 413);
        assert_eq!(e.code, "payload_too_large");
    }
}
