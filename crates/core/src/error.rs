//! Error taxonomy for the cipher, session-key and signature layers.

use thiserror::Error;

/// Every failure the core can report to the HTTP collaborator.
///
/// Variants never carry raw provider errors: those are logged at the point of
/// failure and replaced by the matching kind here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecureApiError {
    /// Content handed to encrypt/decrypt was empty.
    #[error("content to encrypt or decrypt is empty")]
    ContentEmpty,

    /// Key material handed to encrypt/decrypt was empty.
    #[error("encryption key is empty")]
    KeyEmpty,

    /// A symmetric encryption failed.
    #[error("encryption failed")]
    EncryptError,

    /// A symmetric decryption failed (wrong key, corrupted ciphertext, bad padding).
    #[error("decryption failed, check the ciphertext and that both sides share the same key")]
    DecryptError,

    /// RSA encryption failed, including while chunking.
    #[error("RSA encryption failed")]
    RsaEncryptError,

    /// RSA decryption failed, including while chunking.
    #[error("RSA decryption failed, check the ciphertext and that the key pair matches")]
    RsaDecryptError,

    /// SESSION_KEY mode was used without a wrapped session key on the request.
    #[error("session key is empty")]
    SessionKeyEmpty,

    /// The RSA unwrap of the session key failed.
    #[error("session key decryption failed, check the ciphertext and that the key pair matches")]
    SessionKeyDecryptError,

    /// Signature verification could not run (malformed signature, bad key).
    #[error("signature verification failed")]
    SignatureError,

    /// SESSION_KEY mode needs an RSA main algorithm and a non-RSA session algorithm.
    #[error("session key mode requires an RSA cipher algorithm and a non-RSA session key algorithm")]
    SessionModeConfigError,

    /// Public or private key material could not be decoded.
    #[error("public or private key is invalid")]
    KeyError,

    /// Key pair generation failed.
    #[error("failed to create key material")]
    KeyCreateError,
}

impl SecureApiError {
    /// Stable machine-readable code, safe to expose to callers.
    pub fn code(&self) -> &'static str {
        match self {
            SecureApiError::ContentEmpty => "CONTENT_EMPTY",
            SecureApiError::KeyEmpty => "KEY_EMPTY",
            SecureApiError::EncryptError => "ENCRYPT_ERROR",
            SecureApiError::DecryptError => "DECRYPT_ERROR",
            SecureApiError::RsaEncryptError => "RSA_ENCRYPT_ERROR",
            SecureApiError::RsaDecryptError => "RSA_DECRYPT_ERROR",
            SecureApiError::SessionKeyEmpty => "SESSION_KEY_EMPTY",
            SecureApiError::SessionKeyDecryptError => "SESSION_KEY_DECRYPT_ERROR",
            SecureApiError::SignatureError => "SIGNATURE_ERROR",
            SecureApiError::SessionModeConfigError => "SESSION_MODE_CONFIG_ERROR",
            SecureApiError::KeyError => "KEY_ERROR",
            SecureApiError::KeyCreateError => "KEY_CREATE_ERROR",
        }
    }

    /// `true` for failures that stem from the caller's input rather than the
    /// service's own configuration or key material.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SecureApiError::ContentEmpty
                | SecureApiError::DecryptError
                | SecureApiError::RsaDecryptError
                | SecureApiError::SessionKeyEmpty
                | SecureApiError::SessionKeyDecryptError
                | SecureApiError::SignatureError
        )
    }
}
