//! Chooses the algorithm and key for each encrypt/decrypt call.
//!
//! # Modes
//!
//! - `COMMON`: the main algorithm with the configured key material, both ways.
//! - `SESSION_KEY`: each request carries a session key wrapped with the main
//!   RSA algorithm. Decryption first unwraps it with the configured private
//!   key and installs it on the [`RequestContext`], then decrypts the payload
//!   with the session algorithm. Responses are encrypted with the session
//!   algorithm under the same installed key.
//!
//! The mode is fixed for the lifetime of a dispatcher. Configured RSA keys
//! are parsed on first use and the parsed form is reused by every later call.

use std::{fmt, sync::OnceLock};

use rsa::{RsaPrivateKey, RsaPublicKey};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::{
    catalog::CipherAlgorithm,
    cipher::CipherEngine,
    codec::Base64Codec,
    context::RequestContext,
    error::SecureApiError,
    keys::{KeyMaterial, KeyMaterialProvider},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    #[default]
    Common,
    SessionKey,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Common => "COMMON",
            Mode::SessionKey => "SESSION_KEY",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `SESSION_KEY` needs an RSA main algorithm and a non-RSA session algorithm.
pub fn check_session_invariant(
    mode: Mode,
    main: CipherAlgorithm,
    session: CipherAlgorithm,
) -> Result<(), SecureApiError> {
    if mode == Mode::SessionKey && (!main.is_rsa() || session.is_rsa()) {
        error!(
            cipher_algorithm = %main,
            session_key_cipher_algorithm = %session,
            "session key mode requires an RSA cipher algorithm and a non-RSA session key algorithm"
        );
        return Err(SecureApiError::SessionModeConfigError);
    }
    Ok(())
}

pub struct ModeDispatcher {
    mode: Mode,
    main: CipherAlgorithm,
    session: CipherAlgorithm,
    keys: KeyMaterial,
    codec: Base64Codec,
    show_log: bool,
    public_key: OnceLock<Result<RsaPublicKey, SecureApiError>>,
    private_key: OnceLock<Result<RsaPrivateKey, SecureApiError>>,
}

impl fmt::Debug for ModeDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModeDispatcher")
            .field("mode", &self.mode)
            .field("main", &self.main)
            .field("session", &self.session)
            .field("keys", &self.keys)
            .field("codec", &self.codec)
            .field("show_log", &self.show_log)
            .finish_non_exhaustive()
    }
}

impl ModeDispatcher {
    /// # Errors
    ///
    /// [`SecureApiError::SessionModeConfigError`] when `SESSION_KEY` is paired
    /// with a non-RSA main or an RSA session algorithm.
    pub fn new(
        mode: Mode,
        main: CipherAlgorithm,
        session: CipherAlgorithm,
        keys: KeyMaterial,
        codec: Base64Codec,
    ) -> Result<Self, SecureApiError> {
        check_session_invariant(mode, main, session)?;
        Ok(Self {
            mode,
            main,
            session,
            keys,
            codec,
            show_log: false,
            public_key: OnceLock::new(),
            private_key: OnceLock::new(),
        })
    }

    /// Log ciphertext and plaintext of every call at `info`.
    pub fn with_show_log(mut self, show_log: bool) -> Self {
        self.show_log = show_log;
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Algorithm applied to payloads.
    pub fn payload_algorithm(&self) -> CipherAlgorithm {
        match self.mode {
            Mode::Common => self.main,
            Mode::SessionKey => self.session,
        }
    }

    /// Decrypt a payload. Empty content is returned unchanged.
    pub fn decrypt(&self, ctx: &RequestContext, content: &str) -> Result<String, SecureApiError> {
        if content.is_empty() {
            return Ok(String::new());
        }
        let algorithm = self.payload_algorithm();
        let mut engine = CipherEngine::new(algorithm, self.codec);
        let plaintext = match self.mode {
            Mode::Common if algorithm.is_rsa() => {
                engine.decrypt_with_private_key(content, self.private_key()?)?
            }
            Mode::Common => engine.decrypt(content, self.keys.key().unwrap_or_default(), self.keys.iv())?,
            Mode::SessionKey => {
                let session_key = self.session_key(ctx)?;
                engine.decrypt(content, session_key, self.keys.iv())?
            }
        };
        if self.show_log {
            info!(
                request_id = ctx.request_id(),
                %algorithm,
                ciphertext = content,
                plaintext = %plaintext,
                "decrypted"
            );
        }
        Ok(plaintext)
    }

    /// Encrypt a payload. Empty content is returned unchanged.
    pub fn encrypt(&self, ctx: &RequestContext, content: &str) -> Result<String, SecureApiError> {
        if content.is_empty() {
            return Ok(String::new());
        }
        let algorithm = self.payload_algorithm();
        let mut engine = CipherEngine::new(algorithm, self.codec);
        let ciphertext = match self.mode {
            Mode::Common if algorithm.is_rsa() => {
                engine.encrypt_with_public_key(content, self.public_key()?)?
            }
            Mode::Common => engine.encrypt(content, self.keys.key().unwrap_or_default(), self.keys.iv())?,
            Mode::SessionKey => {
                let session_key = self.session_key(ctx)?;
                engine.encrypt(content, session_key, self.keys.iv())?
            }
        };
        if self.show_log {
            info!(
                request_id = ctx.request_id(),
                %algorithm,
                plaintext = content,
                ciphertext = %ciphertext,
                "encrypted"
            );
        }
        Ok(ciphertext)
    }

    /// The request's session key, unwrapping and installing it on first use.
    fn session_key<'c>(&self, ctx: &'c RequestContext) -> Result<&'c str, SecureApiError> {
        if let Some(key) = ctx.session_key() {
            return Ok(key);
        }
        let wrapped = ctx.wrapped_session_key().ok_or(SecureApiError::SessionKeyEmpty)?;
        let unwrapped = self
            .private_key()
            .and_then(|private| CipherEngine::new(self.main, self.codec).decrypt_with_private_key(wrapped, private))
            .map_err(|e| {
                error!(request_id = ctx.request_id(), error = %e, "session key unwrap failed");
                SecureApiError::SessionKeyDecryptError
            })?;
        Ok(ctx.install_session_key(unwrapped))
    }

    fn public_key(&self) -> Result<&RsaPublicKey, SecureApiError> {
        let encoded = self.keys.public_key().ok_or(SecureApiError::KeyEmpty)?;
        self.public_key
            .get_or_init(|| KeyMaterialProvider::new(self.codec).parse_public_key(encoded))
            .as_ref()
            .map_err(Clone::clone)
    }

    fn private_key(&self) -> Result<&RsaPrivateKey, SecureApiError> {
        let encoded = self.keys.private_key().ok_or(SecureApiError::KeyEmpty)?;
        self.private_key
            .get_or_init(|| KeyMaterialProvider::new(self.codec).parse_private_key(encoded))
            .as_ref()
            .map_err(Clone::clone)
    }
}
