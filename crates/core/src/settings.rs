//! Middleware settings and the immutable runtime bundle built from them.

use std::{fmt, sync::Arc};

use serde::Deserialize;
use tracing::info;

use crate::{
    catalog::CipherAlgorithm,
    codec::Base64Codec,
    coerce::{DatePatterns, TypedValueCoder},
    dispatch::{check_session_invariant, Mode, ModeDispatcher},
    error::SecureApiError,
    fields::FieldDecoder,
    keys::{KeyMaterial, KeyMaterialProvider, SignatureKeyPair},
    signature::SignatureEngine,
};

/// Ant-style path patterns selecting the routes a direction applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UrlPatterns {
    #[serde(default)]
    pub include_urls: Vec<String>,
    #[serde(default)]
    pub exclude_urls: Vec<String>,
}

#[derive(Clone, Deserialize)]
pub struct SecureApiSettings {
    /// Master switch; when off, traffic passes through untouched.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Sign responses and verify request signatures.
    #[serde(default)]
    pub sign_enabled: bool,

    /// URL-safe instead of standard base64.
    #[serde(default = "default_true")]
    pub url_safe: bool,

    /// Log plaintext and ciphertext of every call.
    #[serde(default)]
    pub show_log: bool,

    #[serde(default)]
    pub mode: Mode,

    #[serde(default = "default_cipher_algorithm")]
    pub cipher_algorithm: CipherAlgorithm,

    #[serde(default = "default_cipher_algorithm")]
    pub session_key_cipher_algorithm: CipherAlgorithm,

    /// `key`, `iv`, `public_key` and `private_key`.
    #[serde(flatten)]
    pub keys: KeyMaterial,

    #[serde(default)]
    pub sign_public_key: Option<String>,

    #[serde(default)]
    pub sign_private_key: Option<String>,

    /// Modulus size of generated RSA key pairs.
    #[serde(default = "default_rsa_key_bits")]
    pub rsa_key_bits: usize,

    #[serde(default)]
    pub encrypt_url: UrlPatterns,

    #[serde(default)]
    pub decrypt_url: UrlPatterns,

    /// `chrono` format strings tried first when coercing temporal values.
    #[serde(default = "default_date_time_format")]
    pub date_format: String,

    #[serde(default = "default_date_time_format")]
    pub local_date_time_format: String,

    #[serde(default = "default_local_date_format")]
    pub local_date_format: String,

    #[serde(default = "default_local_time_format")]
    pub local_time_format: String,

    /// When set, only this field of a JSON object response is encrypted.
    #[serde(default)]
    pub response_body_data_field: Option<String>,

    /// Header carrying the RSA-wrapped session key.
    #[serde(default = "default_session_key_header")]
    pub session_key_header: String,

    /// Upper bound on concurrently decoded fields.
    #[serde(default = "default_field_workers")]
    pub field_workers: usize,
}

fn default_true() -> bool {
    true
}
fn default_cipher_algorithm() -> CipherAlgorithm {
    CipherAlgorithm::AesEcbPkcs5
}
fn default_rsa_key_bits() -> usize {
    2048
}
fn default_date_time_format() -> String {
    "%Y-%m-%d %H:%M:%S".into()
}
fn default_local_date_format() -> String {
    "%Y-%m-%d".into()
}
fn default_local_time_format() -> String {
    "%H:%M:%S".into()
}
fn default_session_key_header() -> String {
    "X-Session-Key".into()
}
fn default_field_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Default for SecureApiSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            sign_enabled: false,
            url_safe: true,
            show_log: false,
            mode: Mode::Common,
            cipher_algorithm: default_cipher_algorithm(),
            session_key_cipher_algorithm: default_cipher_algorithm(),
            keys: KeyMaterial::default(),
            sign_public_key: None,
            sign_private_key: None,
            rsa_key_bits: default_rsa_key_bits(),
            encrypt_url: UrlPatterns::default(),
            decrypt_url: UrlPatterns::default(),
            date_format: default_date_time_format(),
            local_date_time_format: default_date_time_format(),
            local_date_format: default_local_date_format(),
            local_time_format: default_local_time_format(),
            response_body_data_field: None,
            session_key_header: default_session_key_header(),
            field_workers: default_field_workers(),
        }
    }
}

impl fmt::Debug for SecureApiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureApiSettings")
            .field("enabled", &self.enabled)
            .field("sign_enabled", &self.sign_enabled)
            .field("url_safe", &self.url_safe)
            .field("show_log", &self.show_log)
            .field("mode", &self.mode)
            .field("cipher_algorithm", &self.cipher_algorithm)
            .field("session_key_cipher_algorithm", &self.session_key_cipher_algorithm)
            .field("keys", &self.keys)
            .field("sign_keys", &self.sign_keys())
            .field("rsa_key_bits", &self.rsa_key_bits)
            .field("encrypt_url", &self.encrypt_url)
            .field("decrypt_url", &self.decrypt_url)
            .field("date_format", &self.date_format)
            .field("local_date_time_format", &self.local_date_time_format)
            .field("local_date_format", &self.local_date_format)
            .field("local_time_format", &self.local_time_format)
            .field("response_body_data_field", &self.response_body_data_field)
            .field("session_key_header", &self.session_key_header)
            .field("field_workers", &self.field_workers)
            .finish()
    }
}

impl SecureApiSettings {
    pub fn codec(&self) -> Base64Codec {
        Base64Codec::new(self.url_safe)
    }

    pub fn sign_keys(&self) -> SignatureKeyPair {
        SignatureKeyPair {
            public_key: self.sign_public_key.clone(),
            private_key: self.sign_private_key.clone(),
        }
    }

    /// Configured patterns in priority order.
    pub fn date_patterns(&self) -> DatePatterns {
        DatePatterns::new([
            self.date_format.as_str(),
            self.local_date_time_format.as_str(),
            self.local_date_format.as_str(),
            self.local_time_format.as_str(),
        ])
    }

    /// Validate, generate whatever key material is missing, and assemble the
    /// runtime bundle.
    ///
    /// # Errors
    ///
    /// - [`SecureApiError::SessionModeConfigError`] for an invalid
    ///   `SESSION_KEY` pairing; nothing is generated in that case.
    /// - [`SecureApiError::KeyCreateError`] / [`SecureApiError::KeyError`] when
    ///   key material cannot be generated or parsed.
    pub fn build(mut self) -> Result<SecureApi, SecureApiError> {
        check_session_invariant(self.mode, self.cipher_algorithm, self.session_key_cipher_algorithm)?;

        let codec = self.codec();
        let provider = KeyMaterialProvider::new(codec);
        provider.generate_if_absent(&mut self.keys, self.cipher_algorithm, self.rsa_key_bits)?;
        if self.mode == Mode::SessionKey {
            provider.generate_iv_if_absent(&mut self.keys, self.session_key_cipher_algorithm);
        }

        let signer = if self.sign_enabled {
            let mut pair = self.sign_keys();
            provider.generate_signature_pair_if_absent(&mut pair, self.rsa_key_bits)?;
            let engine = SignatureEngine::new(
                pair.public_key.as_deref().unwrap_or_default(),
                pair.private_key.as_deref().unwrap_or_default(),
                codec,
            )?;
            self.sign_public_key = pair.public_key;
            self.sign_private_key = pair.private_key;
            Some(engine)
        } else {
            None
        };

        let dispatcher = Arc::new(
            ModeDispatcher::new(
                self.mode,
                self.cipher_algorithm,
                self.session_key_cipher_algorithm,
                self.keys.clone(),
                codec,
            )?
            .with_show_log(self.show_log),
        );
        let coder = Arc::new(TypedValueCoder::new(self.date_patterns()));
        let fields = FieldDecoder::new(Arc::clone(&dispatcher), coder, self.field_workers);

        info!(
            enabled = self.enabled,
            mode = ?self.mode,
            cipher_algorithm = %self.cipher_algorithm,
            session_key_cipher_algorithm = %self.session_key_cipher_algorithm,
            sign_enabled = self.sign_enabled,
            url_safe = self.url_safe,
            "secure api configured"
        );

        Ok(SecureApi {
            settings: self,
            dispatcher,
            signer,
            fields,
        })
    }
}

/// Immutable runtime state shared by every request.
#[derive(Debug)]
pub struct SecureApi {
    settings: SecureApiSettings,
    dispatcher: Arc<ModeDispatcher>,
    signer: Option<SignatureEngine>,
    fields: FieldDecoder,
}

impl SecureApi {
    /// Settings with any generated key material filled in.
    pub fn settings(&self) -> &SecureApiSettings {
        &self.settings
    }

    pub fn dispatcher(&self) -> &ModeDispatcher {
        &self.dispatcher
    }

    /// Present when signing is enabled.
    pub fn signer(&self) -> Option<&SignatureEngine> {
        self.signer.as_ref()
    }

    pub fn fields(&self) -> &FieldDecoder {
        &self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{context::RequestContext, test_support::rsa_pair};

    #[test]
    fn defaults() {
        let settings = SecureApiSettings::default();
        assert!(settings.enabled);
        assert!(settings.url_safe);
        assert!(!settings.sign_enabled);
        assert_eq!(settings.mode, Mode::Common);
        assert_eq!(settings.cipher_algorithm, CipherAlgorithm::AesEcbPkcs5);
        assert_eq!(settings.rsa_key_bits, 2048);
        assert_eq!(settings.session_key_header, "X-Session-Key");
        assert!(settings.field_workers >= 1);
    }

    #[test]
    fn deserialises_with_flattened_keys() {
        let settings: SecureApiSettings = serde_json::from_value(serde_json::json!({
            "mode": "SESSION_KEY",
            "cipher_algorithm": "RSA_ECB_SHA256",
            "session_key_cipher_algorithm": "SM4_CBC_PKCS5",
            "key": "a2V5",
            "iv": "aXY=",
            "decrypt_url": { "include_urls": ["/api/**"] }
        }))
        .unwrap();
        assert_eq!(settings.mode, Mode::SessionKey);
        assert_eq!(settings.keys.key(), Some("a2V5"));
        assert_eq!(settings.keys.iv(), Some("aXY="));
        assert_eq!(settings.decrypt_url.include_urls, ["/api/**"]);
        assert!(settings.encrypt_url.include_urls.is_empty());
    }

    #[test]
    fn invalid_session_pairing_fails_before_generation() {
        let settings = SecureApiSettings {
            mode: Mode::SessionKey,
            cipher_algorithm: CipherAlgorithm::AesCbcPkcs5,
            ..Default::default()
        };
        assert_eq!(settings.build().unwrap_err(), SecureApiError::SessionModeConfigError);
    }

    #[test]
    fn build_generates_missing_symmetric_material() {
        let api = SecureApiSettings {
            cipher_algorithm: CipherAlgorithm::DesEdeCbcPkcs5,
            ..Default::default()
        }
        .build()
        .unwrap();
        assert!(api.settings().keys.key().is_some());
        assert!(api.settings().keys.iv().is_some());

        let ctx = RequestContext::default();
        let ciphertext = api.dispatcher().encrypt(&ctx, "payload").unwrap();
        assert_eq!(api.dispatcher().decrypt(&ctx, &ciphertext).unwrap(), "payload");
    }

    #[test]
    fn signing_uses_configured_pair() {
        let pair = rsa_pair();
        let api = SecureApiSettings {
            sign_enabled: true,
            sign_public_key: Some(pair.public_key.clone()),
            sign_private_key: Some(pair.private_key.clone()),
            ..Default::default()
        }
        .build()
        .unwrap();
        let signer = api.signer().unwrap();
        let signature = signer.sign(b"body").unwrap();
        assert!(signer.verify(b"body", &signature).unwrap());
        assert_eq!(api.settings().sign_public_key.as_deref(), Some(pair.public_key.as_str()));
    }

    #[test]
    fn session_mode_generates_session_iv() {
        let pair = rsa_pair();
        let api = SecureApiSettings {
            mode: Mode::SessionKey,
            cipher_algorithm: CipherAlgorithm::RsaEcbPkcs1,
            session_key_cipher_algorithm: CipherAlgorithm::AesCbcPkcs5,
            keys: KeyMaterial {
                public_key: Some(pair.public_key.clone()),
                private_key: Some(pair.private_key.clone()),
                ..Default::default()
            },
            ..Default::default()
        }
        .build()
        .unwrap();
        assert!(api.settings().keys.iv().is_some());
        assert!(api.settings().keys.key().is_none());
    }

    #[test]
    fn debug_hides_key_material() {
        let settings = SecureApiSettings {
            sign_private_key: Some("c2lnbi1zZWNyZXQ=".into()),
            ..Default::default()
        };
        assert!(!format!("{settings:?}").contains("c2lnbi1zZWNyZXQ="));
    }
}
