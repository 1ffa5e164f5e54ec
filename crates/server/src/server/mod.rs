//! Axum HTTP server, routing, and the secure-api middleware.
//!
//! # Responsibilities
//! - Define the Axum router with all routes and shared middleware.
//! - Decrypt inbound bodies and parameters, encrypt and sign outbound bodies.
//! - Inject shared application state (`AppState`) into handlers.

pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::OnceLock;

    use secure_api_core::{
        Base64Codec, KeyFamily, KeyMaterial, KeyMaterialProvider, RsaKeyPair, SecureApiSettings,
        UrlPatterns,
    };

    use super::state::AppState;

    pub const DEMO_PATTERN: &str = "/secure-api-test/**";

    pub fn provider() -> KeyMaterialProvider {
        KeyMaterialProvider::new(Base64Codec::url_safe())
    }

    pub fn demo_urls() -> UrlPatterns {
        UrlPatterns {
            include_urls: vec![DEMO_PATTERN.into()],
            exclude_urls: vec!["/secure-api-test/plain/**".into()],
        }
    }

    /// COMMON mode, AES-ECB, both directions on the demo routes.
    pub fn aes_settings() -> SecureApiSettings {
        let key = provider()
            .generate_symmetric_key(KeyFamily::Aes, Some("secure-api-server tests"))
            .expect("aes key");
        SecureApiSettings {
            keys: KeyMaterial {
                key: Some(key),
                ..Default::default()
            },
            encrypt_url: demo_urls(),
            decrypt_url: demo_urls(),
            field_workers: 2,
            ..Default::default()
        }
    }

    pub fn rsa_pair() -> &'static RsaKeyPair {
        static PAIR: OnceLock<RsaKeyPair> = OnceLock::new();
        PAIR.get_or_init(|| {
            provider()
                .generate_rsa_key_pair(2048, Some("secure-api-server tests"))
                .expect("rsa pair")
        })
    }

    pub fn state(settings: SecureApiSettings) -> AppState {
        AppState::new(settings.build().expect("settings build"), 1024 * 1024)
    }
}
