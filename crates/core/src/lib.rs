//! Cryptographic core of the secure-api middleware.
//!
//! Decrypts inbound parameters and bodies, encrypts outbound bodies, signs and
//! verifies payloads, and rebuilds typed values from decrypted strings. The
//! HTTP layer lives in `secure-api-server`; everything here is transport
//! agnostic.
//!
//! Entry point: deserialise a [`SecureApiSettings`], call
//! [`SecureApiSettings::build`] once at startup, and share the resulting
//! [`SecureApi`]. Each request gets its own [`RequestContext`].

pub mod catalog;
pub mod cipher;
pub mod codec;
pub mod coerce;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod fields;
pub mod keys;
pub mod settings;
pub mod signature;

pub use catalog::{AlgorithmSpec, CipherAlgorithm, KeyFamily};
pub use cipher::CipherEngine;
pub use codec::Base64Codec;
pub use coerce::{CoercedValue, DatePatterns, TypeTag, TypedValueCoder};
pub use context::{RequestContext, RouteFlags};
pub use dispatch::{Mode, ModeDispatcher};
pub use error::SecureApiError;
pub use fields::{DecryptFields, FieldDecodeError, FieldDecoder, FieldDescriptor, FieldMarker};
pub use keys::{KeyMaterial, KeyMaterialProvider, RsaKeyPair, SignatureKeyPair};
pub use settings::{SecureApi, SecureApiSettings, UrlPatterns};
pub use signature::SignatureEngine;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::OnceLock;

    use crate::{codec::Base64Codec, keys::KeyMaterialProvider, RsaKeyPair};

    pub fn provider() -> KeyMaterialProvider {
        KeyMaterialProvider::new(Base64Codec::url_safe())
    }

    /// One seeded 2048-bit pair for the whole test binary.
    pub fn rsa_pair() -> &'static RsaKeyPair {
        static PAIR: OnceLock<RsaKeyPair> = OnceLock::new();
        PAIR.get_or_init(|| {
            provider()
                .generate_rsa_key_pair(2048, Some("secure-api-core tests"))
                .expect("test key pair")
        })
    }
}
