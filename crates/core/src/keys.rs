//! Key material generation and parsing.
//!
//! All key material crosses the configuration boundary as base64 text in the
//! configured [`Base64Codec`] flavour: symmetric keys as raw bytes, RSA public
//! keys as X.509 `SubjectPublicKeyInfo` DER and RSA private keys as PKCS#8 DER.
//!
//! Generation is seedable. A seed makes the RNG deterministic and exists for
//! reproducible tests only; production callers pass `None`.

use std::fmt;

use rand::{distributions::Alphanumeric, rngs::StdRng, Rng, RngCore, SeedableRng};
use rsa::{
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey},
    RsaPrivateKey, RsaPublicKey,
};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{error, warn};

use crate::{
    catalog::{BlockMode, CipherAlgorithm, KeyFamily},
    codec::Base64Codec,
    error::SecureApiError,
};

// ---------------------------------------------------------------------------
// Key material holders
// ---------------------------------------------------------------------------

/// Base64 key material for the main cipher. Any field may be absent.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct KeyMaterial {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub iv: Option<String>,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub private_key: Option<String>,
}

impl KeyMaterial {
    pub fn key(&self) -> Option<&str> {
        present(&self.key)
    }

    pub fn iv(&self) -> Option<&str> {
        present(&self.iv)
    }

    pub fn public_key(&self) -> Option<&str> {
        present(&self.public_key)
    }

    pub fn private_key(&self) -> Option<&str> {
        present(&self.private_key)
    }
}

/// Key material never appears in debug output.
impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key", &self.key().map(|_| "[REDACTED]"))
            .field("iv", &self.iv().map(|_| "[REDACTED]"))
            .field("public_key", &self.public_key().map(|_| "[REDACTED]"))
            .field("private_key", &self.private_key().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Signature key pair, kept apart from the encryption keys.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SignatureKeyPair {
    pub public_key: Option<String>,
    pub private_key: Option<String>,
}

impl fmt::Debug for SignatureKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureKeyPair")
            .field("public_key", &present(&self.public_key).map(|_| "[REDACTED]"))
            .field("private_key", &present(&self.private_key).map(|_| "[REDACTED]"))
            .finish()
    }
}

/// A freshly generated RSA key pair, both halves base64 encoded.
#[derive(Clone, PartialEq, Eq)]
pub struct RsaKeyPair {
    /// X.509 `SubjectPublicKeyInfo` DER.
    pub public_key: String,
    /// PKCS#8 DER.
    pub private_key: String,
}

impl fmt::Debug for RsaKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaKeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Generates symmetric keys, IVs and RSA key pairs, and parses RSA keys back.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyMaterialProvider {
    codec: Base64Codec,
}

impl KeyMaterialProvider {
    pub fn new(codec: Base64Codec) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> Base64Codec {
        self.codec
    }

    /// Random key of the exact length `family` mandates.
    ///
    /// # Errors
    ///
    /// [`SecureApiError::KeyCreateError`] for [`KeyFamily::Rsa`], which has no
    /// symmetric key.
    pub fn generate_symmetric_key(
        &self,
        family: KeyFamily,
        seed: Option<&str>,
    ) -> Result<String, SecureApiError> {
        if family == KeyFamily::Rsa {
            error!("symmetric key requested for the RSA key family");
            return Err(SecureApiError::KeyCreateError);
        }
        let mut key = vec![0u8; family.key_len()];
        rng(seed).fill_bytes(&mut key);
        Ok(self.codec.encode(key))
    }

    /// `len` alphanumeric characters, base64 encoded.
    pub fn generate_iv(&self, len: usize, seed: Option<&str>) -> String {
        self.codec.encode(alphanumeric(len, seed))
    }

    /// RSA key pair with a `bits`-bit modulus.
    ///
    /// # Errors
    ///
    /// [`SecureApiError::KeyCreateError`] when generation or DER encoding fails.
    pub fn generate_rsa_key_pair(
        &self,
        bits: usize,
        seed: Option<&str>,
    ) -> Result<RsaKeyPair, SecureApiError> {
        let mut rng = rng(seed);
        let private = RsaPrivateKey::new(&mut rng, bits).map_err(|e| {
            error!(error = %e, bits, "RSA key generation failed");
            SecureApiError::KeyCreateError
        })?;
        let public = RsaPublicKey::from(&private);

        let public_der = public.to_public_key_der().map_err(|e| {
            error!(error = %e, "RSA public key encoding failed");
            SecureApiError::KeyCreateError
        })?;
        let private_der = private.to_pkcs8_der().map_err(|e| {
            error!(error = %e, "RSA private key encoding failed");
            SecureApiError::KeyCreateError
        })?;

        Ok(RsaKeyPair {
            public_key: self.codec.encode(public_der.as_bytes()),
            private_key: self.codec.encode(private_der.as_bytes()),
        })
    }

    /// Fill in whatever `algorithm` needs and `material` lacks.
    ///
    /// ECB schemes need a key, CBC schemes a key and an IV (each generated
    /// independently), RSA a key pair (regenerated whole if either half is
    /// missing). Every generated value is logged at `warn` so that operators
    /// can persist it.
    pub fn generate_if_absent(
        &self,
        material: &mut KeyMaterial,
        algorithm: CipherAlgorithm,
        rsa_key_bits: usize,
    ) -> Result<(), SecureApiError> {
        match algorithm.block_mode() {
            None => {
                if material.public_key().is_none() || material.private_key().is_none() {
                    let pair = self.generate_rsa_key_pair(rsa_key_bits, None)?;
                    warn!(
                        %algorithm,
                        public_key = %pair.public_key,
                        private_key = %pair.private_key,
                        "no RSA key pair configured, generated one; persist it or \
                         traffic encrypted with it cannot be decrypted after restart"
                    );
                    material.public_key = Some(pair.public_key);
                    material.private_key = Some(pair.private_key);
                }
            }
            Some(mode) => {
                if material.key().is_none() {
                    let key = self.generate_symmetric_key(algorithm.key_family(), None)?;
                    warn!(
                        %algorithm,
                        key = %key,
                        "no key configured, generated one; persist it or traffic \
                         encrypted with it cannot be decrypted after restart"
                    );
                    material.key = Some(key);
                }
                if mode == BlockMode::Cbc {
                    self.generate_iv_if_absent(material, algorithm);
                }
            }
        }
        Ok(())
    }

    /// Generate only the IV `algorithm` needs, when it is missing.
    pub fn generate_iv_if_absent(&self, material: &mut KeyMaterial, algorithm: CipherAlgorithm) {
        if material.iv().is_some() || algorithm.block_mode() != Some(BlockMode::Cbc) {
            return;
        }
        let iv = self.generate_iv(algorithm.spec().iv_len, None);
        warn!(
            %algorithm,
            iv = %iv,
            "no IV configured, generated one; persist it or traffic encrypted \
             with it cannot be decrypted after restart"
        );
        material.iv = Some(iv);
    }

    /// Complete a signature key pair. Both halves are replaced when either is
    /// missing.
    pub fn generate_signature_pair_if_absent(
        &self,
        pair: &mut SignatureKeyPair,
        rsa_key_bits: usize,
    ) -> Result<(), SecureApiError> {
        if present(&pair.public_key).is_some() && present(&pair.private_key).is_some() {
            return Ok(());
        }
        let generated = self.generate_rsa_key_pair(rsa_key_bits, None)?;
        warn!(
            sign_public_key = %generated.public_key,
            sign_private_key = %generated.private_key,
            "no signature key pair configured, generated one; give the public \
             key to clients and persist both halves"
        );
        pair.public_key = Some(generated.public_key);
        pair.private_key = Some(generated.private_key);
        Ok(())
    }

    /// Parse a base64 X.509 public key.
    pub fn parse_public_key(&self, encoded: &str) -> Result<RsaPublicKey, SecureApiError> {
        let der = self.codec.decode(encoded).map_err(|e| {
            error!(error = %e, "RSA public key is not valid base64");
            SecureApiError::KeyError
        })?;
        RsaPublicKey::from_public_key_der(&der).map_err(|e| {
            error!(error = %e, "RSA public key is not valid X.509 DER");
            SecureApiError::KeyError
        })
    }

    /// Parse a base64 PKCS#8 private key.
    pub fn parse_private_key(&self, encoded: &str) -> Result<RsaPrivateKey, SecureApiError> {
        let der = self.codec.decode(encoded).map_err(|e| {
            error!(error = %e, "RSA private key is not valid base64");
            SecureApiError::KeyError
        })?;
        RsaPrivateKey::from_pkcs8_der(&der).map_err(|e| {
            error!(error = %e, "RSA private key is not valid PKCS#8 DER");
            SecureApiError::KeyError
        })
    }
}

// ---------------------------------------------------------------------------
// Randomness
// ---------------------------------------------------------------------------

/// Seeded RNGs derive their state from SHA-256 of the seed. Unseeded RNGs draw
/// from the OS and fall back to the thread RNG when the OS source fails.
pub(crate) fn rng(seed: Option<&str>) -> StdRng {
    match seed.filter(|s| !s.is_empty()) {
        Some(seed) => StdRng::from_seed(Sha256::digest(seed.as_bytes()).into()),
        None => StdRng::from_rng(rand::rngs::OsRng).unwrap_or_else(|e| {
            error!(error = %e, "OS random source unavailable, falling back to the thread RNG");
            StdRng::from_seed(rand::thread_rng().gen())
        }),
    }
}

/// `len` characters drawn from `[A-Za-z0-9]`.
pub(crate) fn alphanumeric(len: usize, seed: Option<&str>) -> String {
    rng(seed)
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
