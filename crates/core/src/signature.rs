//! SHA-512 with RSA (PKCS#1 v1.5) signatures over arbitrary payloads.

use rsa::{
    pkcs1v15::{Signature, SigningKey, VerifyingKey},
    signature::{SignatureEncoding, Signer, Verifier},
    traits::PublicKeyParts,
};
use sha2::Sha512;
use std::fmt;
use tracing::{error, warn};

use crate::{codec::Base64Codec, error::SecureApiError, keys::KeyMaterialProvider};

/// Signs and verifies with a key pair parsed once at construction.
pub struct SignatureEngine {
    signing: SigningKey<Sha512>,
    verifying: VerifyingKey<Sha512>,
    signature_len: usize,
    codec: Base64Codec,
}

impl SignatureEngine {
    /// Parse a base64 X.509 public key and PKCS#8 private key.
    ///
    /// # Errors
    ///
    /// [`SecureApiError::KeyEmpty`] when either half is empty,
    /// [`SecureApiError::KeyError`] when either half does not parse.
    pub fn new(
        public_key: &str,
        private_key: &str,
        codec: Base64Codec,
    ) -> Result<Self, SecureApiError> {
        if public_key.is_empty() || private_key.is_empty() {
            return Err(SecureApiError::KeyEmpty);
        }
        let provider = KeyMaterialProvider::new(codec);
        let public = provider.parse_public_key(public_key)?;
        let private = provider.parse_private_key(private_key)?;
        Ok(Self {
            signature_len: public.size(),
            signing: SigningKey::<Sha512>::new(private),
            verifying: VerifyingKey::<Sha512>::new(public),
            codec,
        })
    }

    /// Base64 signature of `data`.
    pub fn sign(&self, data: &[u8]) -> Result<String, SecureApiError> {
        let signature = self.signing.try_sign(data).map_err(|e| {
            error!(error = %e, "signing failed");
            SecureApiError::SignatureError
        })?;
        Ok(self.codec.encode(signature.to_bytes()))
    }

    /// Check a base64 `signature` over `data`.
    ///
    /// Returns `Ok(false)` for a well-formed signature that does not match.
    ///
    /// # Errors
    ///
    /// [`SecureApiError::SignatureError`] when the signature is not base64 or
    /// does not have the length of the key's modulus.
    pub fn verify(&self, data: &[u8], signature: &str) -> Result<bool, SecureApiError> {
        let bytes = self.codec.decode(signature.trim()).map_err(|e| {
            warn!(error = %e, "signature is not valid base64");
            SecureApiError::SignatureError
        })?;
        if bytes.len() != self.signature_len {
            warn!(
                len = bytes.len(),
                expected = self.signature_len,
                "signature length does not match the key"
            );
            return Err(SecureApiError::SignatureError);
        }
        let signature = Signature::try_from(bytes.as_slice()).map_err(|e| {
            warn!(error = %e, "malformed signature");
            SecureApiError::SignatureError
        })?;
        Ok(self.verifying.verify(data, &signature).is_ok())
    }
}

impl fmt::Debug for SignatureEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureEngine")
            .field("algorithm", &"SHA512withRSA")
            .field("signature_len", &self.signature_len)
            .finish_non_exhaustive()
    }
}
