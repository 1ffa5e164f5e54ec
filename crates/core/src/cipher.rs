//! Encryption and decryption for every catalog entry.
//!
//! Symmetric schemes take a base64 key, truncated to the length the key family
//! mandates, and for CBC a base64 IV. RSA schemes take a base64 X.509 public key
//! to encrypt and a base64 PKCS#8 private key to decrypt, and chunk payloads
//! that exceed one RSA block.
//!
//! No-padding schemes pad short plaintext with random alphanumeric characters.
//! The engine remembers the padding it used and strips it from the next
//! decryption, so an encrypt/decrypt pair must run on the same engine. The
//! `&mut self` receivers keep one engine from being shared between concurrent
//! operations.

use aes::Aes256;
use cipher::{
    block_padding::{NoPadding, Pkcs7},
    BlockCipher, BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit,
};
use des::{Des, TdesEde3};
use rsa::{traits::PublicKeyParts, Oaep, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::Sha256;
use sm4::Sm4;
use thiserror::Error;
use tracing::{debug, error};

use crate::{
    catalog::{BlockMode, CipherAlgorithm, KeyFamily, RsaPadding},
    codec::Base64Codec,
    error::SecureApiError,
    keys::{self, KeyMaterialProvider},
};

/// Bytes of OAEP-SHA-256 overhead per RSA block; the strictest of the three
/// RSA schemes, so `modulus_len - RSA_BLOCK_OVERHEAD` fits all of them.
/// 190 bytes for a 2048-bit key.
pub const RSA_BLOCK_OVERHEAD: usize = 66;

/// Low-level failure, logged and then replaced by a [`SecureApiError`].
#[derive(Debug, Error)]
enum CryptoFailure {
    #[error("key material is not valid base64")]
    KeyEncoding,
    #[error("key is shorter than {0} bytes")]
    KeyTooShort(usize),
    #[error("IV is not valid base64")]
    IvEncoding,
    #[error("CBC mode requires an IV")]
    MissingIv,
    #[error("invalid key or IV length")]
    InvalidLength,
    #[error("input is not a multiple of the {0}-byte block size")]
    Unaligned(usize),
    #[error("padding check failed")]
    Unpad,
    #[error("ciphertext is not valid base64")]
    CiphertextEncoding,
    #[error("plaintext is not valid UTF-8")]
    Utf8,
    #[error("algorithm is not an RSA scheme")]
    NotRsa,
    #[error(transparent)]
    Rsa(#[from] rsa::Error),
}

/// Stateful cipher bound to one algorithm.
#[derive(Debug, Clone)]
pub struct CipherEngine {
    algorithm: CipherAlgorithm,
    codec: Base64Codec,
    padding: String,
}

impl CipherEngine {
    pub fn new(algorithm: CipherAlgorithm, codec: Base64Codec) -> Self {
        Self {
            algorithm,
            codec,
            padding: String::new(),
        }
    }

    pub fn algorithm(&self) -> CipherAlgorithm {
        self.algorithm
    }

    /// Encrypt `content` and return base64 ciphertext.
    ///
    /// `key` is the symmetric key, or the RSA public key for RSA schemes. `iv`
    /// is used by CBC schemes only.
    ///
    /// # Errors
    ///
    /// - [`SecureApiError::ContentEmpty`] / [`SecureApiError::KeyEmpty`] on empty input.
    /// - [`SecureApiError::KeyError`] when an RSA key cannot be parsed.
    /// - [`SecureApiError::EncryptError`] / [`SecureApiError::RsaEncryptError`]
    ///   when the cipher itself fails.
    pub fn encrypt(
        &mut self,
        content: &str,
        key: &str,
        iv: Option<&str>,
    ) -> Result<String, SecureApiError> {
        check(content, key)?;
        match self.algorithm.rsa_padding() {
            Some(_) => {
                let public = KeyMaterialProvider::new(self.codec).parse_public_key(key)?;
                self.encrypt_with_public_key(content, &public)
            }
            None => {
                let plaintext = self.pad(content);
                let ciphertext = self.symmetric_encrypt(plaintext.as_bytes(), key, iv).map_err(|e| {
                    error!(algorithm = %self.algorithm, error = %e, "encryption failed");
                    SecureApiError::EncryptError
                })?;
                Ok(self.codec.encode(ciphertext))
            }
        }
    }

    /// Decrypt base64 `content`.
    ///
    /// `key` is the symmetric key, or the RSA private key for RSA schemes.
    ///
    /// # Errors
    ///
    /// As [`encrypt`](Self::encrypt), with the decrypt-side variants.
    pub fn decrypt(
        &mut self,
        content: &str,
        key: &str,
        iv: Option<&str>,
    ) -> Result<String, SecureApiError> {
        check(content, key)?;
        match self.algorithm.rsa_padding() {
            Some(_) => {
                let private = KeyMaterialProvider::new(self.codec).parse_private_key(key)?;
                self.decrypt_with_private_key(content, &private)
            }
            None => {
                let plaintext = self
                    .codec
                    .decode(content)
                    .map_err(|_| CryptoFailure::CiphertextEncoding)
                    .and_then(|bytes| self.symmetric_decrypt(&bytes, key, iv))
                    .and_then(|bytes| String::from_utf8(bytes).map_err(|_| CryptoFailure::Utf8))
                    .map_err(|e| {
                        error!(algorithm = %self.algorithm, error = %e, "decryption failed, check that both sides share the same key");
                        SecureApiError::DecryptError
                    })?;
                Ok(self.unpad(plaintext))
            }
        }
    }

    /// RSA encryption under a key the caller has already parsed.
    ///
    /// # Errors
    ///
    /// [`SecureApiError::ContentEmpty`] on empty input,
    /// [`SecureApiError::RsaEncryptError`] when the engine is not bound to an
    /// RSA scheme or the cipher fails.
    pub fn encrypt_with_public_key(
        &self,
        content: &str,
        public: &RsaPublicKey,
    ) -> Result<String, SecureApiError> {
        if content.is_empty() {
            return Err(SecureApiError::ContentEmpty);
        }
        let ciphertext = self
            .rsa_padding()
            .and_then(|padding| rsa_encrypt(padding, public, content.as_bytes()))
            .map_err(|e| {
                error!(algorithm = %self.algorithm, error = %e, "RSA encryption failed");
                SecureApiError::RsaEncryptError
            })?;
        Ok(self.codec.encode(ciphertext))
    }

    /// RSA decryption under a key the caller has already parsed.
    ///
    /// # Errors
    ///
    /// [`SecureApiError::ContentEmpty`] on empty input,
    /// [`SecureApiError::RsaDecryptError`] otherwise.
    pub fn decrypt_with_private_key(
        &self,
        content: &str,
        private: &RsaPrivateKey,
    ) -> Result<String, SecureApiError> {
        if content.is_empty() {
            return Err(SecureApiError::ContentEmpty);
        }
        self.rsa_padding()
            .and_then(|padding| {
                let bytes = self
                    .codec
                    .decode(content)
                    .map_err(|_| CryptoFailure::CiphertextEncoding)?;
                rsa_decrypt(padding, private, &bytes)
            })
            .and_then(|bytes| String::from_utf8(bytes).map_err(|_| CryptoFailure::Utf8))
            .map_err(|e| {
                error!(algorithm = %self.algorithm, error = %e, "RSA decryption failed, check that the key pair matches");
                SecureApiError::RsaDecryptError
            })
    }

    fn rsa_padding(&self) -> Result<RsaPadding, CryptoFailure> {
        self.algorithm.rsa_padding().ok_or(CryptoFailure::NotRsa)
    }

    // -----------------------------------------------------------------------
    // Manual padding
    // -----------------------------------------------------------------------

    fn pad(&mut self, content: &str) -> String {
        let block = self.algorithm.spec().fill_block_size;
        let remainder = if block == 0 { 0 } else { content.len() % block };
        if remainder == 0 {
            self.padding.clear();
            return content.to_owned();
        }
        self.padding = keys::alphanumeric(block - remainder, None);
        debug!(
            algorithm = %self.algorithm,
            padding = %self.padding,
            "plaintext is not block aligned, padded with random characters"
        );
        format!("{content}{}", self.padding)
    }

    fn unpad(&self, mut plaintext: String) -> String {
        if !self.padding.is_empty() && plaintext.ends_with(&self.padding) {
            plaintext.truncate(plaintext.len() - self.padding.len());
        }
        plaintext
    }

    // -----------------------------------------------------------------------
    // Symmetric path
    // -----------------------------------------------------------------------

    fn symmetric_encrypt(
        &self,
        data: &[u8],
        key: &str,
        iv: Option<&str>,
    ) -> Result<Vec<u8>, CryptoFailure> {
        let (key, iv) = self.key_and_iv(key, iv)?;
        let mode = self.algorithm.block_mode().unwrap_or(BlockMode::Ecb);
        let padded = !self.algorithm.needs_manual_padding();
        match self.algorithm.key_family() {
            KeyFamily::Aes => encrypt_with::<Aes256>(mode, padded, &key, iv.as_deref(), data),
            KeyFamily::Des => encrypt_with::<Des>(mode, padded, &key, iv.as_deref(), data),
            KeyFamily::TripleDes => encrypt_with::<TdesEde3>(mode, padded, &key, iv.as_deref(), data),
            KeyFamily::Sm4 => encrypt_with::<Sm4>(mode, padded, &key, iv.as_deref(), data),
            KeyFamily::Rsa => Err(CryptoFailure::InvalidLength),
        }
    }

    fn symmetric_decrypt(
        &self,
        data: &[u8],
        key: &str,
        iv: Option<&str>,
    ) -> Result<Vec<u8>, CryptoFailure> {
        let (key, iv) = self.key_and_iv(key, iv)?;
        let mode = self.algorithm.block_mode().unwrap_or(BlockMode::Ecb);
        let padded = !self.algorithm.needs_manual_padding();
        match self.algorithm.key_family() {
            KeyFamily::Aes => decrypt_with::<Aes256>(mode, padded, &key, iv.as_deref(), data),
            KeyFamily::Des => decrypt_with::<Des>(mode, padded, &key, iv.as_deref(), data),
            KeyFamily::TripleDes => decrypt_with::<TdesEde3>(mode, padded, &key, iv.as_deref(), data),
            KeyFamily::Sm4 => decrypt_with::<Sm4>(mode, padded, &key, iv.as_deref(), data),
            KeyFamily::Rsa => Err(CryptoFailure::InvalidLength),
        }
    }

    /// Decode the key, truncated to the family's key length, and the IV when
    /// the mode uses one.
    fn key_and_iv(
        &self,
        key: &str,
        iv: Option<&str>,
    ) -> Result<(Vec<u8>, Option<Vec<u8>>), CryptoFailure> {
        let key_len = self.algorithm.key_family().key_len();
        let mut key = self.codec.decode(key).map_err(|_| CryptoFailure::KeyEncoding)?;
        if key.len() < key_len {
            return Err(CryptoFailure::KeyTooShort(key_len));
        }
        key.truncate(key_len);

        let iv = match self.algorithm.block_mode() {
            Some(BlockMode::Cbc) => {
                let iv = iv.filter(|v| !v.is_empty()).ok_or(CryptoFailure::MissingIv)?;
                Some(self.codec.decode(iv).map_err(|_| CryptoFailure::IvEncoding)?)
            }
            _ => None,
        };
        Ok((key, iv))
    }
}

fn check(content: &str, key: &str) -> Result<(), SecureApiError> {
    if content.is_empty() {
        return Err(SecureApiError::ContentEmpty);
    }
    if key.is_empty() {
        return Err(SecureApiError::KeyEmpty);
    }
    Ok(())
}

fn encrypt_with<C>(
    mode: BlockMode,
    padded: bool,
    key: &[u8],
    iv: Option<&[u8]>,
    data: &[u8],
) -> Result<Vec<u8>, CryptoFailure>
where
    C: BlockCipher + BlockEncryptMut + KeyInit,
{
    let block = C::block_size();
    if !padded && data.len() % block != 0 {
        return Err(CryptoFailure::Unaligned(block));
    }
    let out = match mode {
        BlockMode::Ecb => {
            let enc = ecb::Encryptor::<C>::new_from_slice(key).map_err(|_| CryptoFailure::InvalidLength)?;
            if padded {
                enc.encrypt_padded_vec_mut::<Pkcs7>(data)
            } else {
                enc.encrypt_padded_vec_mut::<NoPadding>(data)
            }
        }
        BlockMode::Cbc => {
            let iv = iv.ok_or(CryptoFailure::MissingIv)?;
            let enc = cbc::Encryptor::<C>::new_from_slices(key, iv).map_err(|_| CryptoFailure::InvalidLength)?;
            if padded {
                enc.encrypt_padded_vec_mut::<Pkcs7>(data)
            } else {
                enc.encrypt_padded_vec_mut::<NoPadding>(data)
            }
        }
    };
    Ok(out)
}

fn decrypt_with<C>(
    mode: BlockMode,
    padded: bool,
    key: &[u8],
    iv: Option<&[u8]>,
    data: &[u8],
) -> Result<Vec<u8>, CryptoFailure>
where
    C: BlockCipher + BlockDecryptMut + KeyInit,
{
    let result = match mode {
        BlockMode::Ecb => {
            let dec = ecb::Decryptor::<C>::new_from_slice(key).map_err(|_| CryptoFailure::InvalidLength)?;
            if padded {
                dec.decrypt_padded_vec_mut::<Pkcs7>(data)
            } else {
                dec.decrypt_padded_vec_mut::<NoPadding>(data)
            }
        }
        BlockMode::Cbc => {
            let iv = iv.ok_or(CryptoFailure::MissingIv)?;
            let dec = cbc::Decryptor::<C>::new_from_slices(key, iv).map_err(|_| CryptoFailure::InvalidLength)?;
            if padded {
                dec.decrypt_padded_vec_mut::<Pkcs7>(data)
            } else {
                dec.decrypt_padded_vec_mut::<NoPadding>(data)
            }
        }
    };
    result.map_err(|_| CryptoFailure::Unpad)
}

// ---------------------------------------------------------------------------
// RSA path
// ---------------------------------------------------------------------------

/// Largest plaintext chunk one RSA block of `key` carries.
pub fn rsa_chunk_len(key: &RsaPublicKey) -> usize {
    key.size().saturating_sub(RSA_BLOCK_OVERHEAD).max(1)
}

/// Chunks are encrypted strictly in order and their ciphertexts concatenated.
fn rsa_encrypt(
    padding: RsaPadding,
    key: &RsaPublicKey,
    data: &[u8],
) -> Result<Vec<u8>, CryptoFailure> {
    let mut rng = keys::rng(None);
    let chunk_len = rsa_chunk_len(key);
    let mut out = Vec::with_capacity(data.len().div_ceil(chunk_len) * key.size());
    for chunk in data.chunks(chunk_len) {
        let block = match padding {
            RsaPadding::Pkcs1 => key.encrypt(&mut rng, Pkcs1v15Encrypt, chunk)?,
            RsaPadding::OaepSha1 => key.encrypt(&mut rng, Oaep::new::<Sha1>(), chunk)?,
            RsaPadding::OaepSha256 => {
                key.encrypt(&mut rng, Oaep::new_with_mgf_hash::<Sha256, Sha1>(), chunk)?
            }
        };
        out.extend_from_slice(&block);
    }
    Ok(out)
}

/// Ciphertext is split into modulus-sized blocks, decrypted in order.
fn rsa_decrypt(
    padding: RsaPadding,
    key: &RsaPrivateKey,
    data: &[u8],
) -> Result<Vec<u8>, CryptoFailure> {
    let block_len = key.size();
    if data.is_empty() || data.len() % block_len != 0 {
        return Err(CryptoFailure::Unaligned(block_len));
    }
    let mut out = Vec::with_capacity(data.len());
    for block in data.chunks(block_len) {
        let chunk = match padding {
            RsaPadding::Pkcs1 => key.decrypt(Pkcs1v15Encrypt, block)?,
            RsaPadding::OaepSha1 => key.decrypt(Oaep::new::<Sha1>(), block)?,
            RsaPadding::OaepSha256 => key.decrypt(Oaep::new_with_mgf_hash::<Sha256, Sha1>(), block)?,
        };
        out.extend_from_slice(&chunk);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{provider, rsa_pair};

    fn symmetric_material(algorithm: CipherAlgorithm) -> (String, Option<String>) {
        let p = provider();
        let key = p.generate_symmetric_key(algorithm.key_family(), Some("cipher-tests")).unwrap();
        let iv = (algorithm.block_mode() == Some(BlockMode::Cbc))
            .then(|| p.generate_iv(algorithm.spec().iv_len, Some("cipher-tests")));
        (key, iv)
    }

    fn round_trip(algorithm: CipherAlgorithm, message: &str) -> String {
        let mut engine = CipherEngine::new(algorithm, provider().codec());
        if algorithm.is_rsa() {
            let pair = rsa_pair();
            let ciphertext = engine.encrypt(message, &pair.public_key, None).unwrap();
            engine.decrypt(&ciphertext, &pair.private_key, None).unwrap()
        } else {
            let (key, iv) = symmetric_material(algorithm);
            let ciphertext = engine.encrypt(message, &key, iv.as_deref()).unwrap();
            assert_ne!(ciphertext, message);
            engine.decrypt(&ciphertext, &key, iv.as_deref()).unwrap()
        }
    }

    #[test]
    fn every_algorithm_round_trips() {
        for algorithm in CipherAlgorithm::ALL {
            for message in ["hello", "exactly sixteen!", "你好，世界 with ünïcödé", "x"] {
                assert_eq!(round_trip(algorithm, message), message, "{algorithm}");
            }
        }
    }

    #[test]
    fn rsa_chunk_boundaries_round_trip() {
        let public = provider().parse_public_key(&rsa_pair().public_key).unwrap();
        assert_eq!(rsa_chunk_len(&public), 190);
        for len in [189, 190, 191, 500] {
            let message = "a".repeat(len);
            for algorithm in [
                CipherAlgorithm::RsaEcbPkcs1,
                CipherAlgorithm::RsaEcbSha1,
                CipherAlgorithm::RsaEcbSha256,
            ] {
                assert_eq!(round_trip(algorithm, &message), message, "{algorithm} {len}");
            }
        }
    }

    #[test]
    fn rsa_ciphertext_is_whole_blocks() {
        let pair = rsa_pair();
        let mut engine = CipherEngine::new(CipherAlgorithm::RsaEcbSha256, provider().codec());
        let ciphertext = engine.encrypt(&"b".repeat(191), &pair.public_key, None).unwrap();
        assert_eq!(provider().codec().decode(ciphertext).unwrap().len(), 2 * 256);
    }

    #[test]
    fn no_padding_pads_and_strips() {
        let algorithm = CipherAlgorithm::AesEcbNoPadding;
        let (key, _) = symmetric_material(algorithm);
        let mut engine = CipherEngine::new(algorithm, provider().codec());
        let ciphertext = engine.encrypt("abc", &key, None).unwrap();
        assert_eq!(provider().codec().decode(&ciphertext).unwrap().len(), 16);
        assert_eq!(engine.decrypt(&ciphertext, &key, None).unwrap(), "abc");
    }

    #[test]
    fn fresh_engine_cannot_strip_foreign_padding() {
        let algorithm = CipherAlgorithm::DesCbcNoPadding;
        let (key, iv) = symmetric_material(algorithm);
        let mut sender = CipherEngine::new(algorithm, provider().codec());
        let ciphertext = sender.encrypt("abc", &key, iv.as_deref()).unwrap();
        let mut receiver = CipherEngine::new(algorithm, provider().codec());
        let plaintext = receiver.decrypt(&ciphertext, &key, iv.as_deref()).unwrap();
        assert_eq!(plaintext.len(), 8);
        assert!(plaintext.starts_with("abc"));
    }

    #[test]
    fn empty_content_or_key_is_rejected() {
        let mut engine = CipherEngine::new(CipherAlgorithm::AesEcbPkcs5, provider().codec());
        assert_eq!(engine.encrypt("", "a2V5", None), Err(SecureApiError::ContentEmpty));
        assert_eq!(engine.decrypt("abc", "", None), Err(SecureApiError::KeyEmpty));
    }

    #[test]
    fn wrong_key_fails_decryption() {
        let algorithm = CipherAlgorithm::AesEcbPkcs5;
        let (key, _) = symmetric_material(algorithm);
        let other = provider().generate_symmetric_key(KeyFamily::Aes, Some("other")).unwrap();
        let mut engine = CipherEngine::new(algorithm, provider().codec());
        let ciphertext = engine.encrypt("secret", &key, None).unwrap();
        assert_eq!(engine.decrypt(&ciphertext, &other, None), Err(SecureApiError::DecryptError));
    }

    #[test]
    fn short_key_is_an_encrypt_error() {
        let mut engine = CipherEngine::new(CipherAlgorithm::AesEcbPkcs5, provider().codec());
        let short = provider().codec().encode([7u8; 16]);
        assert_eq!(engine.encrypt("secret", &short, None), Err(SecureApiError::EncryptError));
    }

    #[test]
    fn longer_key_is_truncated() {
        let algorithm = CipherAlgorithm::DesEcbPkcs5;
        let codec = provider().codec();
        let long = codec.encode(*b"12345678-ignored");
        let exact = codec.encode(*b"12345678");
        let mut engine = CipherEngine::new(algorithm, codec);
        let ciphertext = engine.encrypt("payload", &long, None).unwrap();
        assert_eq!(engine.decrypt(&ciphertext, &exact, None).unwrap(), "payload");
    }

    #[test]
    fn cbc_without_iv_fails() {
        let algorithm = CipherAlgorithm::AesCbcPkcs5;
        let (key, _) = symmetric_material(algorithm);
        let mut engine = CipherEngine::new(algorithm, provider().codec());
        assert_eq!(engine.encrypt("secret", &key, None), Err(SecureApiError::EncryptError));
    }

    #[test]
    fn ecb_ignores_iv() {
        let algorithm = CipherAlgorithm::Sm4EcbPkcs5;
        let (key, _) = symmetric_material(algorithm);
        let mut engine = CipherEngine::new(algorithm, provider().codec());
        let with_iv = engine.encrypt("secret", &key, Some("bm9uc2Vuc2U=")).unwrap();
        let without_iv = engine.encrypt("secret", &key, None).unwrap();
        assert_eq!(with_iv, without_iv);
    }

    #[test]
    fn corrupted_rsa_ciphertext_is_rsa_decrypt_error() {
        let pair = rsa_pair();
        let codec = provider().codec();
        let mut engine = CipherEngine::new(CipherAlgorithm::RsaEcbPkcs1, codec);
        let garbage = codec.encode([1u8; 100]);
        assert_eq!(
            engine.decrypt(&garbage, &pair.private_key, None),
            Err(SecureApiError::RsaDecryptError)
        );
    }

    #[test]
    fn parsed_keys_interoperate_with_encoded_keys() {
        let pair = rsa_pair();
        let provider = provider();
        let public = provider.parse_public_key(&pair.public_key).unwrap();
        let private = provider.parse_private_key(&pair.private_key).unwrap();
        let mut engine = CipherEngine::new(CipherAlgorithm::RsaEcbSha1, provider.codec());

        let ciphertext = engine.encrypt_with_public_key("parsed once", &public).unwrap();
        assert_eq!(engine.decrypt(&ciphertext, &pair.private_key, None).unwrap(), "parsed once");

        let ciphertext = engine.encrypt("encoded", &pair.public_key, None).unwrap();
        assert_eq!(engine.decrypt_with_private_key(&ciphertext, &private).unwrap(), "encoded");
    }

    #[test]
    fn parsed_key_methods_need_an_rsa_engine() {
        let pair = rsa_pair();
        let provider = provider();
        let public = provider.parse_public_key(&pair.public_key).unwrap();
        let engine = CipherEngine::new(CipherAlgorithm::AesEcbPkcs5, provider.codec());
        assert_eq!(
            engine.encrypt_with_public_key("x", &public),
            Err(SecureApiError::RsaEncryptError)
        );
        assert_eq!(
            engine.encrypt_with_public_key("", &public),
            Err(SecureApiError::ContentEmpty)
        );
    }

    #[test]
    fn standard_base64_round_trips() {
        let codec = Base64Codec::standard();
        let key = KeyMaterialProvider::new(codec)
            .generate_symmetric_key(KeyFamily::TripleDes, Some("std"))
            .unwrap();
        let mut engine = CipherEngine::new(CipherAlgorithm::DesEdeEcbPkcs5, codec);
        let ciphertext = engine.encrypt("standard alphabet", &key, None).unwrap();
        assert_eq!(engine.decrypt(&ciphertext, &key, None).unwrap(), "standard alphabet");
    }
}
