//! Closed registry of supported cipher schemes.
//!
//! Each [`CipherAlgorithm`] resolves to exactly one [`AlgorithmSpec`]. The spec
//! says which key family generates its keys, the JCE-style transform string
//! clients use to name it, the IV length, and the manual padding block size.
//!
//! # Catalog invariants
//!
//! - `fill_block_size > 0` only for the `NO_PADDING` variants, and equals
//!   `iv_len` there.
//! - RSA entries have neither an IV nor manual padding.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Key-generation family, which also fixes the symmetric key length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyFamily {
    Aes,
    Des,
    TripleDes,
    Sm4,
    Rsa,
}

impl KeyFamily {
    /// Key length in bits. For RSA this is the default modulus size.
    pub fn key_bits(self) -> usize {
        match self {
            KeyFamily::Aes => 256,
            KeyFamily::Des => 64,
            KeyFamily::TripleDes => 192,
            KeyFamily::Sm4 => 128,
            KeyFamily::Rsa => 2048,
        }
    }

    /// Key length in bytes.
    pub fn key_len(self) -> usize {
        self.key_bits() / 8
    }

    /// Cipher block size in bytes; zero for RSA.
    pub fn block_size(self) -> usize {
        match self {
            KeyFamily::Aes | KeyFamily::Sm4 => 16,
            KeyFamily::Des | KeyFamily::TripleDes => 8,
            KeyFamily::Rsa => 0,
        }
    }

    /// Algorithm name as used in transform strings.
    pub fn name(self) -> &'static str {
        match self {
            KeyFamily::Aes => "AES",
            KeyFamily::Des => "DES",
            KeyFamily::TripleDes => "DESede",
            KeyFamily::Sm4 => "SM4",
            KeyFamily::Rsa => "RSA",
        }
    }
}

/// Block chaining mode of a symmetric scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockMode {
    Ecb,
    Cbc,
}

/// Padding scheme of an RSA entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsaPadding {
    /// PKCS#1 v1.5.
    Pkcs1,
    /// OAEP with SHA-1 and MGF1-SHA-1.
    OaepSha1,
    /// OAEP with SHA-256 and MGF1-SHA-1.
    OaepSha256,
}

/// Immutable description of one catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlgorithmSpec {
    pub id: CipherAlgorithm,
    pub key_family: KeyFamily,
    /// `cipher/mode/padding`, e.g. `"AES/CBC/PKCS5Padding"`.
    pub transform: &'static str,
    pub iv_len: usize,
    /// Non-zero only for schemes that need application-level padding.
    pub fill_block_size: usize,
}

/// Every cipher scheme the service can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CipherAlgorithm {
    AesCbcNoPadding,
    AesCbcPkcs5,
    AesEcbNoPadding,
    AesEcbPkcs5,
    DesCbcNoPadding,
    DesCbcPkcs5,
    DesEcbNoPadding,
    DesEcbPkcs5,
    DesEdeCbcNoPadding,
    DesEdeCbcPkcs5,
    DesEdeEcbNoPadding,
    DesEdeEcbPkcs5,
    Sm4CbcNoPadding,
    Sm4CbcPkcs5,
    Sm4EcbNoPadding,
    Sm4EcbPkcs5,
    RsaEcbPkcs1,
    RsaEcbSha1,
    RsaEcbSha256,
}

const fn symmetric(
    id: CipherAlgorithm,
    key_family: KeyFamily,
    transform: &'static str,
    block: usize,
    no_padding: bool,
) -> AlgorithmSpec {
    AlgorithmSpec {
        id,
        key_family,
        transform,
        iv_len: block,
        fill_block_size: if no_padding { block } else { 0 },
    }
}

const fn rsa(id: CipherAlgorithm, transform: &'static str) -> AlgorithmSpec {
    AlgorithmSpec {
        id,
        key_family: KeyFamily::Rsa,
        transform,
        iv_len: 0,
        fill_block_size: 0,
    }
}

use CipherAlgorithm as A;

static CATALOG: [AlgorithmSpec; 19] = [
    symmetric(A::AesCbcNoPadding, KeyFamily::Aes, "AES/CBC/NoPadding", 16, true),
    symmetric(A::AesCbcPkcs5, KeyFamily::Aes, "AES/CBC/PKCS5Padding", 16, false),
    symmetric(A::AesEcbNoPadding, KeyFamily::Aes, "AES/ECB/NoPadding", 16, true),
    symmetric(A::AesEcbPkcs5, KeyFamily::Aes, "AES/ECB/PKCS5Padding", 16, false),
    symmetric(A::DesCbcNoPadding, KeyFamily::Des, "DES/CBC/NoPadding", 8, true),
    symmetric(A::DesCbcPkcs5, KeyFamily::Des, "DES/CBC/PKCS5Padding", 8, false),
    symmetric(A::DesEcbNoPadding, KeyFamily::Des, "DES/ECB/NoPadding", 8, true),
    symmetric(A::DesEcbPkcs5, KeyFamily::Des, "DES/ECB/PKCS5Padding", 8, false),
    symmetric(A::DesEdeCbcNoPadding, KeyFamily::TripleDes, "DESede/CBC/NoPadding", 8, true),
    symmetric(A::DesEdeCbcPkcs5, KeyFamily::TripleDes, "DESede/CBC/PKCS5Padding", 8, false),
    symmetric(A::DesEdeEcbNoPadding, KeyFamily::TripleDes, "DESede/ECB/NoPadding", 8, true),
    symmetric(A::DesEdeEcbPkcs5, KeyFamily::TripleDes, "DESede/ECB/PKCS5Padding", 8, false),
    symmetric(A::Sm4CbcNoPadding, KeyFamily::Sm4, "SM4/CBC/NoPadding", 16, true),
    symmetric(A::Sm4CbcPkcs5, KeyFamily::Sm4, "SM4/CBC/PKCS5Padding", 16, false),
    symmetric(A::Sm4EcbNoPadding, KeyFamily::Sm4, "SM4/ECB/NoPadding", 16, true),
    symmetric(A::Sm4EcbPkcs5, KeyFamily::Sm4, "SM4/ECB/PKCS5Padding", 16, false),
    rsa(A::RsaEcbPkcs1, "RSA/ECB/PKCS1Padding"),
    rsa(A::RsaEcbSha1, "RSA/ECB/OAEPWithSHA-1AndMGF1Padding"),
    rsa(A::RsaEcbSha256, "RSA/ECB/OAEPWithSHA-256AndMGF1Padding"),
];

impl CipherAlgorithm {
    /// All catalog entries, in declaration order.
    pub const ALL: [CipherAlgorithm; 19] = [
        A::AesCbcNoPadding,
        A::AesCbcPkcs5,
        A::AesEcbNoPadding,
        A::AesEcbPkcs5,
        A::DesCbcNoPadding,
        A::DesCbcPkcs5,
        A::DesEcbNoPadding,
        A::DesEcbPkcs5,
        A::DesEdeCbcNoPadding,
        A::DesEdeCbcPkcs5,
        A::DesEdeEcbNoPadding,
        A::DesEdeEcbPkcs5,
        A::Sm4CbcNoPadding,
        A::Sm4CbcPkcs5,
        A::Sm4EcbNoPadding,
        A::Sm4EcbPkcs5,
        A::RsaEcbPkcs1,
        A::RsaEcbSha1,
        A::RsaEcbSha256,
    ];

    /// Look up the immutable spec of this algorithm.
    pub fn spec(self) -> &'static AlgorithmSpec {
        // `ALL` and `CATALOG` share declaration order.
        &CATALOG[self as usize]
    }

    pub fn key_family(self) -> KeyFamily {
        self.spec().key_family
    }

    pub fn is_rsa(self) -> bool {
        self.key_family() == KeyFamily::Rsa
    }

    /// `true` when plaintext must be padded by the caller before encryption.
    pub fn needs_manual_padding(self) -> bool {
        self.spec().fill_block_size > 0
    }

    /// Chaining mode, or `None` for RSA.
    pub fn block_mode(self) -> Option<BlockMode> {
        if self.is_rsa() {
            return None;
        }
        if self.spec().transform.contains("/CBC/") {
            Some(BlockMode::Cbc)
        } else {
            Some(BlockMode::Ecb)
        }
    }

    /// RSA padding scheme, or `None` for symmetric entries.
    pub fn rsa_padding(self) -> Option<RsaPadding> {
        match self {
            A::RsaEcbPkcs1 => Some(RsaPadding::Pkcs1),
            A::RsaEcbSha1 => Some(RsaPadding::OaepSha1),
            A::RsaEcbSha256 => Some(RsaPadding::OaepSha256),
            _ => None,
        }
    }

    /// Configuration name, e.g. `"AES_CBC_PKCS5"`.
    pub fn name(self) -> &'static str {
        match self {
            A::AesCbcNoPadding => "AES_CBC_NO_PADDING",
            A::AesCbcPkcs5 => "AES_CBC_PKCS5",
            A::AesEcbNoPadding => "AES_ECB_NO_PADDING",
            A::AesEcbPkcs5 => "AES_ECB_PKCS5",
            A::DesCbcNoPadding => "DES_CBC_NO_PADDING",
            A::DesCbcPkcs5 => "DES_CBC_PKCS5",
            A::DesEcbNoPadding => "DES_ECB_NO_PADDING",
            A::DesEcbPkcs5 => "DES_ECB_PKCS5",
            A::DesEdeCbcNoPadding => "DES_EDE_CBC_NO_PADDING",
            A::DesEdeCbcPkcs5 => "DES_EDE_CBC_PKCS5",
            A::DesEdeEcbNoPadding => "DES_EDE_ECB_NO_PADDING",
            A::DesEdeEcbPkcs5 => "DES_EDE_ECB_PKCS5",
            A::Sm4CbcNoPadding => "SM4_CBC_NO_PADDING",
            A::Sm4CbcPkcs5 => "SM4_CBC_PKCS5",
            A::Sm4EcbNoPadding => "SM4_ECB_NO_PADDING",
            A::Sm4EcbPkcs5 => "SM4_ECB_PKCS5",
            A::RsaEcbPkcs1 => "RSA_ECB_PKCS1",
            A::RsaEcbSha1 => "RSA_ECB_SHA1",
            A::RsaEcbSha256 => "RSA_ECB_SHA256",
        }
    }
}

impl fmt::Display for CipherAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when a configured algorithm id is not in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown cipher algorithm: {0}")]
pub struct UnknownAlgorithm(pub String);

impl FromStr for CipherAlgorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        CipherAlgorithm::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(wanted) || a.spec().transform == wanted)
            .ok_or_else(|| UnknownAlgorithm(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_order_matches_enum() {
        for algorithm in CipherAlgorithm::ALL {
            assert_eq!(algorithm.spec().id, algorithm);
        }
    }

    #[test]
    fn fill_block_size_only_for_no_padding() {
        for algorithm in CipherAlgorithm::ALL {
            let spec = algorithm.spec();
            if spec.transform.ends_with("/NoPadding") {
                assert!(spec.fill_block_size > 0, "{algorithm}");
                assert_eq!(spec.fill_block_size, spec.iv_len, "{algorithm}");
            } else {
                assert_eq!(spec.fill_block_size, 0, "{algorithm}");
            }
        }
    }

    #[test]
    fn rsa_entries_have_no_iv_or_padding() {
        for algorithm in CipherAlgorithm::ALL.into_iter().filter(|a| a.is_rsa()) {
            assert_eq!(algorithm.spec().iv_len, 0);
            assert!(!algorithm.needs_manual_padding());
            assert!(algorithm.block_mode().is_none());
            assert!(algorithm.rsa_padding().is_some());
        }
    }

    #[test]
    fn block_modes() {
        assert_eq!(A::AesCbcPkcs5.block_mode(), Some(BlockMode::Cbc));
        assert_eq!(A::DesEdeEcbNoPadding.block_mode(), Some(BlockMode::Ecb));
    }

    #[test]
    fn parse_by_name_or_transform() {
        assert_eq!("AES_CBC_PKCS5".parse::<CipherAlgorithm>().unwrap(), A::AesCbcPkcs5);
        assert_eq!("rsa_ecb_sha256".parse::<CipherAlgorithm>().unwrap(), A::RsaEcbSha256);
        assert_eq!(
            "DESede/ECB/PKCS5Padding".parse::<CipherAlgorithm>().unwrap(),
            A::DesEdeEcbPkcs5
        );
        assert!("ROT13".parse::<CipherAlgorithm>().is_err());
    }

    #[test]
    fn serde_names_match_display() {
        for algorithm in CipherAlgorithm::ALL {
            let json = serde_json::to_string(&algorithm).unwrap();
            assert_eq!(json, format!("\"{algorithm}\""));
        }
    }

    #[test]
    fn key_lengths() {
        assert_eq!(KeyFamily::Aes.key_len(), 32);
        assert_eq!(KeyFamily::Des.key_len(), 8);
        assert_eq!(KeyFamily::TripleDes.key_len(), 24);
        assert_eq!(KeyFamily::Sm4.key_len(), 16);
    }
}
