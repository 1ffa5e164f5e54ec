//! Base64 text encoding of ciphertext and key material.

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE},
    Engine as _,
};

/// Base64 flavour used on the wire. Both flavours keep `=` padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Base64Codec {
    url_safe: bool,
}

impl Base64Codec {
    pub fn new(url_safe: bool) -> Self {
        Self { url_safe }
    }

    pub fn url_safe() -> Self {
        Self::new(true)
    }

    pub fn standard() -> Self {
        Self::new(false)
    }

    pub fn encode(&self, bytes: impl AsRef<[u8]>) -> String {
        if self.url_safe {
            URL_SAFE.encode(bytes)
        } else {
            STANDARD.encode(bytes)
        }
    }

    pub fn decode(&self, text: impl AsRef<[u8]>) -> Result<Vec<u8>, base64::DecodeError> {
        if self.url_safe {
            URL_SAFE.decode(text)
        } else {
            STANDARD.decode(text)
        }
    }
}

impl Default for Base64Codec {
    fn default() -> Self {
        Self::url_safe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_safe_alphabet() {
        let bytes = [0xfb, 0xff, 0xfe];
        assert_eq!(Base64Codec::url_safe().encode(bytes), "-__-");
        assert_eq!(Base64Codec::standard().encode(bytes), "+//+");
    }

    #[test]
    fn padding_is_kept() {
        assert_eq!(Base64Codec::url_safe().encode(b"a"), "YQ==");
    }

    #[test]
    fn flavours_do_not_mix() {
        assert!(Base64Codec::standard().decode("-__-").is_err());
        assert_eq!(Base64Codec::url_safe().decode("-__-").unwrap(), [0xfb, 0xff, 0xfe]);
    }
}
