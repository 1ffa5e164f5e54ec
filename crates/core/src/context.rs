//! Per-request state handed explicitly through the call chain.
//!
//! The session key lives here and nowhere else, so concurrent requests never
//! observe each other's keys.

use std::sync::OnceLock;

use uuid::Uuid;

/// Whether the current route has its input decrypted and its output
/// encrypted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteFlags {
    pub encrypt: bool,
    pub decrypt: bool,
}

#[derive(Debug)]
pub struct RequestContext {
    request_id: String,
    flags: RouteFlags,
    /// RSA ciphertext of the session key, as received.
    wrapped_session_key: Option<String>,
    /// Installed at most once per request by the first unwrap.
    session_key: OnceLock<String>,
}

impl RequestContext {
    pub fn new(flags: RouteFlags, wrapped_session_key: Option<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            flags,
            wrapped_session_key: wrapped_session_key.filter(|k| !k.is_empty()),
            session_key: OnceLock::new(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn flags(&self) -> RouteFlags {
        self.flags
    }

    pub fn wrapped_session_key(&self) -> Option<&str> {
        self.wrapped_session_key.as_deref()
    }

    pub fn session_key(&self) -> Option<&str> {
        self.session_key.get().map(String::as_str)
    }

    /// Install the unwrapped session key. The first installation wins; the
    /// installed key is returned either way.
    pub fn install_session_key(&self, key: String) -> &str {
        let _ = self.session_key.set(key);
        self.session_key.get().map(String::as_str).unwrap_or_default()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(RouteFlags::default(), None)
    }
}
