//! Configuration loading and validation for the secure-api service.
//!
//! All values are read from environment variables at startup. Middleware
//! settings live under the `SECURE_API__` prefix, nested with `__`
//! (`SECURE_API__MODE=SESSION_KEY`,
//! `SECURE_API__DECRYPT_URL__INCLUDE_URLS=/api/**,/v2/**`). The process exits
//! with a clear error message if any value is missing or invalid.

use anyhow::{Context, Result};
use axum::http::HeaderName;
use secure_api_core::SecureApiSettings;
use serde::Deserialize;

use crate::server::middleware::REQUEST_TIMEOUT;

/// Keys whose values are comma-separated lists.
const LIST_KEYS: &[&str] = &[
    "secure_api.encrypt_url.include_urls",
    "secure_api.encrypt_url.exclude_urls",
    "secure_api.decrypt_url.include_urls",
    "secure_api.decrypt_url.exclude_urls",
];

/// Validated service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Port the HTTP server listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// OTLP endpoint of the collector. Spans are only exported when set.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Largest request body read for decryption.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Middleware settings.
    #[serde(default)]
    pub secure_api: SecureApiSettings,
}

fn default_listen_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".into()
}
fn default_request_timeout() -> u64 {
    REQUEST_TIMEOUT.as_secs()
}
fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable cannot be parsed or fails validation.
    pub fn from_env() -> Result<Self> {
        let mut env = config::Environment::default()
            .separator("__")
            .list_separator(",")
            .try_parsing(true);
        for key in LIST_KEYS {
            env = env.with_list_parse_key(key);
        }

        let cfg = config::Config::builder()
            .add_source(env)
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.log_level, "LOG_LEVEL")?;
        if let Some(endpoint) = &self.otel_exporter_otlp_endpoint {
            ensure_non_empty(endpoint, "OTEL_EXPORTER_OTLP_ENDPOINT")?;
        }
        if self.listen_port == 0 {
            anyhow::bail!("LISTEN_PORT must be > 0");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("REQUEST_TIMEOUT_SECS must be > 0");
        }
        if self.max_body_bytes == 0 {
            anyhow::bail!("MAX_BODY_BYTES must be > 0");
        }

        let api = &self.secure_api;
        if api.rsa_key_bits < 1024 {
            anyhow::bail!("SECURE_API__RSA_KEY_BITS must be at least 1024");
        }
        if api.field_workers == 0 {
            anyhow::bail!("SECURE_API__FIELD_WORKERS must be > 0");
        }
        HeaderName::from_bytes(api.session_key_header.as_bytes())
            .context("SECURE_API__SESSION_KEY_HEADER must be a valid header name")?;
        if let Some(field) = &api.response_body_data_field {
            ensure_non_empty(field, "SECURE_API__RESPONSE_BODY_DATA_FIELD")?;
        }
        for (name, patterns) in [
            ("ENCRYPT_URL", &api.encrypt_url),
            ("DECRYPT_URL", &api.decrypt_url),
        ] {
            for pattern in patterns.include_urls.iter().chain(&patterns.exclude_urls) {
                if !pattern.starts_with('/') {
                    anyhow::bail!("SECURE_API__{name} pattern {pattern:?} must start with '/'");
                }
            }
        }
        Ok(())
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}
