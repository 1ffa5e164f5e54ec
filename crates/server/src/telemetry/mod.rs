//! Tracing setup: structured JSON logs plus optional OTLP span export.
//!
//! # Telemetry invariants
//!
//! - Key material never appears in span attributes or log fields, with the
//!   exception of generate-if-absent notices, which exist to hand freshly
//!   generated keys to the operator.
//! - Plaintext and ciphertext are only logged when `SECURE_API__SHOW_LOG` is on.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`), and
//!   `RUST_LOG` overrides it.

pub mod init;

pub use init::init_telemetry;
