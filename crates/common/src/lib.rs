//! Wire types and errors shared across the `secure-api` crates.

pub mod error;
pub mod protocol;

pub use error::ServiceError;
pub use protocol::{ApiResult, ErrorResponse, HealthResponse};
