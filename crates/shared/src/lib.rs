//! # metricity-shared
//!
//! Foundational types used by every other metricity crate:
//!
//! - `ErrorEnvelope` and the workspace `Result` alias
//! - `RequestContext` with cooperative cancellation
//! - bounded retry and timeout helpers
//! - `SecretString` for signing keys and connection strings
//!
//! This crate has no workspace dependencies.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod context;
pub mod errors;
pub mod redaction;
pub mod result;
pub mod retry;
pub mod timeout;

pub use context::{CancellationToken, CorrelationId, RequestContext};
pub use errors::{ErrorClass, ErrorCode, ErrorEnvelope, ErrorKind, unexpected_from};
pub use redaction::{REDACTED, SecretString, is_secret_key};
pub use result::Result;
pub use retry::{RetryPolicy, retry_async_with_observer};
pub use timeout::timeout_detached;

/// Returns the shared crate version.
#[must_use]
pub const fn shared_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
