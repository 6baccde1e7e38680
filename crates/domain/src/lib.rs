//! # metricity-domain
//!
//! The metric model with no infrastructure dependencies:
//!
//! - **Metric** - `Metric`, `MetricKind`, wire decode/encode, value parsing
//! - **Signature** - HMAC-SHA256 over the canonical `id:kind:value` form
//! - **Catalog** - known runtime gauge ids and the `PollCount` counter
//! - **Runtime** - `RuntimeStats` and its explicit gauge accessor table
//!
//! ## Dependency Rules
//!
//! - Depends only on the `shared` crate
//! - No I/O

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod catalog;
pub mod error;
pub mod metric;
pub mod runtime;
pub mod signature;

pub use catalog::{KNOWN_GAUGE_IDS, POLL_COUNT, RANDOM_VALUE, seed_metrics};
pub use error::MetricError;
pub use metric::{
    Metric, MetricKind, accumulate, decode_batch, decode_metric, encode_batch, encode_metric,
    format_gauge, parse_counter, parse_gauge,
};
pub use runtime::{RUNTIME_GAUGES, RuntimeGauge, RuntimeStats, runtime_gauge};
pub use signature::{attach_signature, canonical_message, sign, verify};

/// Returns the domain crate version.
#[must_use]
pub const fn domain_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
