//! # metricity-ports
//!
//! Port traits for the metricity hexagonal architecture.
//!
//! This crate defines the interfaces between the application layer and
//! infrastructure: metric stores, snapshot files, runtime statistics,
//! delivery transports and logging. It depends only on `domain` and `shared`.

use std::future::Future;
use std::pin::Pin;

/// Boxed future used by port traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Returns the ports crate version.
#[must_use]
pub const fn ports_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub mod logger;
pub mod snapshot;
pub mod stats;
pub mod store;
pub mod transport;

pub use logger::*;
pub use snapshot::*;
pub use stats::*;
pub use store::*;
pub use transport::*;

// Re-export the domain types used in port signatures.
pub use metricity_domain::{Metric, MetricKind, RuntimeStats};
