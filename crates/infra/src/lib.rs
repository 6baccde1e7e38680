//! # metricity-infra
//!
//! Infrastructure wiring and runtime composition.
//! This crate depends on `app`, `adapters`, `config`, and `shared`.

/// Agent composition.
mod agent_factory;
/// Tracing subscriber setup.
pub mod logging;
/// Shutdown signal helpers.
pub mod shutdown;
/// Store selection and server runtime composition.
mod store_factory;

pub use agent_factory::build_agent;
pub use logging::{LogFormat, init_tracing};
pub use shutdown::{cancel_on, shutdown_signal};
pub use store_factory::{BuiltStore, ServerRuntime, build_server_runtime, build_store};

/// Infra-level error type (shared error envelope).
pub type InfraError = metricity_shared::ErrorEnvelope;

/// Infra-level result type.
pub type InfraResult<T> = Result<T, InfraError>;

/// Returns the infra crate version.
#[must_use]
pub const fn infra_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
