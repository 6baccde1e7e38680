//! # metricity-config
//!
//! Configuration schema, env parsing and the defaults < flags < env merge for
//! the collector server and the agent. This crate depends on `shared` only.

/// Duration parsing and formatting.
pub mod duration;
/// Environment variable parsing.
pub mod env;
/// Config loading helpers (defaults + overrides + env).
pub mod load;
/// Configuration schema types and validation.
pub mod schema;

pub use duration::{format_duration, parse_duration};
pub use env::{AgentEnv, EnvParseError, ServerEnv};
pub use load::{
    AgentOverrides, ServerOverrides, load_agent_config, load_agent_config_std_env,
    load_server_config, load_server_config_std_env,
};
pub use schema::{
    AgentConfig, ConfigSchemaError, DEFAULT_ADDRESS, DEFAULT_POLL_INTERVAL,
    DEFAULT_PRIMARY_ATTEMPTS, DEFAULT_REPORT_INTERVAL, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_RETRY_DELAY, DEFAULT_SHUTDOWN_GRACE, DEFAULT_STORE_FILE, DEFAULT_STORE_INTERVAL,
    ServerConfig, StorageSelection, collector_url,
};

/// Returns the config crate version.
#[must_use]
pub const fn config_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
