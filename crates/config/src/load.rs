//! Config loading: defaults, then command-line overrides, then environment.
//!
//! The loader owns the merge order and surfaces every failure as a typed
//! `ErrorEnvelope`.

use crate::env::{AgentEnv, ServerEnv};
use crate::schema::{AgentConfig, ServerConfig};
use metricity_shared::{ErrorEnvelope, SecretString};
use std::path::PathBuf;
use std::time::Duration;

/// Server settings given on the command line. `None` means "not given".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerOverrides {
    /// `-a`.
    pub address: Option<Box<str>>,
    /// `-i`.
    pub store_interval: Option<Duration>,
    /// `-f`.
    pub store_file: Option<PathBuf>,
    /// `-r`.
    pub restore: Option<bool>,
    /// `-k`.
    pub key: Option<SecretString>,
    /// `-d`.
    pub database_dsn: Option<SecretString>,
}

/// Agent settings given on the command line. `None` means "not given".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentOverrides {
    /// `-a`.
    pub address: Option<Box<str>>,
    /// `--fallback`.
    pub fallback_address: Option<Box<str>>,
    /// `-p`.
    pub poll_interval: Option<Duration>,
    /// `-r`.
    pub report_interval: Option<Duration>,
    /// `-k`.
    pub key: Option<SecretString>,
}

/// Build the server config.
///
/// Precedence (highest wins):
/// - env (`ServerEnv`)
/// - command-line overrides
/// - defaults (`ServerConfig::default()`)
pub fn load_server_config(
    overrides: &ServerOverrides,
    env: &ServerEnv,
) -> Result<ServerConfig, ErrorEnvelope> {
    let mut config = ServerConfig::default();

    set(&mut config.address, overrides.address.clone());
    set(&mut config.store_interval, overrides.store_interval);
    set_some(&mut config.store_file, overrides.store_file.clone());
    set(&mut config.restore, overrides.restore);
    set_some(&mut config.key, overrides.key.clone());
    set_some(&mut config.database_dsn, overrides.database_dsn.clone());

    set(&mut config.address, env.address.clone());
    set(&mut config.store_interval, env.store_interval);
    set_some(&mut config.store_file, env.store_file.clone());
    set(&mut config.restore, env.restore);
    set_some(&mut config.key, env.key.clone());
    set_some(&mut config.database_dsn, env.database_dsn.clone());
    set(&mut config.shutdown_grace, env.shutdown_grace);

    config.validate()?;
    Ok(config)
}

/// Build the server config from command-line overrides and the process env.
pub fn load_server_config_std_env(
    overrides: &ServerOverrides,
) -> Result<ServerConfig, ErrorEnvelope> {
    let env = ServerEnv::from_std_env()?;
    load_server_config(overrides, &env)
}

/// Build the agent config.
///
/// Precedence (highest wins):
/// - env (`AgentEnv`)
/// - command-line overrides
/// - defaults (`AgentConfig::default()`)
pub fn load_agent_config(
    overrides: &AgentOverrides,
    env: &AgentEnv,
) -> Result<AgentConfig, ErrorEnvelope> {
    let mut config = AgentConfig::default();

    set(&mut config.address, overrides.address.clone());
    set_some(&mut config.fallback_address, overrides.fallback_address.clone());
    set(&mut config.poll_interval, overrides.poll_interval);
    set(&mut config.report_interval, overrides.report_interval);
    set_some(&mut config.key, overrides.key.clone());

    set(&mut config.address, env.address.clone());
    set_some(&mut config.fallback_address, env.fallback_address.clone());
    set(&mut config.poll_interval, env.poll_interval);
    set(&mut config.report_interval, env.report_interval);
    set_some(&mut config.key, env.key.clone());
    set(&mut config.request_timeout, env.request_timeout);

    config.validate()?;
    Ok(config)
}

/// Build the agent config from command-line overrides and the process env.
pub fn load_agent_config_std_env(overrides: &AgentOverrides) -> Result<AgentConfig, ErrorEnvelope> {
    let env = AgentEnv::from_std_env()?;
    load_agent_config(overrides, &env)
}

fn set<T>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

fn set_some<T>(field: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *field = value;
    }
}
