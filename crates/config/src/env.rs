//! Environment variable parsing for the server and the agent.
//!
//! Parsing is strict: a set-but-invalid value fails fast instead of falling
//! back to a default. Secret values never appear in error metadata.

use crate::duration::parse_duration;
use metricity_shared::{ErrorCode, ErrorEnvelope, REDACTED, SecretString, is_secret_key};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Env var: listen address (server) or collector address (agent).
pub const ENV_ADDRESS: &str = "ADDRESS";
/// Env var: shared HMAC signing key.
pub const ENV_KEY: &str = "KEY";
/// Env var: snapshot save interval.
pub const ENV_STORE_INTERVAL: &str = "STORE_INTERVAL";
/// Env var: snapshot file path.
pub const ENV_STORE_FILE: &str = "STORE_FILE";
/// Env var: restore the snapshot at startup.
pub const ENV_RESTORE: &str = "RESTORE";
/// Env var: database connection string.
pub const ENV_DATABASE_DSN: &str = "DATABASE_DSN";
/// Env var: shutdown drain bound.
pub const ENV_SHUTDOWN_GRACE: &str = "SHUTDOWN_GRACE";
/// Env var: agent sampling interval.
pub const ENV_POLL_INTERVAL: &str = "POLL_INTERVAL";
/// Env var: agent reporting interval.
pub const ENV_REPORT_INTERVAL: &str = "REPORT_INTERVAL";
/// Env var: fallback collector address.
pub const ENV_FALLBACK_ADDRESS: &str = "FALLBACK_ADDRESS";
/// Env var: per-attempt HTTP timeout.
pub const ENV_REQUEST_TIMEOUT: &str = "REQUEST_TIMEOUT";

/// Server settings found in the environment. `None` means "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerEnv {
    /// `ADDRESS`.
    pub address: Option<Box<str>>,
    /// `STORE_INTERVAL`.
    pub store_interval: Option<Duration>,
    /// `STORE_FILE`.
    pub store_file: Option<PathBuf>,
    /// `RESTORE`.
    pub restore: Option<bool>,
    /// `KEY`.
    pub key: Option<SecretString>,
    /// `DATABASE_DSN`.
    pub database_dsn: Option<SecretString>,
    /// `SHUTDOWN_GRACE`.
    pub shutdown_grace: Option<Duration>,
}

impl ServerEnv {
    /// Parse server settings from an env map.
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self, EnvParseError> {
        Ok(Self {
            address: parse_optional_trimmed_string(map, ENV_ADDRESS)?,
            store_interval: parse_optional_duration(map, ENV_STORE_INTERVAL)?,
            store_file: parse_optional_trimmed_string(map, ENV_STORE_FILE)?
                .map(|path| PathBuf::from(path.as_ref())),
            restore: parse_optional_bool(map, ENV_RESTORE)?,
            key: parse_optional_secret(map, ENV_KEY),
            database_dsn: parse_optional_secret(map, ENV_DATABASE_DSN),
            shutdown_grace: parse_optional_duration(map, ENV_SHUTDOWN_GRACE)?,
        })
    }

    /// Parse server settings from the process environment.
    pub fn from_std_env() -> Result<Self, EnvParseError> {
        Self::from_map(&std_env_map())
    }
}

/// Agent settings found in the environment. `None` means "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentEnv {
    /// `ADDRESS`.
    pub address: Option<Box<str>>,
    /// `FALLBACK_ADDRESS`.
    pub fallback_address: Option<Box<str>>,
    /// `POLL_INTERVAL`.
    pub poll_interval: Option<Duration>,
    /// `REPORT_INTERVAL`.
    pub report_interval: Option<Duration>,
    /// `KEY`.
    pub key: Option<SecretString>,
    /// `REQUEST_TIMEOUT`.
    pub request_timeout: Option<Duration>,
}

impl AgentEnv {
    /// Parse agent settings from an env map.
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self, EnvParseError> {
        Ok(Self {
            address: parse_optional_trimmed_string(map, ENV_ADDRESS)?,
            fallback_address: parse_optional_trimmed_string(map, ENV_FALLBACK_ADDRESS)?,
            poll_interval: parse_optional_duration(map, ENV_POLL_INTERVAL)?,
            report_interval: parse_optional_duration(map, ENV_REPORT_INTERVAL)?,
            key: parse_optional_secret(map, ENV_KEY),
            request_timeout: parse_optional_duration(map, ENV_REQUEST_TIMEOUT)?,
        })
    }

    /// Parse agent settings from the process environment.
    pub fn from_std_env() -> Result<Self, EnvParseError> {
        Self::from_map(&std_env_map())
    }
}

fn std_env_map() -> BTreeMap<String, String> {
    std::env::vars().collect()
}

/// Env parsing failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvParseError {
    /// A non-secret env var was set to a blank value.
    EmptyValue {
        /// Env var name.
        var: &'static str,
    },
    /// A boolean env var had an invalid value.
    InvalidBool {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
    /// A duration env var had an invalid value.
    InvalidDuration {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
}

impl EnvParseError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::EmptyValue { .. } => ErrorCode::new("config", "empty_env_var"),
            Self::InvalidBool { .. } => ErrorCode::new("config", "invalid_env_bool"),
            Self::InvalidDuration { .. } => ErrorCode::new("config", "invalid_env_duration"),
        }
    }
}

impl fmt::Display for EnvParseError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyValue { var } => write!(formatter, "{var} must be non-empty"),
            Self::InvalidBool { var, .. } => write!(formatter, "{var} must be a boolean"),
            Self::InvalidDuration { var, .. } => {
                write!(formatter, "{var} must be a duration such as 10, 10s or 500ms")
            },
        }
    }
}

impl std::error::Error for EnvParseError {}

impl From<EnvParseError> for ErrorEnvelope {
    fn from(error: EnvParseError) -> Self {
        let code = error.error_code();
        let message = error.to_string();
        let envelope = Self::expected(code, message);

        match error {
            EnvParseError::EmptyValue { var } => envelope.with_metadata("env_var", var),
            EnvParseError::InvalidBool { var, value }
            | EnvParseError::InvalidDuration { var, value } => envelope
                .with_metadata("env_var", var)
                .with_metadata("value", redact_value(var, &value)),
        }
    }
}

fn parse_optional_trimmed_string(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<Box<str>>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EnvParseError::EmptyValue { var });
    }

    Ok(Some(trimmed.into()))
}

// A blank key or DSN switches the feature off rather than failing startup.
fn parse_optional_secret(map: &BTreeMap<String, String>, var: &'static str) -> Option<SecretString> {
    let trimmed = map.get(var)?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(SecretString::new(trimmed))
}

fn parse_optional_bool(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<bool>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        "" => Err(EnvParseError::EmptyValue { var }),
        _ => Err(EnvParseError::InvalidBool {
            var,
            value: raw.clone(),
        }),
    }
}

fn parse_optional_duration(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<Duration>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };
    if raw.trim().is_empty() {
        return Err(EnvParseError::EmptyValue { var });
    }

    parse_duration(raw)
        .map(Some)
        .ok_or_else(|| EnvParseError::InvalidDuration {
            var,
            value: raw.clone(),
        })
}

fn redact_value(var: &str, value: &str) -> String {
    if is_secret_key(var) {
        REDACTED.to_owned()
    } else {
        value.to_owned()
    }
}
