//! Configuration schema for the collector server and the agent.

use crate::duration::format_duration;
use metricity_shared::{ErrorCode, ErrorEnvelope, SecretString};
use serde_json::{Value, json};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Default listen/target address.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:8080";
/// Default snapshot save interval.
pub const DEFAULT_STORE_INTERVAL: Duration = Duration::from_secs(300);
/// Default snapshot file.
pub const DEFAULT_STORE_FILE: &str = "/tmp/devops-metrics-db.json";
/// Default bound on draining in-flight requests at shutdown.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(15);
/// Default agent sampling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Default agent reporting interval.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(10);
/// Default per-attempt HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Attempts against the primary collector (one try plus three retries).
pub const DEFAULT_PRIMARY_ATTEMPTS: u32 = 4;
/// Fixed delay between primary attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Collector server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listen address (`host:port`).
    pub address: Box<str>,
    /// Snapshot save interval; zero means save on every write.
    pub store_interval: Duration,
    /// Snapshot file path; `None` disables file persistence.
    pub store_file: Option<PathBuf>,
    /// Replay the snapshot into the store at startup.
    pub restore: bool,
    /// Shared HMAC key; `None` disables signature checks.
    pub key: Option<SecretString>,
    /// Database DSN; presence selects the relational store.
    pub database_dsn: Option<SecretString>,
    /// Bound on draining in-flight requests at shutdown.
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.into(),
            store_interval: DEFAULT_STORE_INTERVAL,
            store_file: Some(PathBuf::from(DEFAULT_STORE_FILE)),
            restore: true,
            key: None,
            database_dsn: None,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

/// Which store backs the server, derived from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageSelection {
    /// SQL database reachable through the DSN.
    Relational {
        /// Connection string.
        dsn: SecretString,
    },
    /// In-memory store mirrored to a snapshot file.
    File {
        /// Snapshot path.
        path: PathBuf,
        /// Save interval; zero means save on every write.
        interval: Duration,
        /// Replay the snapshot at startup.
        restore: bool,
    },
    /// In-memory store without persistence.
    Memory,
}

impl ServerConfig {
    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigSchemaError> {
        require_address("address", &self.address)?;
        if self.shutdown_grace.is_zero() {
            return Err(ConfigSchemaError::ZeroDuration {
                field: "shutdown_grace",
            });
        }
        Ok(())
    }

    /// Pick the store backend: a DSN wins, then a snapshot file, then memory.
    #[must_use]
    pub fn storage(&self) -> StorageSelection {
        if let Some(dsn) = &self.database_dsn {
            return StorageSelection::Relational { dsn: dsn.clone() };
        }
        match &self.store_file {
            Some(path) => StorageSelection::File {
                path: path.clone(),
                interval: self.store_interval,
                restore: self.restore,
            },
            None => StorageSelection::Memory,
        }
    }

    /// Effective configuration with secrets redacted, for startup logs.
    #[must_use]
    pub fn to_redacted_json(&self) -> Value {
        json!({
            "address": self.address,
            "store_interval": format_duration(self.store_interval),
            "store_file": self.store_file.as_ref().map(|path| path.display().to_string()),
            "restore": self.restore,
            "key": self.key.as_ref().map(ToString::to_string),
            "database_dsn": self.database_dsn.as_ref().map(ToString::to_string),
            "shutdown_grace": format_duration(self.shutdown_grace),
        })
    }
}

/// Agent configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Primary collector address (`host:port` or a full URL).
    pub address: Box<str>,
    /// Collector tried once after the primary's retries are spent.
    pub fallback_address: Option<Box<str>>,
    /// Sampling interval.
    pub poll_interval: Duration,
    /// Reporting interval.
    pub report_interval: Duration,
    /// Shared HMAC key; `None` disables signing.
    pub key: Option<SecretString>,
    /// Per-attempt HTTP timeout.
    pub request_timeout: Duration,
    /// Attempts against the primary collector.
    pub primary_attempts: u32,
    /// Fixed delay between primary attempts.
    pub retry_delay: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.into(),
            fallback_address: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            report_interval: DEFAULT_REPORT_INTERVAL,
            key: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            primary_attempts: DEFAULT_PRIMARY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl AgentConfig {
    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigSchemaError> {
        collector_url("address", &self.address)?;
        if let Some(fallback) = &self.fallback_address {
            collector_url("fallback_address", fallback)?;
        }
        for (field, value) in [
            ("poll_interval", self.poll_interval),
            ("report_interval", self.report_interval),
            ("request_timeout", self.request_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigSchemaError::ZeroDuration { field });
            }
        }
        if self.primary_attempts == 0 {
            return Err(ConfigSchemaError::ZeroAttempts);
        }
        Ok(())
    }

    /// Base URL of the primary collector.
    pub fn primary_url(&self) -> Result<Url, ConfigSchemaError> {
        collector_url("address", &self.address)
    }

    /// Base URL of the fallback collector, if configured.
    pub fn fallback_url(&self) -> Result<Option<Url>, ConfigSchemaError> {
        self.fallback_address
            .as_deref()
            .map(|address| collector_url("fallback_address", address))
            .transpose()
    }

    /// Effective configuration with secrets redacted, for startup logs.
    #[must_use]
    pub fn to_redacted_json(&self) -> Value {
        json!({
            "address": self.address,
            "fallback_address": self.fallback_address,
            "poll_interval": format_duration(self.poll_interval),
            "report_interval": format_duration(self.report_interval),
            "key": self.key.as_ref().map(ToString::to_string),
            "request_timeout": format_duration(self.request_timeout),
            "primary_attempts": self.primary_attempts,
            "retry_delay": format_duration(self.retry_delay),
        })
    }
}

/// Turn `host:port` (or an `http(s)://` URL) into a collector base URL.
pub fn collector_url(field: &'static str, address: &str) -> Result<Url, ConfigSchemaError> {
    let trimmed = require_address(field, address)?;
    let candidate = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_owned()
    } else {
        format!("http://{trimmed}/")
    };
    let url = Url::parse(&candidate).map_err(|_| ConfigSchemaError::InvalidAddress {
        field,
        value: address.to_owned(),
    })?;
    if url.host_str().is_none() {
        return Err(ConfigSchemaError::InvalidAddress {
            field,
            value: address.to_owned(),
        });
    }
    Ok(url)
}

fn require_address<'a>(field: &'static str, address: &'a str) -> Result<&'a str, ConfigSchemaError> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(ConfigSchemaError::EmptyAddress { field });
    }
    Ok(trimmed)
}

/// Schema-level validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSchemaError {
    /// An address field is blank.
    EmptyAddress {
        /// Field name.
        field: &'static str,
    },
    /// An address cannot be turned into a URL.
    InvalidAddress {
        /// Field name.
        field: &'static str,
        /// Raw value.
        value: String,
    },
    /// An interval or timeout that must be positive is zero.
    ZeroDuration {
        /// Field name.
        field: &'static str,
    },
    /// The primary attempt budget is zero.
    ZeroAttempts,
}

impl fmt::Display for ConfigSchemaError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyAddress { field } => write!(formatter, "{field} must be non-empty"),
            Self::InvalidAddress { field, value } => {
                write!(formatter, "{field} is not a valid address: {value}")
            },
            Self::ZeroDuration { field } => write!(formatter, "{field} must be greater than zero"),
            Self::ZeroAttempts => formatter.write_str("primary_attempts must be at least 1"),
        }
    }
}

impl std::error::Error for ConfigSchemaError {}

impl From<ConfigSchemaError> for ErrorEnvelope {
    fn from(error: ConfigSchemaError) -> Self {
        let message = error.to_string();
        let envelope = Self::expected(ErrorCode::new("config", "invalid_config"), message);
        match error {
            ConfigSchemaError::EmptyAddress { field } | ConfigSchemaError::ZeroDuration { field } => {
                envelope.with_metadata("field", field)
            },
            ConfigSchemaError::InvalidAddress { field, value } => envelope
                .with_metadata("field", field)
                .with_metadata("value", value),
            ConfigSchemaError::ZeroAttempts => envelope.with_metadata("field", "primary_attempts"),
        }
    }
}
