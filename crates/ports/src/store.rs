//! Metric store boundary contract.

use crate::BoxFuture;
use metricity_domain::{Metric, MetricKind};
use metricity_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::fmt;

/// Which backend holds live state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreVariant {
    /// Process memory only.
    Memory,
    /// Process memory mirrored to a snapshot file.
    File,
    /// A SQL database.
    Relational,
}

impl StoreVariant {
    /// Stable lowercase name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File => "file",
            Self::Relational => "relational",
        }
    }
}

/// Boundary contract for the current-value metric store.
///
/// Counters and gauges live in separate namespaces, so the same id may exist
/// once per kind. Raw values are the textual form received from clients.
pub trait MetricStore: Send + Sync {
    /// Backend identity.
    fn variant(&self) -> StoreVariant;

    /// Replace a gauge with the parsed `raw` value.
    fn update_gauge(
        &self,
        ctx: &RequestContext,
        id: Box<str>,
        raw: Box<str>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Add the parsed `raw` delta to a counter and return the new total.
    fn update_counter(
        &self,
        ctx: &RequestContext,
        id: Box<str>,
        raw: Box<str>,
    ) -> BoxFuture<'_, Result<i64>>;

    /// Apply every update or none of them.
    fn update_batch(&self, ctx: &RequestContext, metrics: Vec<Metric>)
    -> BoxFuture<'_, Result<()>>;

    /// Read a gauge as its plain-text value.
    fn get_gauge(&self, ctx: &RequestContext, id: Box<str>) -> BoxFuture<'_, Result<String>>;

    /// Read a counter total as its plain-text value.
    fn get_counter(&self, ctx: &RequestContext, id: Box<str>) -> BoxFuture<'_, Result<String>>;

    /// Snapshot every gauge. Order is unspecified.
    fn all_gauges(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<Metric>>>;

    /// Snapshot every counter. Order is unspecified.
    fn all_counters(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<Metric>>>;

    /// Liveness probe.
    fn ping(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<()>>;
}

/// Store-level failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The id is absent from the kind's namespace.
    NotFound {
        /// Namespace searched.
        kind: MetricKind,
        /// Requested id.
        id: String,
    },
    /// Snapshot file I/O failed.
    Persistence {
        /// Underlying failure.
        message: String,
    },
    /// The database rejected a statement or the connection failed.
    Database {
        /// Underlying failure.
        message: String,
    },
}

impl StoreError {
    /// Convenience constructor for a missing id.
    pub fn not_found(kind: MetricKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Convenience constructor for database failures.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Convenience constructor for snapshot failures.
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::new("store", "not_found"),
            Self::Persistence { .. } => ErrorCode::new("store", "persistence"),
            Self::Database { .. } => ErrorCode::new("store", "database"),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { kind, id } => write!(formatter, "{kind} {id} not found"),
            Self::Persistence { message } => write!(formatter, "snapshot persistence failed: {message}"),
            Self::Database { message } => write!(formatter, "database operation failed: {message}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<StoreError> for ErrorEnvelope {
    fn from(error: StoreError) -> Self {
        let code = error.error_code();
        let message = error.to_string();
        match error {
            StoreError::NotFound { kind, id } => Self::expected(code, message)
                .with_metadata("kind", kind.as_str())
                .with_metadata("id", id),
            StoreError::Persistence { .. } | StoreError::Database { .. } => {
                Self::unexpected(code, message, ErrorClass::NonRetriable)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metricity_shared::ErrorKind;

    #[test]
    fn not_found_maps_to_expected_envelope() {
        let envelope = ErrorEnvelope::from(StoreError::not_found(MetricKind::Gauge, "Temp"));
        assert_eq!(envelope.kind, ErrorKind::Expected);
        assert!(envelope.code.is("store", "not_found"));
        assert_eq!(envelope.message, "gauge Temp not found");
        assert_eq!(envelope.metadata.get("id").map(String::as_str), Some("Temp"));
    }

    #[test]
    fn backend_failures_are_unexpected() {
        let envelope = ErrorEnvelope::from(StoreError::database("connection reset"));
        assert_eq!(envelope.kind, ErrorKind::Unexpected);
        assert!(envelope.code.is("store", "database"));
        assert_eq!(StoreVariant::Relational.as_str(), "relational");
    }
}
