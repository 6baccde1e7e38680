//! Metric-level failures and their envelope mapping.

use metricity_shared::{ErrorCode, ErrorEnvelope};
use thiserror::Error;

/// Validation and integrity failures for metrics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetricError {
    /// The metric id is empty after trimming.
    #[error("metric id must be non-empty")]
    EmptyId,
    /// The `type` field is neither `counter` nor `gauge`.
    #[error("unknown metric type {kind:?}")]
    UnknownKind {
        /// Raw kind as received.
        kind: String,
    },
    /// An update carries no value for its kind.
    #[error("metric {id} of type {kind} carries no value")]
    MissingValue {
        /// Metric id.
        id: String,
        /// Declared kind.
        kind: &'static str,
    },
    /// The value field present does not match the kind, or both are present.
    #[error("metric {id} of type {kind} carries a conflicting value field")]
    ConflictingValues {
        /// Metric id.
        id: String,
        /// Declared kind.
        kind: &'static str,
    },
    /// A raw value failed numeric parsing.
    #[error("cannot parse {raw:?} as a {kind} value for metric {id}")]
    ParseValue {
        /// Metric id.
        id: String,
        /// Target kind.
        kind: &'static str,
        /// Raw input.
        raw: String,
    },
    /// The request body is not a well-formed metric document.
    #[error("malformed metric payload: {reason}")]
    Decode {
        /// Decoder message.
        reason: String,
    },
    /// A metric could not be serialized.
    #[error("cannot encode metric payload: {reason}")]
    Encode {
        /// Encoder message.
        reason: String,
    },
    /// The supplied signature does not match the recomputed one.
    #[error("signature mismatch for metric {id}")]
    SignatureMismatch {
        /// Metric id.
        id: String,
    },
    /// Adding a delta would overflow the running total.
    #[error("counter {id} would overflow")]
    CounterOverflow {
        /// Metric id.
        id: String,
    },
    /// The signing key was rejected by the MAC implementation.
    #[error("signing key is unusable")]
    InvalidKey,
}

impl MetricError {
    /// Stable error code for this failure.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        let code = match self {
            Self::EmptyId => "empty_id",
            Self::UnknownKind { .. } => "unknown_kind",
            Self::MissingValue { .. } => "missing_value",
            Self::ConflictingValues { .. } => "conflicting_values",
            Self::ParseValue { .. } => "parse_value",
            Self::Decode { .. } => "decode",
            Self::Encode { .. } => "encode",
            Self::SignatureMismatch { .. } => "signature_mismatch",
            Self::CounterOverflow { .. } => "counter_overflow",
            Self::InvalidKey => "invalid_key",
        };
        ErrorCode::new("metric", code)
    }
}

impl From<MetricError> for ErrorEnvelope {
    fn from(error: MetricError) -> Self {
        let envelope = if matches!(error, MetricError::InvalidKey | MetricError::Encode { .. }) {
            Self::invariant(error.error_code(), error.to_string())
        } else {
            Self::expected(error.error_code(), error.to_string())
        };

        match error {
            MetricError::UnknownKind { kind } => envelope.with_metadata("kind", kind),
            MetricError::MissingValue { id, kind } | MetricError::ConflictingValues { id, kind } => {
                envelope.with_metadata("id", id).with_metadata("kind", kind)
            },
            MetricError::ParseValue { id, kind, raw } => envelope
                .with_metadata("id", id)
                .with_metadata("kind", kind)
                .with_metadata("raw", raw),
            MetricError::SignatureMismatch { id } | MetricError::CounterOverflow { id } => {
                envelope.with_metadata("id", id)
            },
            MetricError::EmptyId
            | MetricError::Decode { .. }
            | MetricError::Encode { .. }
            | MetricError::InvalidKey => envelope,
        }
    }
}
