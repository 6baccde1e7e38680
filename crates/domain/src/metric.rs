//! The metric record and its JSON wire form.

use crate::MetricError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two metric kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Cumulative running total; updates add.
    Counter,
    /// Point-in-time reading; updates replace.
    Gauge,
}

impl MetricKind {
    /// Parse the wire spelling (`counter` or `gauge`).
    pub fn parse(input: &str) -> Result<Self, MetricError> {
        match input {
            "counter" => Ok(Self::Counter),
            "gauge" => Ok(Self::Gauge),
            other => Err(MetricError::UnknownKind {
                kind: other.to_owned(),
            }),
        }
    }

    /// Wire spelling of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// One metric as exchanged on the wire and persisted in snapshots.
///
/// `delta` is populated for counters and `value` for gauges. Read requests
/// carry neither; update requests must carry exactly the one matching `kind`
/// (see [`Metric::validate_for_update`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Identity within the kind's namespace.
    pub id: Box<str>,
    /// Counter or gauge.
    #[serde(rename = "type")]
    pub kind: MetricKind,
    /// Counter increment (or running total in responses and snapshots).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    /// Gauge reading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    /// Hex HMAC-SHA256 over the canonical form, when a key is configured.
    #[serde(rename = "hash", default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Box<str>>,
}

impl Metric {
    /// Build a counter metric carrying `delta`.
    pub fn counter(id: impl Into<Box<str>>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Counter,
            delta: Some(delta),
            value: None,
            signature: None,
        }
    }

    /// Build a gauge metric carrying `value`.
    pub fn gauge(id: impl Into<Box<str>>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(value),
            signature: None,
        }
    }

    /// Build a value-less query for `id` of `kind`.
    pub fn query(id: impl Into<Box<str>>, kind: MetricKind) -> Self {
        Self {
            id: id.into(),
            kind,
            delta: None,
            value: None,
            signature: None,
        }
    }

    /// Check the field-shape invariant without requiring a value.
    pub fn validate_shape(&self) -> Result<(), MetricError> {
        if self.id.trim().is_empty() {
            return Err(MetricError::EmptyId);
        }
        let conflicting = match self.kind {
            MetricKind::Counter => self.value.is_some(),
            MetricKind::Gauge => self.delta.is_some(),
        };
        if conflicting {
            return Err(MetricError::ConflictingValues {
                id: self.id.to_string(),
                kind: self.kind.as_str(),
            });
        }
        Ok(())
    }

    /// Check that the metric is usable as an update: well-shaped, with a
    /// finite value for its kind.
    pub fn validate_for_update(&self) -> Result<(), MetricError> {
        self.validate_shape()?;
        match self.kind {
            MetricKind::Counter if self.delta.is_none() => Err(self.missing_value()),
            MetricKind::Gauge => match self.value {
                None => Err(self.missing_value()),
                Some(value) if !value.is_finite() => Err(MetricError::ParseValue {
                    id: self.id.to_string(),
                    kind: MetricKind::Gauge.as_str(),
                    raw: value.to_string(),
                }),
                Some(_) => Ok(()),
            },
            MetricKind::Counter => Ok(()),
        }
    }

    /// Render the carried value as the plain-text scalar used by path reads.
    #[must_use]
    pub fn raw_value(&self) -> Option<String> {
        match self.kind {
            MetricKind::Counter => self.delta.map(|delta| delta.to_string()),
            MetricKind::Gauge => self.value.map(format_gauge),
        }
    }

    fn missing_value(&self) -> MetricError {
        MetricError::MissingValue {
            id: self.id.to_string(),
            kind: self.kind.as_str(),
        }
    }
}

/// Parse a raw gauge value. Non-numeric and non-finite input is rejected.
pub fn parse_gauge(id: &str, raw: &str) -> Result<f64, MetricError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| MetricError::ParseValue {
            id: id.to_owned(),
            kind: MetricKind::Gauge.as_str(),
            raw: raw.to_owned(),
        })
}

/// Parse a raw counter delta as a signed 64-bit integer.
pub fn parse_counter(id: &str, raw: &str) -> Result<i64, MetricError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| MetricError::ParseValue {
            id: id.to_owned(),
            kind: MetricKind::Counter.as_str(),
            raw: raw.to_owned(),
        })
}

/// Plain decimal form that round-trips through [`parse_gauge`].
#[must_use]
pub fn format_gauge(value: f64) -> String {
    value.to_string()
}

/// Add `delta` to `total`, rejecting overflow.
pub fn accumulate(id: &str, total: i64, delta: i64) -> Result<i64, MetricError> {
    total
        .checked_add(delta)
        .ok_or_else(|| MetricError::CounterOverflow { id: id.to_owned() })
}

/// Decode a single metric document.
pub fn decode_metric(body: &[u8]) -> Result<Metric, MetricError> {
    let wire: WireMetric = serde_json::from_slice(body).map_err(decode_error)?;
    wire.try_into()
}

/// Decode a JSON array of metric documents.
pub fn decode_batch(body: &[u8]) -> Result<Vec<Metric>, MetricError> {
    let wire: Vec<WireMetric> = serde_json::from_slice(body).map_err(decode_error)?;
    wire.into_iter().map(Metric::try_from).collect()
}

/// Encode one metric as compact JSON.
pub fn encode_metric(metric: &Metric) -> Result<Vec<u8>, MetricError> {
    serde_json::to_vec(metric).map_err(encode_error)
}

/// Encode a batch as a compact JSON array.
pub fn encode_batch(metrics: &[Metric]) -> Result<Vec<u8>, MetricError> {
    serde_json::to_vec(metrics).map_err(encode_error)
}

fn encode_error(error: serde_json::Error) -> MetricError {
    MetricError::Encode {
        reason: error.to_string(),
    }
}

fn decode_error(error: serde_json::Error) -> MetricError {
    MetricError::Decode {
        reason: error.to_string(),
    }
}

/// Inbound shape with a free-form `type`, so unknown kinds surface as
/// [`MetricError::UnknownKind`] rather than a generic decode failure.
#[derive(Deserialize)]
struct WireMetric {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<i64>,
    #[serde(default)]
    value: Option<f64>,
    #[serde(default)]
    hash: Option<String>,
}

impl TryFrom<WireMetric> for Metric {
    type Error = MetricError;

    fn try_from(wire: WireMetric) -> Result<Self, Self::Error> {
        let metric = Self {
            id: wire.id.into_boxed_str(),
            kind: MetricKind::parse(&wire.kind)?,
            delta: wire.delta,
            value: wire.value,
            signature: wire.hash.map(String::into_boxed_str),
        };
        metric.validate_shape()?;
        Ok(metric)
    }
}
