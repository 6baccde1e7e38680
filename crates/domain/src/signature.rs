//! HMAC-SHA256 metric signatures.
//!
//! The signed message is a canonical string: `{id}:counter:{delta}` for
//! counters and `{id}:gauge:{value}` for gauges, with the gauge rendered
//! using exactly six fractional digits.

use crate::{Metric, MetricError, MetricKind};
use hmac::{Hmac, Mac};
use metricity_shared::SecretString;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Build the canonical message for a metric carrying a value.
pub fn canonical_message(metric: &Metric) -> Result<String, MetricError> {
    metric.validate_for_update()?;
    match (metric.kind, metric.delta, metric.value) {
        (MetricKind::Counter, Some(delta), _) => Ok(format!("{}:counter:{delta}", metric.id)),
        (MetricKind::Gauge, _, Some(value)) => Ok(format!("{}:gauge:{value:.6}", metric.id)),
        _ => Err(MetricError::MissingValue {
            id: metric.id.to_string(),
            kind: metric.kind.as_str(),
        }),
    }
}

/// Compute the hex signature for a metric.
pub fn sign(metric: &Metric, key: &SecretString) -> Result<String, MetricError> {
    let mut mac = keyed_mac(key)?;
    mac.update(canonical_message(metric)?.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Replace the metric's signature with a freshly computed one.
pub fn attach_signature(metric: &mut Metric, key: &SecretString) -> Result<(), MetricError> {
    metric.signature = Some(sign(metric, key)?.into_boxed_str());
    Ok(())
}

/// Verify the carried signature in constant time.
///
/// A missing or non-hex signature is a mismatch.
pub fn verify(metric: &Metric, key: &SecretString) -> Result<(), MetricError> {
    let mismatch = || MetricError::SignatureMismatch {
        id: metric.id.to_string(),
    };
    let supplied = metric
        .signature
        .as_deref()
        .and_then(|signature| hex::decode(signature.trim()).ok())
        .ok_or_else(mismatch)?;

    let mut mac = keyed_mac(key)?;
    mac.update(canonical_message(metric)?.as_bytes());
    mac.verify_slice(&supplied).map_err(|_| mismatch())
}

fn keyed_mac(key: &SecretString) -> Result<HmacSha256, MetricError> {
    HmacSha256::new_from_slice(key.expose_bytes()).map_err(|_| MetricError::InvalidKey)
}
