//! Integration coverage for the metric wire format and its error mapping.

use metricity_domain::{
    Metric, MetricError, MetricKind, decode_batch, decode_metric, encode_batch, encode_metric,
};
use metricity_shared::{ErrorEnvelope, ErrorKind};

#[test]
fn decodes_counter_and_gauge_documents() -> Result<(), MetricError> {
    let counter = decode_metric(br#"{"id":"Requests","type":"counter","delta":5}"#)?;
    assert_eq!(counter, Metric::counter("Requests", 5));

    let gauge = decode_metric(br#"{"id":"Temp","type":"gauge","value":2.75,"hash":"ab"}"#)?;
    assert_eq!(gauge.kind, MetricKind::Gauge);
    assert_eq!(gauge.value, Some(2.75));
    assert_eq!(gauge.signature.as_deref(), Some("ab"));

    let query = decode_metric(br#"{"id":"Temp","type":"gauge"}"#)?;
    assert_eq!(query, Metric::query("Temp", MetricKind::Gauge));
    Ok(())
}

#[test]
fn rejects_kind_and_field_mismatches() {
    assert!(matches!(
        decode_metric(br#"{"id":"Temp","type":"histogram","value":1}"#),
        Err(MetricError::UnknownKind { .. })
    ));
    assert!(matches!(
        decode_metric(br#"{"id":"Temp","type":"gauge","delta":1}"#),
        Err(MetricError::ConflictingValues { .. })
    ));
    assert!(matches!(
        decode_metric(br#"{"id":"Requests","type":"counter","delta":1.5}"#),
        Err(MetricError::Decode { .. })
    ));
    assert!(matches!(decode_metric(b"not json"), Err(MetricError::Decode { .. })));
}

#[test]
fn decode_errors_become_expected_envelopes() {
    let Err(error) = decode_metric(br#"{"id":"Temp","type":"histogram"}"#) else {
        panic!("unknown kind must fail");
    };
    let envelope: ErrorEnvelope = error.into();
    assert_eq!(envelope.kind, ErrorKind::Expected);
    assert!(envelope.code.is("metric", "unknown_kind"));
    assert_eq!(
        envelope.metadata.get("kind").map(String::as_str),
        Some("histogram")
    );
}

#[test]
fn batch_encoding_omits_absent_fields() -> Result<(), MetricError> {
    let batch = vec![Metric::gauge("Temp", 1.5), Metric::counter("PollCount", 3)];
    let encoded = String::from_utf8(encode_batch(&batch)?).unwrap_or_default();
    assert_eq!(
        encoded,
        r#"[{"id":"Temp","type":"gauge","value":1.5},{"id":"PollCount","type":"counter","delta":3}]"#
    );
    assert_eq!(decode_batch(encoded.as_bytes())?, batch);

    let single = encode_metric(&Metric::counter("Requests", 8))?;
    assert_eq!(single, br#"{"id":"Requests","type":"counter","delta":8}"#);
    Ok(())
}

#[test]
fn one_bad_entry_fails_the_whole_batch_decode() {
    let body = br#"[{"id":"Temp","type":"gauge","value":1},{"id":"X","type":"nope"}]"#;
    assert!(matches!(
        decode_batch(body),
        Err(MetricError::UnknownKind { .. })
    ));
}
