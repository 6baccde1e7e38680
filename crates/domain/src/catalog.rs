//! Well-known metric ids shared by the agent and the stores.

use crate::Metric;

/// Counter incremented once per agent sampling tick.
pub const POLL_COUNT: &str = "PollCount";

/// Gauge set to a fresh random value on every sampling tick.
pub const RANDOM_VALUE: &str = "RandomValue";

/// Every gauge id the agent reports, in reporting order.
pub const KNOWN_GAUGE_IDS: [&str; 28] = [
    "Alloc",
    "BuckHashSys",
    "Frees",
    "GCCPUFraction",
    "GCSys",
    "HeapAlloc",
    "HeapIdle",
    "HeapInuse",
    "HeapObjects",
    "HeapReleased",
    "HeapSys",
    "LastGC",
    "Lookups",
    "MCacheInuse",
    "MCacheSys",
    "MSpanInuse",
    "MSpanSys",
    "Mallocs",
    "NextGC",
    "NumForcedGC",
    "NumGC",
    "OtherSys",
    "PauseTotalNs",
    "StackInuse",
    "StackSys",
    "Sys",
    "TotalAlloc",
    RANDOM_VALUE,
];

/// Zero-valued metrics a fresh store starts with.
#[must_use]
pub fn seed_metrics() -> Vec<Metric> {
    KNOWN_GAUGE_IDS
        .iter()
        .map(|id| Metric::gauge(*id, 0.0))
        .chain(std::iter::once(Metric::counter(POLL_COUNT, 0)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MetricKind;

    #[test]
    fn seed_contains_every_gauge_and_poll_count() {
        let seed = seed_metrics();
        assert_eq!(seed.len(), KNOWN_GAUGE_IDS.len() + 1);
        assert!(
            seed.iter()
                .filter(|metric| metric.kind == MetricKind::Gauge)
                .all(|metric| metric.value == Some(0.0))
        );
        assert!(seed.iter().any(|metric| {
            metric.kind == MetricKind::Counter && &*metric.id == POLL_COUNT && metric.delta == Some(0)
        }));
    }
}
