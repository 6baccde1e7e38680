//! The agent's sample set.

use metricity_domain::{KNOWN_GAUGE_IDS, Metric, POLL_COUNT, RANDOM_VALUE, RuntimeStats, runtime_gauge};
use std::collections::BTreeMap;

/// Latest gauge readings plus the number of samples taken.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSet {
    gauges: BTreeMap<&'static str, f64>,
    poll_count: i64,
}

impl SampleSet {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one sample.
    ///
    /// Every tracked gauge with an accessor is overwritten, `RandomValue` is
    /// set to `random_value` and the poll count grows by one.
    pub fn record(&mut self, stats: &RuntimeStats, random_value: f64) {
        for name in KNOWN_GAUGE_IDS {
            if let Some(gauge) = runtime_gauge(name) {
                self.gauges.insert(gauge.name, (gauge.read)(stats));
            }
        }
        self.gauges.insert(RANDOM_VALUE, random_value);
        self.poll_count = self.poll_count.saturating_add(1);
    }

    /// Number of samples recorded so far.
    #[must_use]
    pub const fn poll_count(&self) -> i64 {
        self.poll_count
    }

    /// Latest reading of a gauge.
    #[must_use]
    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.gauges.get(name).copied()
    }

    /// Every gauge plus the `PollCount` counter, as one unsigned batch.
    #[must_use]
    pub fn to_batch(&self) -> Vec<Metric> {
        let mut batch: Vec<Metric> = self
            .gauges
            .iter()
            .map(|(name, value)| Metric::gauge(*name, *value))
            .collect();
        batch.push(Metric::counter(POLL_COUNT, self.poll_count));
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metricity_domain::MetricKind;

    #[test]
    fn empty_set_reports_only_poll_count() {
        let batch = SampleSet::new().to_batch();
        assert_eq!(batch, vec![Metric::counter(POLL_COUNT, 0)]);
    }

    #[test]
    fn each_record_updates_every_known_gauge() {
        let mut samples = SampleSet::new();
        let stats = RuntimeStats {
            heap_alloc: 2048,
            num_gc: 7,
            ..RuntimeStats::default()
        };

        samples.record(&stats, 0.25);
        samples.record(&stats, 0.5);

        assert_eq!(samples.poll_count(), 2);
        assert_eq!(samples.gauge("HeapAlloc"), Some(2048.0));
        assert_eq!(samples.gauge("NumGC"), Some(7.0));
        assert_eq!(samples.gauge(RANDOM_VALUE), Some(0.5));

        let batch = samples.to_batch();
        let gauges = batch
            .iter()
            .filter(|metric| metric.kind == MetricKind::Gauge)
            .count();
        assert_eq!(gauges, KNOWN_GAUGE_IDS.len());
        assert!(batch.contains(&Metric::counter(POLL_COUNT, 2)));
    }
}
