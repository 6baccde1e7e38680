//! Process runtime statistics and the gauge accessor table.
//!
//! Sampling never looks fields up by name at runtime: every reported gauge
//! is listed once in [`RUNTIME_GAUGES`] next to the accessor that reads it.

/// Snapshot of process memory and allocator statistics.
///
/// Sources fill what the platform exposes and leave the rest at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RuntimeStats {
    /// Bytes of live heap objects.
    pub alloc: u64,
    /// Bytes used by profiling bucket hash tables.
    pub buck_hash_sys: u64,
    /// Cumulative count of freed objects.
    pub frees: u64,
    /// Fraction of CPU time spent in garbage collection.
    pub gc_cpu_fraction: f64,
    /// Bytes of garbage collection metadata.
    pub gc_sys: u64,
    /// Bytes of allocated heap objects.
    pub heap_alloc: u64,
    /// Bytes in idle heap spans.
    pub heap_idle: u64,
    /// Bytes in in-use heap spans.
    pub heap_inuse: u64,
    /// Number of allocated heap objects.
    pub heap_objects: u64,
    /// Bytes of physical memory returned to the OS.
    pub heap_released: u64,
    /// Bytes of heap memory obtained from the OS.
    pub heap_sys: u64,
    /// Time of the last collection, nanoseconds since the epoch.
    pub last_gc: u64,
    /// Number of pointer lookups.
    pub lookups: u64,
    /// Bytes of allocated cache structures.
    pub mcache_inuse: u64,
    /// Bytes obtained from the OS for cache structures.
    pub mcache_sys: u64,
    /// Bytes of allocated span structures.
    pub mspan_inuse: u64,
    /// Bytes obtained from the OS for span structures.
    pub mspan_sys: u64,
    /// Cumulative count of allocated objects.
    pub mallocs: u64,
    /// Target heap size of the next collection.
    pub next_gc: u64,
    /// Number of forced collections.
    pub num_forced_gc: u64,
    /// Number of completed collections.
    pub num_gc: u64,
    /// Bytes of miscellaneous off-heap allocations.
    pub other_sys: u64,
    /// Cumulative nanoseconds spent in collection pauses.
    pub pause_total_ns: u64,
    /// Bytes in stack spans.
    pub stack_inuse: u64,
    /// Bytes of stack memory obtained from the OS.
    pub stack_sys: u64,
    /// Total bytes of memory obtained from the OS.
    pub sys: u64,
    /// Cumulative bytes allocated for heap objects.
    pub total_alloc: u64,
}

/// One reported gauge and the accessor that reads it.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeGauge {
    /// Reported metric id.
    pub name: &'static str,
    /// Reads the value out of a stats snapshot.
    pub read: fn(&RuntimeStats) -> f64,
}

const fn gauge(name: &'static str, read: fn(&RuntimeStats) -> f64) -> RuntimeGauge {
    RuntimeGauge { name, read }
}

fn bytes(value: u64) -> f64 {
    value as f64
}

/// Every runtime-derived gauge. `RandomValue` is produced by the sampler.
pub static RUNTIME_GAUGES: [RuntimeGauge; 27] = [
    gauge("Alloc", |stats| bytes(stats.alloc)),
    gauge("BuckHashSys", |stats| bytes(stats.buck_hash_sys)),
    gauge("Frees", |stats| bytes(stats.frees)),
    gauge("GCCPUFraction", |stats| stats.gc_cpu_fraction),
    gauge("GCSys", |stats| bytes(stats.gc_sys)),
    gauge("HeapAlloc", |stats| bytes(stats.heap_alloc)),
    gauge("HeapIdle", |stats| bytes(stats.heap_idle)),
    gauge("HeapInuse", |stats| bytes(stats.heap_inuse)),
    gauge("HeapObjects", |stats| bytes(stats.heap_objects)),
    gauge("HeapReleased", |stats| bytes(stats.heap_released)),
    gauge("HeapSys", |stats| bytes(stats.heap_sys)),
    gauge("LastGC", |stats| bytes(stats.last_gc)),
    gauge("Lookups", |stats| bytes(stats.lookups)),
    gauge("MCacheInuse", |stats| bytes(stats.mcache_inuse)),
    gauge("MCacheSys", |stats| bytes(stats.mcache_sys)),
    gauge("MSpanInuse", |stats| bytes(stats.mspan_inuse)),
    gauge("MSpanSys", |stats| bytes(stats.mspan_sys)),
    gauge("Mallocs", |stats| bytes(stats.mallocs)),
    gauge("NextGC", |stats| bytes(stats.next_gc)),
    gauge("NumForcedGC", |stats| bytes(stats.num_forced_gc)),
    gauge("NumGC", |stats| bytes(stats.num_gc)),
    gauge("OtherSys", |stats| bytes(stats.other_sys)),
    gauge("PauseTotalNs", |stats| bytes(stats.pause_total_ns)),
    gauge("StackInuse", |stats| bytes(stats.stack_inuse)),
    gauge("StackSys", |stats| bytes(stats.stack_sys)),
    gauge("Sys", |stats| bytes(stats.sys)),
    gauge("TotalAlloc", |stats| bytes(stats.total_alloc)),
];

/// Find the accessor for a gauge id.
#[must_use]
pub fn runtime_gauge(name: &str) -> Option<&'static RuntimeGauge> {
    RUNTIME_GAUGES.iter().find(|gauge| gauge.name == name)
}
