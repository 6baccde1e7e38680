//! Runtime statistics read from the operating system.

use metricity_domain::RuntimeStats;
use metricity_ports::RuntimeStatsSource;

/// Reads process memory figures from `/proc/self/status`.
///
/// Only Linux exposes the file; elsewhere every figure reads as zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcStatsSource;

impl ProcStatsSource {
    /// Create the source.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl RuntimeStatsSource for ProcStatsSource {
    fn read(&self) -> RuntimeStats {
        std::fs::read_to_string("/proc/self/status")
            .map(|status| stats_from_status(&status))
            .unwrap_or_default()
    }
}

/// Map `/proc/<pid>/status` memory lines onto the runtime stats fields.
fn stats_from_status(status: &str) -> RuntimeStats {
    let mut stats = RuntimeStats::default();
    for line in status.lines() {
        let Some((name, rest)) = line.split_once(':') else {
            continue;
        };
        let Some(bytes) = parse_kib(rest) else {
            continue;
        };
        match name {
            "VmRSS" => {
                stats.alloc = bytes;
                stats.heap_inuse = bytes;
            },
            "VmData" => {
                stats.heap_alloc = bytes;
                stats.heap_sys = bytes;
            },
            "VmSize" => stats.sys = bytes,
            "VmStk" => {
                stats.stack_inuse = bytes;
                stats.stack_sys = bytes;
            },
            "VmLib" => stats.other_sys = bytes,
            "VmHWM" => stats.total_alloc = bytes,
            _ => {},
        }
    }
    stats
}

fn parse_kib(field: &str) -> Option<u64> {
    let mut parts = field.split_whitespace();
    let amount: u64 = parts.next()?.parse().ok()?;
    match parts.next() {
        Some("kB") => amount.checked_mul(1024),
        None => Some(amount),
        Some(_) => None,
    }
}
