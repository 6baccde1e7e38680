//! # metricity-adapters
//!
//! Adapter implementations for ports: metric stores, the snapshot file,
//! runtime statistics, HTTP delivery and logging.
//! This crate depends on `ports`, `domain` and `shared`.

pub mod log_sink;
pub mod logger;
pub mod snapshot;
pub mod stats;
pub mod store;
pub mod transport;

pub use log_sink::{LogSink, MemorySink};
pub use logger::{JsonLogger, TracingLogger};
pub use snapshot::JsonFileSnapshot;
pub use stats::ProcStatsSource;
pub use store::{FileStore, MemoryStore, RelationalStore};
pub use transport::HttpTransport;

/// Returns the adapters crate version.
#[must_use]
pub const fn adapters_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace_deps() -> Vec<String> {
        let cargo_toml = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml"));
        let mut deps = Vec::new();
        let mut in_deps = false;

        for raw_line in cargo_toml.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('[') {
                in_deps = line == "[dependencies]" || line == "[dev-dependencies]";
                continue;
            }
            if in_deps && line.starts_with("metricity-") {
                let key = line.split('=').next().unwrap_or("").trim();
                deps.push(key.split('.').next().unwrap_or("").trim().to_string());
            }
        }

        deps
    }

    #[test]
    fn adapters_do_not_depend_on_app_or_infra() {
        let deps = workspace_deps();
        let forbidden = ["metricity-app", "metricity-infra"];

        for dep in &deps {
            assert!(
                !forbidden.contains(&dep.as_str()),
                "forbidden dependency found: {dep}"
            );
        }
        assert!(!adapters_crate_version().is_empty());
    }
}
