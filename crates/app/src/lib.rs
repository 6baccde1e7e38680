//! # metricity-app
//!
//! Application use cases: the metrics service behind the HTTP handlers, the
//! durability bridge and the collector agent.
//! This crate depends on `ports`, `domain`, and `shared`.

pub mod agent;
pub mod durability;
pub mod service;

pub use agent::{Agent, AgentDeps, AgentSettings, DeliveryPlan, PRIMARY_ATTEMPTS, SampleSet};
pub use durability::{DurabilityBridge, DurabilityDeps, DurabilitySettings};
pub use service::{MetricsService, MetricsServiceDeps};

/// Returns the app crate version.
#[must_use]
pub const fn app_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use metricity_domain::domain_crate_version;
    use metricity_ports::ports_crate_version;
    use metricity_shared::shared_crate_version;

    #[test]
    fn app_can_use_ports_domain_shared() {
        assert!(!app_crate_version().is_empty());
        assert!(!ports_crate_version().is_empty());
        assert!(!domain_crate_version().is_empty());
        assert!(!shared_crate_version().is_empty());
    }
}
