//! Runtime statistics boundary contract.

use metricity_domain::RuntimeStats;

/// Source of process runtime statistics for the agent's sampler.
///
/// Reading never fails; fields the platform cannot provide stay at zero.
pub trait RuntimeStatsSource: Send + Sync {
    /// Take a fresh snapshot.
    fn read(&self) -> RuntimeStats;
}
