//! Collector agent composition.

use crate::InfraResult;
use metricity_adapters::{HttpTransport, ProcStatsSource};
use metricity_app::{Agent, AgentDeps, AgentSettings, DeliveryPlan};
use metricity_config::AgentConfig;
use metricity_ports::{DeliveryTarget, LoggerPort, TargetRole};
use metricity_shared::RetryPolicy;
use std::sync::Arc;

/// Build an agent reading `/proc` statistics and posting over HTTP.
pub fn build_agent(config: &AgentConfig, logger: Arc<dyn LoggerPort>) -> InfraResult<Agent> {
    let transport = HttpTransport::new(config.request_timeout)?;
    let primary = DeliveryTarget::new(TargetRole::Primary, config.primary_url()?.as_str());
    let fallback = config
        .fallback_url()?
        .map(|url| DeliveryTarget::new(TargetRole::Fallback, url.as_str()));

    Ok(Agent::new(
        AgentDeps {
            stats: Arc::new(ProcStatsSource),
            transport: Arc::new(transport),
            logger: Some(logger),
        },
        AgentSettings {
            poll_interval: config.poll_interval,
            report_interval: config.report_interval,
            delivery: DeliveryPlan {
                primary,
                fallback,
                retry: RetryPolicy::fixed(config.primary_attempts, config.retry_delay),
            },
            key: config.key.clone(),
        },
    ))
}
