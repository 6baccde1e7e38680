//! Metrics collection agent entrypoint.

use clap::Parser;
use metricity_adapters::TracingLogger;
use metricity_config::{AgentOverrides, load_agent_config_std_env, parse_duration};
use metricity_infra::{LogFormat, build_agent, cancel_on, init_tracing, shutdown_signal};
use metricity_ports::LoggerPort;
use metricity_shared::{ErrorEnvelope, RequestContext, SecretString};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(
    name = "metricity-agent",
    version,
    about = "Samples runtime statistics and reports them to a collector",
    long_about = None
)]
struct Cli {
    /// Collector address (`host:port` or URL). Env: ADDRESS.
    #[arg(short = 'a', long)]
    address: Option<String>,
    /// Collector tried once when the primary keeps failing. Env: FALLBACK_ADDRESS.
    #[arg(long = "fallback")]
    fallback_address: Option<String>,
    /// Sampling interval (`2`, `500ms`). Env: POLL_INTERVAL.
    #[arg(short = 'p', long = "poll-interval", value_parser = parse_interval)]
    poll_interval: Option<Duration>,
    /// Reporting interval (`10`, `1m`). Env: REPORT_INTERVAL.
    #[arg(short = 'r', long = "report-interval", value_parser = parse_interval)]
    report_interval: Option<Duration>,
    /// Shared signing key. Env: KEY.
    #[arg(short = 'k', long)]
    key: Option<String>,
    /// Log line format (`text` or `json`).
    #[arg(long = "log-format", default_value = "text")]
    log_format: LogFormat,
}

impl Cli {
    fn overrides(&self) -> AgentOverrides {
        AgentOverrides {
            address: self.address.as_deref().map(Into::into),
            fallback_address: self.fallback_address.as_deref().map(Into::into),
            poll_interval: self.poll_interval,
            report_interval: self.report_interval,
            key: self.key.as_deref().map(SecretString::from),
        }
    }
}

fn parse_interval(value: &str) -> Result<Duration, String> {
    match parse_duration(value) {
        Some(duration) if !duration.is_zero() => Ok(duration),
        Some(_) => Err("interval must be positive".to_owned()),
        None => Err(format!("invalid duration: {value}")),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(error) = init_tracing(cli.log_format, "info") {
        eprintln!("error: {}", error.message);
        return ExitCode::FAILURE;
    }

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(code = %error.code, message = %error.message, "agent failed");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: &Cli) -> Result<(), ErrorEnvelope> {
    let config = load_agent_config_std_env(&cli.overrides())?;
    tracing::info!(config = %config.to_redacted_json(), "configuration loaded");
    let logger: Arc<dyn LoggerPort> = Arc::new(TracingLogger::new());
    let agent = build_agent(&config, logger)?;
    tracing::info!(
        collector = %config.address,
        poll = ?config.poll_interval,
        report = ?config.report_interval,
        "agent started"
    );

    let ctx = RequestContext::new_request();
    let signal = cancel_on(&ctx, shutdown_signal());
    agent.run(&ctx).await;
    signal.abort();
    tracing::info!("agent stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_become_overrides() {
        let cli = Cli::try_parse_from([
            "metricity-agent",
            "-a",
            "localhost:9090",
            "--fallback",
            "backup:8080",
            "-p",
            "2",
            "-r",
            "500ms",
        ])
        .expect("parse");

        let overrides = cli.overrides();
        assert_eq!(overrides.address.as_deref(), Some("localhost:9090"));
        assert_eq!(overrides.fallback_address.as_deref(), Some("backup:8080"));
        assert_eq!(overrides.poll_interval, Some(Duration::from_secs(2)));
        assert_eq!(overrides.report_interval, Some(Duration::from_millis(500)));
        assert!(overrides.key.is_none());
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(Cli::try_parse_from(["metricity-agent", "-p", "0"]).is_err());
    }
}
