//! Metrics collector server entrypoint.

mod error;
mod routes;

use clap::Parser;
use metricity_adapters::TracingLogger;
use metricity_config::{ServerOverrides, load_server_config_std_env, parse_duration};
use metricity_infra::{LogFormat, build_server_runtime, cancel_on, init_tracing, shutdown_signal};
use metricity_ports::LoggerPort;
use metricity_shared::{
    ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, SecretString, unexpected_from,
};
use std::future::IntoFuture;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Debug, Parser)]
#[command(
    name = "metricity-server",
    version,
    about = "Collects runtime metrics over HTTP",
    long_about = None
)]
struct Cli {
    /// Listen address (`host:port`). Env: ADDRESS.
    #[arg(short = 'a', long)]
    address: Option<String>,
    /// Snapshot interval (`300`, `10s`, `0` saves on every write). Env: STORE_INTERVAL.
    #[arg(short = 'i', long = "store-interval", value_parser = parse_interval)]
    store_interval: Option<Duration>,
    /// Snapshot file; empty disables file persistence. Env: STORE_FILE.
    #[arg(short = 'f', long = "file")]
    store_file: Option<PathBuf>,
    /// Restore the snapshot on startup. Env: RESTORE.
    #[arg(short = 'r', long, value_parser = clap::builder::BoolishValueParser::new())]
    restore: Option<bool>,
    /// Shared signing key. Env: KEY.
    #[arg(short = 'k', long)]
    key: Option<String>,
    /// Database DSN; selects the relational store. Env: DATABASE_DSN.
    #[arg(short = 'd', long = "dsn")]
    database_dsn: Option<String>,
    /// Log line format (`text` or `json`).
    #[arg(long = "log-format", default_value = "text")]
    log_format: LogFormat,
}

impl Cli {
    fn overrides(&self) -> ServerOverrides {
        ServerOverrides {
            address: self.address.as_deref().map(Into::into),
            store_interval: self.store_interval,
            store_file: self.store_file.clone(),
            restore: self.restore,
            key: self.key.as_deref().map(SecretString::from),
            database_dsn: self.database_dsn.as_deref().map(SecretString::from),
        }
    }
}

fn parse_interval(value: &str) -> Result<Duration, String> {
    parse_duration(value).ok_or_else(|| format!("invalid duration: {value}"))
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
            tracing::error!(code = %error.code, message = %error.message, "server failed");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: &Cli) -> Result<(), ErrorEnvelope> {
    let config = load_server_config_std_env(&cli.overrides())?;
    tracing::info!(config = %config.to_redacted_json(), "configuration loaded");
    let logger: Arc<dyn LoggerPort> = Arc::new(TracingLogger::new());
    let runtime = build_server_runtime(&config, logger).await?;

    let ctx = RequestContext::new_request();
    if let Some(durability) = runtime.durability.as_ref() {
        let restored = durability.restore(&ctx).await?;
        tracing::info!(metrics = restored, "snapshot restore finished");
    }

    let listener = TcpListener::bind(&*config.address)
        .await
        .map_err(|error| io_failure("bind", &config.address, &error))?;
    tracing::info!(address = %config.address, "listening");

    let signal = cancel_on(&ctx, shutdown_signal());
    let durability_task = runtime.durability.clone().map(|durability| {
        let ctx = ctx.clone();
        tokio::spawn(async move { durability.run(&ctx).await })
    });

    let shutdown_ctx = ctx.clone();
    let server = axum::serve(listener, routes::router(runtime.service))
        .with_graceful_shutdown(async move { shutdown_ctx.cancelled().await });
    let mut serving = tokio::spawn(server.into_future());

    let served = tokio::select! {
        joined = &mut serving => joined,
        () = ctx.cancelled() => {
            match tokio::time::timeout(config.shutdown_grace, &mut serving).await {
                Ok(joined) => joined,
                Err(_) => {
                    tracing::warn!(grace = ?config.shutdown_grace, "in-flight requests abandoned");
                    serving.abort();
                    Ok(Ok(()))
                },
            }
        },
    };

    // Any exit path must still reach the final snapshot save.
    ctx.cancel();
    signal.abort();
    if let Some(task) = durability_task {
        if let Err(error) = task.await {
            tracing::error!(%error, "durability task failed");
        }
    }

    served
        .map_err(|error| unexpected_from(ErrorCode::internal(), &error))?
        .map_err(|error| io_failure("serve", &config.address, &error))
}

fn io_failure(operation: &str, address: &str, error: &std::io::Error) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::new("server", operation),
        format!("{operation} {address} failed: {error}"),
        ErrorClass::NonRetriable,
    )
    .with_metadata("address", address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_become_overrides() {
        let cli = Cli::try_parse_from([
            "metricity-server",
            "-a",
            "0.0.0.0:9090",
            "-i",
            "0",
            "-f",
            "/tmp/metrics.json",
            "-r",
            "false",
            "--log-format",
            "json",
        ])
        .expect("parse");

        let overrides = cli.overrides();
        assert_eq!(overrides.address.as_deref(), Some("0.0.0.0:9090"));
        assert_eq!(overrides.store_interval, Some(Duration::ZERO));
        assert_eq!(overrides.store_file, Some(PathBuf::from("/tmp/metrics.json")));
        assert_eq!(overrides.restore, Some(false));
        assert!(overrides.database_dsn.is_none());
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn unset_flags_leave_config_to_env_and_defaults() {
        let cli = Cli::try_parse_from(["metricity-server"]).expect("parse");
        assert_eq!(cli.overrides(), ServerOverrides::default());
    }

    #[test]
    fn bad_interval_is_rejected() {
        assert!(Cli::try_parse_from(["metricity-server", "-i", "soon"]).is_err());
    }
}
