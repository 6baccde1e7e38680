//! HTTP delivery of metric batches to a collector.

use flate2::Compression;
use flate2::write::GzEncoder;
use metricity_domain::{Metric, encode_batch};
use metricity_ports::{BoxFuture, DeliveryTarget, MetricsTransport};
use metricity_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

const BATCH_PATH: &str = "updates/";

/// Posts gzip-compressed JSON batches to `{base}/updates/`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport whose every attempt is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| {
                ErrorEnvelope::unexpected(
                    ErrorCode::new("transport", "client_init_failed"),
                    format!("failed to build HTTP client: {error}"),
                    ErrorClass::NonRetriable,
                )
            })?;
        Ok(Self { client })
    }

    async fn post(
        &self,
        ctx: &RequestContext,
        target: &DeliveryTarget,
        batch: &[Metric],
    ) -> Result<()> {
        let body = gzip(&encode_batch(batch)?)?;
        let endpoint = batch_endpoint(&target.base_url);

        let request = self
            .client
            .post(endpoint.as_str())
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip")
            .body(body)
            .send();
        let response = tokio::select! {
            () = ctx.cancelled() => return Err(cancelled_error()),
            result = request => result.map_err(|error| map_reqwest_error(&error))?,
        };

        let status = response.status();
        // Read the body to the end so the connection goes back to the pool.
        let drained = tokio::select! {
            () = ctx.cancelled() => return Err(cancelled_error()),
            body = response.bytes() => body,
        };
        if !status.is_success() {
            return Err(map_http_status(status));
        }
        drained.map_err(|error| map_reqwest_error(&error))?;
        Ok(())
    }
}

impl MetricsTransport for HttpTransport {
    fn send_batch(
        &self,
        ctx: &RequestContext,
        target: DeliveryTarget,
        batch: Arc<[Metric]>,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("transport.send_batch")?;
            self.post(&ctx, &target, &batch).await.map_err(|error| {
                error
                    .with_metadata("target", target.role.to_string())
                    .with_metadata("url", &*target.base_url)
            })
        })
    }
}

fn batch_endpoint(base_url: &str) -> String {
    if base_url.ends_with('/') {
        format!("{base_url}{BATCH_PATH}")
    } else {
        format!("{base_url}/{BATCH_PATH}")
    }
}

fn gzip(payload: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload)?;
    Ok(encoder.finish()?)
}

fn cancelled_error() -> ErrorEnvelope {
    ErrorEnvelope::cancelled("operation cancelled").with_metadata("operation", "transport.send_batch")
}

fn map_reqwest_error(error: &reqwest::Error) -> ErrorEnvelope {
    let code = if error.is_timeout() {
        "timeout"
    } else if error.is_connect() {
        "connect"
    } else {
        "request_failed"
    };
    ErrorEnvelope::unexpected(
        ErrorCode::new("transport", code),
        format!("metrics delivery failed: {error}"),
        ErrorClass::Retriable,
    )
}

fn map_http_status(status: StatusCode) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::new("transport", "http_status"),
        format!("collector answered {status}"),
        ErrorClass::Retriable,
    )
    .with_metadata("status", status.as_u16().to_string())
}
