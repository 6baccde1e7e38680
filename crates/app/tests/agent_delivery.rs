//! Agent reporting against mock collectors.

use flate2::read::GzDecoder;
use metricity_adapters::HttpTransport;
use metricity_app::{Agent, AgentDeps, AgentSettings, DeliveryPlan, PRIMARY_ATTEMPTS};
use metricity_domain::{Metric, MetricKind, RuntimeStats, decode_batch, verify};
use metricity_ports::{DeliveryTarget, RuntimeStatsSource, TargetRole};
use metricity_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result, RetryPolicy, SecretString};
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Reports a growing heap on every read.
#[derive(Default)]
struct ScriptedStats {
    reads: AtomicU64,
}

impl RuntimeStatsSource for ScriptedStats {
    fn read(&self) -> RuntimeStats {
        let read = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        RuntimeStats {
            heap_alloc: read * 1024,
            num_gc: read,
            ..RuntimeStats::default()
        }
    }
}

fn agent(primary: &MockServer, fallback: Option<&MockServer>, key: Option<&str>) -> Result<Agent> {
    let transport = HttpTransport::new(Duration::from_secs(2))?;
    Ok(Agent::new(
        AgentDeps {
            stats: Arc::new(ScriptedStats::default()),
            transport: Arc::new(transport),
            logger: None,
        },
        AgentSettings {
            poll_interval: Duration::from_millis(10),
            report_interval: Duration::from_millis(50),
            delivery: DeliveryPlan {
                primary: DeliveryTarget::new(TargetRole::Primary, format!("{}/", primary.uri())),
                fallback: fallback
                    .map(|server| DeliveryTarget::new(TargetRole::Fallback, format!("{}/", server.uri()))),
                retry: RetryPolicy::fixed(PRIMARY_ATTEMPTS, Duration::from_millis(10)),
            },
            key: key.map(SecretString::from),
        },
    ))
}

fn received_batch(body: &[u8]) -> Result<Vec<Metric>> {
    let mut plain = Vec::new();
    GzDecoder::new(body).read_to_end(&mut plain)?;
    Ok(decode_batch(&plain)?)
}

#[tokio::test]
async fn four_primary_failures_then_fallback_success() -> Result<()> {
    let primary = MockServer::start().await;
    let fallback = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/updates/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(4)
        .mount(&primary)
        .await;
    Mock::given(method("POST"))
        .and(path("/updates/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&fallback)
        .await;

    let agent = agent(&primary, Some(&fallback), None)?;
    agent.sample_once().await;
    let role = agent.report_once(&RequestContext::new_request()).await?;

    assert_eq!(role, TargetRole::Fallback);
    primary.verify().await;
    fallback.verify().await;
    Ok(())
}

#[tokio::test]
async fn exhausted_primary_without_fallback_fails() -> Result<()> {
    let primary = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&primary)
        .await;

    let agent = agent(&primary, None, None)?;
    let error = agent.report_once(&RequestContext::new_request()).await.err();

    assert!(error.is_some_and(|error| error.code.is("transport", "http_status")));
    Ok(())
}

#[tokio::test]
async fn reported_batch_is_signed_and_complete() -> Result<()> {
    let primary = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/updates/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&primary)
        .await;

    let agent = agent(&primary, None, Some("secret"))?;
    agent.sample_once().await;
    agent.sample_once().await;
    agent.report_once(&RequestContext::new_request()).await?;

    let requests = primary.received_requests().await.unwrap_or_default();
    let request = requests
        .first()
        .ok_or_else(|| ErrorEnvelope::invariant(ErrorCode::internal(), "no request recorded"))?;
    let batch = received_batch(&request.body)?;

    let key = SecretString::from("secret");
    for metric in &batch {
        verify(metric, &key)?;
    }
    let find = |id: &str| batch.iter().find(|metric| &*metric.id == id);
    let poll_count = find("PollCount");
    assert_eq!(poll_count.map(|metric| metric.kind), Some(MetricKind::Counter));
    assert_eq!(poll_count.and_then(|metric| metric.delta), Some(2));
    assert_eq!(find("HeapAlloc").and_then(|metric| metric.value), Some(2048.0));
    assert_eq!(batch.len(), 29);
    Ok(())
}

#[tokio::test]
async fn run_samples_and_reports_until_cancelled() -> Result<()> {
    let primary = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&primary)
        .await;

    let agent = Arc::new(agent(&primary, None, None)?);
    let ctx = RequestContext::new_request();
    let runner = {
        let agent = Arc::clone(&agent);
        let ctx = ctx.clone();
        tokio::spawn(async move { agent.run(&ctx).await })
    };

    tokio::time::sleep(Duration::from_millis(180)).await;
    ctx.cancel();
    runner
        .await
        .map_err(|error| metricity_shared::unexpected_from(ErrorCode::internal(), &error))?;

    assert!(agent.samples().await.poll_count() >= 2);
    let reports = primary.received_requests().await.unwrap_or_default();
    assert!(!reports.is_empty());
    Ok(())
}
