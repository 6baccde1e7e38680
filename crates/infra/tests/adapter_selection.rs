//! Store selection from configuration through to a working service.

use metricity_config::{
    AgentConfig, ServerEnv, ServerOverrides, StorageSelection, load_server_config,
};
use metricity_infra::{build_agent, build_server_runtime};
use metricity_ports::{NoopLogger, StoreVariant};
use metricity_shared::{ErrorCode, ErrorEnvelope, RequestContext};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

type TestResult = Result<(), ErrorEnvelope>;

fn temp_dir(label: &str) -> std::io::Result<PathBuf> {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("metricity-infra-{label}-{unique}"));
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn env(pairs: &[(&str, &str)]) -> Result<ServerEnv, ErrorEnvelope> {
    let map: BTreeMap<String, String> = pairs
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect();
    Ok(ServerEnv::from_map(&map)?)
}

#[tokio::test]
async fn file_storage_restores_then_writes_through() -> TestResult {
    let dir = temp_dir("file").expect("temp dir");
    let path = dir.join("metrics.json");
    std::fs::write(
        &path,
        r#"[
    {"id": "Requests", "type": "counter", "delta": 8},
    {"id": "Temp", "type": "gauge", "value": 2.75}
]"#,
    )
    .expect("seed snapshot");

    let path_text = path.to_string_lossy().into_owned();
    let config = load_server_config(
        &ServerOverrides::default(),
        &env(&[("STORE_FILE", &path_text), ("STORE_INTERVAL", "0")])?,
    )?;
    assert!(matches!(config.storage(), StorageSelection::File { .. }));

    let runtime = build_server_runtime(&config, Arc::new(NoopLogger)).await?;
    let ctx = RequestContext::new_request();
    let bridge = runtime.durability.as_ref().expect("file storage has a bridge");
    assert_eq!(bridge.restore(&ctx).await?, 2);

    assert_eq!(runtime.service.get_raw(&ctx, "counter", "Requests").await?, "8");
    assert_eq!(runtime.service.get_raw(&ctx, "gauge", "Temp").await?, "2.75");

    runtime
        .service
        .update_path(&ctx, "counter", "Requests", "2")
        .await?;
    let persisted = std::fs::read_to_string(&path).expect("snapshot");
    assert!(persisted.contains("\"delta\": 10"), "{persisted}");
    Ok(())
}

#[tokio::test]
async fn dsn_wins_over_store_file() -> TestResult {
    let dir = temp_dir("dsn").expect("temp dir");
    let db = format!("sqlite:{}", dir.join("metrics.db").to_string_lossy());
    let file = dir.join("unused.json").to_string_lossy().into_owned();
    let config = load_server_config(
        &ServerOverrides::default(),
        &env(&[("DATABASE_DSN", &db), ("STORE_FILE", &file)])?,
    )?;

    let runtime = build_server_runtime(&config, Arc::new(NoopLogger)).await?;

    assert_eq!(runtime.service.store().variant(), StoreVariant::Relational);
    assert!(runtime.durability.is_none());
    runtime.service.ping(&RequestContext::new_request()).await?;
    Ok(())
}

#[tokio::test]
async fn unsupported_dsn_fails_at_startup() -> TestResult {
    let config = load_server_config(
        &ServerOverrides::default(),
        &env(&[("DATABASE_DSN", "mysql://root@localhost/metrics")])?,
    )?;

    let Err(error) = build_server_runtime(&config, Arc::new(NoopLogger)).await else {
        panic!("mysql DSN should be rejected");
    };
    assert_eq!(error.code, ErrorCode::new("store", "database"));
    Ok(())
}

#[test]
fn blank_agent_address_is_a_config_error() {
    let config = AgentConfig {
        address: "   ".into(),
        ..AgentConfig::default()
    };

    let Err(error) = build_agent(&config, Arc::new(NoopLogger)) else {
        panic!("blank address should be rejected");
    };
    assert_ne!(error.code, ErrorCode::internal());
}
