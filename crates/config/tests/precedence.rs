//! Merge order for server and agent configuration.

use metricity_config::{
    AgentEnv, AgentOverrides, ServerEnv, ServerOverrides, StorageSelection, load_agent_config,
    load_server_config,
};
use metricity_shared::{ErrorCode, SecretString};
use std::collections::BTreeMap;
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

fn env_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
}

#[test]
fn server_defaults_apply_without_flags_or_env() -> Result<(), Box<dyn Error>> {
    let config = load_server_config(&ServerOverrides::default(), &ServerEnv::default())?;

    assert_eq!(config.address.as_ref(), "127.0.0.1:8080");
    assert_eq!(config.store_interval, Duration::from_secs(300));
    assert_eq!(
        config.store_file.as_deref(),
        Some(PathBuf::from("/tmp/devops-metrics-db.json").as_path())
    );
    assert!(config.restore);
    assert_eq!(config.key, None);
    assert_eq!(config.shutdown_grace, Duration::from_secs(15));
    Ok(())
}

#[test]
fn server_env_beats_flags() -> Result<(), Box<dyn Error>> {
    let overrides = ServerOverrides {
        address: Some("0.0.0.0:9000".into()),
        store_interval: Some(Duration::from_secs(60)),
        restore: Some(false),
        key: Some(SecretString::from("flag-key")),
        ..ServerOverrides::default()
    };
    let env = ServerEnv::from_map(&env_map(&[
        ("ADDRESS", "127.0.0.1:7000"),
        ("STORE_INTERVAL", "0"),
        ("KEY", "env-key"),
    ]))?;

    let config = load_server_config(&overrides, &env)?;

    assert_eq!(config.address.as_ref(), "127.0.0.1:7000");
    assert_eq!(config.store_interval, Duration::ZERO);
    assert!(!config.restore, "flag survives when env is silent");
    assert_eq!(config.key.as_ref().map(SecretString::expose), Some("env-key"));
    Ok(())
}

#[test]
fn database_dsn_from_env_selects_relational_storage() -> Result<(), Box<dyn Error>> {
    let env = ServerEnv::from_map(&env_map(&[("DATABASE_DSN", "sqlite::memory:")]))?;
    let config = load_server_config(&ServerOverrides::default(), &env)?;

    let StorageSelection::Relational { dsn } = config.storage() else {
        return Err("expected relational storage".into());
    };
    assert_eq!(dsn.expose(), "sqlite::memory:");
    Ok(())
}

#[test]
fn agent_flags_and_env_merge() -> Result<(), Box<dyn Error>> {
    let overrides = AgentOverrides {
        address: Some("collector:8080".into()),
        poll_interval: Some(Duration::from_secs(1)),
        report_interval: Some(Duration::from_secs(4)),
        ..AgentOverrides::default()
    };
    let env = AgentEnv::from_map(&env_map(&[
        ("REPORT_INTERVAL", "20"),
        ("FALLBACK_ADDRESS", "backup:8080"),
        ("REQUEST_TIMEOUT", "250ms"),
    ]))?;

    let config = load_agent_config(&overrides, &env)?;

    assert_eq!(config.poll_interval, Duration::from_secs(1));
    assert_eq!(config.report_interval, Duration::from_secs(20));
    assert_eq!(config.request_timeout, Duration::from_millis(250));
    assert_eq!(config.primary_url()?.as_str(), "http://collector:8080/");
    assert_eq!(
        config.fallback_url()?.map(|url| url.to_string()).as_deref(),
        Some("http://backup:8080/")
    );
    Ok(())
}

#[test]
fn zero_report_interval_is_a_config_error() -> Result<(), Box<dyn Error>> {
    let env = AgentEnv::from_map(&env_map(&[("REPORT_INTERVAL", "0")]))?;
    let Err(error) = load_agent_config(&AgentOverrides::default(), &env) else {
        return Err("expected validation failure".into());
    };

    assert_eq!(error.code, ErrorCode::new("config", "invalid_config"));
    assert_eq!(
        error.metadata.get("field").map(String::as_str),
        Some("report_interval")
    );
    Ok(())
}

#[test]
fn invalid_env_values_surface_as_envelopes() {
    let error = AgentEnv::from_map(&env_map(&[("POLL_INTERVAL", "2 fortnights")]))
        .map_err(metricity_shared::ErrorEnvelope::from)
        .err();

    assert_eq!(
        error.map(|error| error.code),
        Some(ErrorCode::new("config", "invalid_env_duration"))
    );
}
