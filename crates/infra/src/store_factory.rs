//! Store selection and server runtime composition.

use crate::InfraResult;
use metricity_adapters::{FileStore, JsonFileSnapshot, MemoryStore, RelationalStore};
use metricity_app::{
    DurabilityBridge, DurabilityDeps, DurabilitySettings, MetricsService, MetricsServiceDeps,
};
use metricity_config::{ServerConfig, StorageSelection};
use metricity_ports::{LoggerPort, MetricStore, SnapshotStore, log_fields};
use std::sync::Arc;

/// Store plus the snapshot backing it, when there is one.
pub struct BuiltStore {
    /// Selected store.
    pub store: Arc<dyn MetricStore>,
    /// Snapshot file for the file variant.
    pub snapshot: Option<Arc<dyn SnapshotStore>>,
}

/// Everything the HTTP surface needs.
pub struct ServerRuntime {
    /// Handler-facing service.
    pub service: MetricsService,
    /// Durability bridge for the file variant.
    pub durability: Option<Arc<DurabilityBridge>>,
}

/// Open the store chosen by `selection`.
///
/// Relational connects (and seeds) the database; File opens the snapshot
/// file; Memory needs neither.
pub async fn build_store(
    selection: &StorageSelection,
    logger: Arc<dyn LoggerPort>,
) -> InfraResult<BuiltStore> {
    match selection {
        StorageSelection::Relational { dsn } => {
            let store = RelationalStore::connect(dsn).await?;
            Ok(BuiltStore {
                store: Arc::new(store),
                snapshot: None,
            })
        },
        StorageSelection::File { path, interval, .. } => {
            let snapshot: Arc<dyn SnapshotStore> =
                Arc::new(JsonFileSnapshot::open(path.clone(), *interval)?);
            let store = FileStore::new(Arc::clone(&snapshot), logger);
            Ok(BuiltStore {
                store: Arc::new(store),
                snapshot: Some(snapshot),
            })
        },
        StorageSelection::Memory => Ok(BuiltStore {
            store: Arc::new(MemoryStore::seeded()),
            snapshot: None,
        }),
    }
}

/// Build the service and, for the file variant, its durability bridge.
pub async fn build_server_runtime(
    config: &ServerConfig,
    logger: Arc<dyn LoggerPort>,
) -> InfraResult<ServerRuntime> {
    let selection = config.storage();
    let built = build_store(&selection, Arc::clone(&logger)).await?;
    logger.info(
        "server.store.selected",
        "Metric store ready",
        Some(log_fields([("variant", built.store.variant().as_str().into())])),
    );

    let durability = match (&selection, built.snapshot) {
        (StorageSelection::File { interval, restore, .. }, Some(snapshot)) => {
            Some(Arc::new(DurabilityBridge::new(
                DurabilityDeps {
                    store: Arc::clone(&built.store),
                    snapshot,
                    logger: Some(Arc::clone(&logger)),
                },
                DurabilitySettings {
                    interval: *interval,
                    restore: *restore,
                    ..DurabilitySettings::default()
                },
            )))
        },
        _ => None,
    };

    let service = MetricsService::new(MetricsServiceDeps {
        store: built.store,
        key: config.key.clone(),
        logger: Some(logger),
    });
    Ok(ServerRuntime {
        service,
        durability,
    })
}
