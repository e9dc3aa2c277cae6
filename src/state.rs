use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{error, info};

use crate::auth::PasswordHasher;
use crate::config::{StorageMode, StoreConfig};
use crate::db::{self, snapshot::SnapshotInfo, snapshot::SnapshotPersister};
use crate::migrate::{self, MigrationReport};
use crate::seed::{self, SeedReport};
use crate::AppResult;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootReport {
    pub migration: MigrationReport,
    pub seed: SeedReport,
}

/// Open store plus the snapshot policy that goes with its storage mode.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    persister: SnapshotPersister,
    config: Arc<StoreConfig>,
}

impl Store {
    /// Open the handle only. Callers that need a usable schema go through
    /// [`Store::bootstrap`].
    pub async fn open(config: StoreConfig) -> AppResult<Self> {
        let pool = db::open_pool(&config.storage).await?;
        let persister = match &config.storage {
            StorageMode::File(_) => SnapshotPersister::disabled(),
            StorageMode::Memory { snapshot } => SnapshotPersister::new(snapshot.clone()),
        };
        Ok(Self {
            pool,
            persister,
            config: Arc::new(config),
        })
    }

    /// Startup sequence: open, migrate, seed, then persist the result.
    pub async fn bootstrap(
        config: StoreConfig,
        hasher: &dyn PasswordHasher,
    ) -> AppResult<(Self, BootReport)> {
        let store = Self::open(config).await?;
        let migration = migrate::apply_migrations(&store.pool).await?;
        let seed = seed::run_seed(&store.pool, &store.config.admin, hasher).await?;
        store.persist().await?;
        info!(
            target: "shelfkeeper",
            event = "store_ready",
            schema_version = migration.to_version,
            steps_applied = migration.applied.len(),
            seeded = !seed.skipped
        );
        Ok((store, BootReport { migration, seed }))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn persister(&self) -> &SnapshotPersister {
        &self.persister
    }

    /// Run one logical unit of work and persist the snapshot when it succeeds.
    pub async fn apply<R, F, Fut>(&self, work: F) -> AppResult<R>
    where
        F: FnOnce(SqlitePool) -> Fut,
        Fut: Future<Output = AppResult<R>>,
    {
        let value = work(self.pool.clone()).await?;
        self.persist().await?;
        Ok(value)
    }

    pub async fn persist(&self) -> AppResult<Option<SnapshotInfo>> {
        self.persister.persist(&self.pool).await.map_err(|e| {
            error!(target: "shelfkeeper", event = "snapshot_persist_failed", error = %e);
            e
        })
    }

    /// Persist a final snapshot and close the pool.
    pub async fn close(self) -> AppResult<()> {
        self.persist().await?;
        self.pool.close().await;
        info!(target: "shelfkeeper", event = "store_closed");
        Ok(())
    }
}
