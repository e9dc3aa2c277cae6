use std::str::FromStr;
use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{ConnectOptions, Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::{error, info, warn};

use crate::config::StorageMode;
use crate::{AppError, AppResult};

pub mod introspect;
pub mod snapshot;
pub mod status;

const FILE_POOL_CONNECTIONS: u32 = 4;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open the backing store described by `storage`.
///
/// File stores run in WAL with full synchronous writes. Memory stores are
/// pinned to a single connection that never idles out, since the image lives
/// and dies with it; when a snapshot file exists it is loaded first.
pub async fn open_pool(storage: &StorageMode) -> AppResult<SqlitePool> {
    let pool = match storage {
        StorageMode::File(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    error!(
                        target: "shelfkeeper",
                        event = "data_dir_create_failed",
                        error = %e,
                        path = %parent.display()
                    );
                    AppError::from(e).with_context("path", parent.display().to_string())
                })?;
            }
            info!(target: "shelfkeeper", event = "db_path", path = %path.display());

            let opts = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Full)
                .foreign_keys(true)
                .busy_timeout(BUSY_TIMEOUT)
                .log_statements(log::LevelFilter::Off);

            SqlitePoolOptions::new()
                .max_connections(FILE_POOL_CONNECTIONS)
                .connect_with(opts)
                .await?
        }
        StorageMode::Memory { snapshot } => {
            let opts = SqliteConnectOptions::from_str("sqlite::memory:")?
                .foreign_keys(true)
                .log_statements(log::LevelFilter::Off);

            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(opts)
                .await?;

            if let Some(path) = snapshot {
                snapshot::restore(&pool, path).await?;
            }
            pool
        }
    };

    log_effective_pragmas(&pool).await;
    Ok(pool)
}

async fn log_effective_pragmas(pool: &SqlitePool) {
    let (sqlite_ver,): (String,) = sqlx::query_as("select sqlite_version()")
        .fetch_one(pool)
        .await
        .unwrap_or((String::from("unknown"),));

    let jm: (String,) = sqlx::query_as("PRAGMA journal_mode;")
        .fetch_one(pool)
        .await
        .unwrap_or((String::from("unknown"),));

    let fks: (i64,) = sqlx::query_as("PRAGMA foreign_keys;")
        .fetch_one(pool)
        .await
        .unwrap_or((i64::MIN,));

    info!(
        target: "shelfkeeper",
        event = "db_open",
        sqlite_version = %sqlite_ver,
        journal_mode = %jm.0,
        foreign_keys = %fks.0
    );

    if fks.0 != 1 {
        warn!(
            target: "shelfkeeper",
            event = "db_open_warning",
            msg = "foreign_keys is off; weak references will not be nulled on delete"
        );
    }
}

/// Commit `tx` when `result` is `Ok`, otherwise roll it back and hand the
/// original error back to the caller.
pub async fn finish_tx<R>(tx: Transaction<'_, Sqlite>, result: AppResult<R>) -> AppResult<R> {
    match result {
        Ok(val) => {
            tx.commit().await?;
            info!(target: "shelfkeeper", event = "db_tx_commit");
            Ok(val)
        }
        Err(e) => {
            if let Err(rb) = tx.rollback().await {
                error!(target: "shelfkeeper", event = "db_tx_rollback_failed", error = %rb);
            } else {
                warn!(target: "shelfkeeper", event = "db_tx_rollback", code = %e.code());
            }
            Err(e)
        }
    }
}

/// Run work inside a transaction. Commits on success, rolls back on error.
///
/// The closure receives the transaction's connection and must return a boxed
/// future borrowing it; capture owned values only.
pub async fn run_in_tx<R, F>(pool: &SqlitePool, f: F) -> AppResult<R>
where
    F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, AppResult<R>>,
{
    let mut tx = pool.begin().await?;
    info!(target: "shelfkeeper", event = "db_tx_begin");
    let result = f(&mut *tx).await;
    finish_tx(tx, result).await
}
