//! First-run data, applied exactly once per seed version.

use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use crate::auth::PasswordHasher;
use crate::config::SeedAccount;
use crate::db::finish_tx;
use crate::metadata::{self, SEED_VERSION_KEY};
use crate::reconcile;
use crate::time::now_ms;
use crate::AppResult;

pub const SEED_VERSION: &str = "2";
pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedReport {
    pub skipped: bool,
    pub admin_created: bool,
    pub monthly_list_id: Option<i64>,
}

async fn ensure_admin(
    conn: &mut SqliteConnection,
    account: &SeedAccount,
    hasher: &dyn PasswordHasher,
) -> AppResult<bool> {
    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE username = ?")
        .bind(&account.username)
        .fetch_optional(&mut *conn)
        .await?;
    if existing.is_some() {
        return Ok(false);
    }
    let hash = hasher.hash(&account.password)?;
    sqlx::query("INSERT INTO users (username, password_hash, role, created_at) VALUES (?, ?, ?, ?)")
        .bind(&account.username)
        .bind(hash)
        .bind(ADMIN_ROLE)
        .bind(now_ms())
        .execute(&mut *conn)
        .await?;
    Ok(true)
}

/// Insert the default administrator and the monthly restock list unless the
/// stored seed version already matches. Every insert checks for an existing
/// row first, so a run interrupted before the marker write repeats cleanly.
pub async fn run_seed(
    pool: &SqlitePool,
    account: &SeedAccount,
    hasher: &dyn PasswordHasher,
) -> AppResult<SeedReport> {
    let mut tx = pool.begin().await?;
    let result: AppResult<SeedReport> = async {
        let stored = metadata::get(&mut tx, SEED_VERSION_KEY).await?;
        if stored.as_deref() == Some(SEED_VERSION) {
            return Ok(SeedReport {
                skipped: true,
                ..SeedReport::default()
            });
        }
        let admin_created = ensure_admin(&mut tx, account, hasher).await?;
        let monthly = reconcile::ensure_monthly_restock_list_in(&mut tx).await?;
        metadata::set(&mut tx, SEED_VERSION_KEY, SEED_VERSION).await?;
        Ok(SeedReport {
            skipped: false,
            admin_created,
            monthly_list_id: Some(monthly),
        })
    }
    .await;

    let report = finish_tx(tx, result).await?;
    if report.skipped {
        info!(target: "shelfkeeper", event = "seed_up_to_date", version = SEED_VERSION);
    } else {
        info!(
            target: "shelfkeeper",
            event = "seed_applied",
            version = SEED_VERSION,
            admin_created = report.admin_created,
            monthly_list_id = report.monthly_list_id
        );
    }
    Ok(report)
}
