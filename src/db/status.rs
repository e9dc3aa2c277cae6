use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};

use crate::metadata::{self, SEED_VERSION_KEY};
use crate::AppResult;

const COUNTED_TABLES: &[&str] = &[
    "products",
    "customers",
    "transactions",
    "transaction_items",
    "payment_logs",
    "shopping_lists",
    "shopping_list_items",
    "users",
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCount {
    pub table: String,
    pub rows: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatus {
    pub schema_version: i64,
    pub seed_version: Option<String>,
    pub schema_hash: String,
    pub integrity_ok: bool,
    pub foreign_key_violations: usize,
    pub tables: Vec<TableCount>,
}

pub async fn schema_hash(pool: &SqlitePool) -> AppResult<String> {
    let rows = sqlx::query(
        "SELECT type, name, tbl_name, sql FROM sqlite_master
          WHERE type IN ('table','index','trigger','view')
          ORDER BY type, name",
    )
    .fetch_all(pool)
    .await?;

    let mut hasher = Sha256::new();
    for row in rows {
        let ty: String = row.try_get("type")?;
        let name: String = row.try_get("name")?;
        let tbl: String = row.try_get("tbl_name")?;
        let sql: Option<String> = row.try_get("sql").ok();

        hasher.update(ty.as_bytes());
        hasher.update([0]);
        hasher.update(name.as_bytes());
        hasher.update([0]);
        hasher.update(tbl.as_bytes());
        hasher.update([0]);
        if let Some(sql) = sql {
            hasher.update(sql.as_bytes());
        }
        hasher.update([0]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

pub async fn store_status(pool: &SqlitePool) -> AppResult<StoreStatus> {
    let mut conn = pool.acquire().await?;
    let schema_version = metadata::schema_version(&mut conn).await?;
    let seed_version = metadata::get(&mut conn, SEED_VERSION_KEY).await?;
    drop(conn);

    let integrity: String = sqlx::query_scalar("PRAGMA integrity_check;")
        .fetch_one(pool)
        .await?;
    let fk_rows = sqlx::query("PRAGMA foreign_key_check;")
        .fetch_all(pool)
        .await?;

    let mut tables = Vec::with_capacity(COUNTED_TABLES.len());
    for table in COUNTED_TABLES {
        let exists: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM sqlite_master WHERE type='table' AND name=?")
                .bind(table)
                .fetch_optional(pool)
                .await?;
        if exists.is_none() {
            continue;
        }
        let rows: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await?;
        tables.push(TableCount {
            table: (*table).to_string(),
            rows,
        });
    }

    Ok(StoreStatus {
        schema_version,
        seed_version,
        schema_hash: schema_hash(pool).await?,
        integrity_ok: integrity == "ok",
        foreign_key_violations: fk_rows.len(),
        tables,
    })
}
