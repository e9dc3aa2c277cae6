//! Key/value markers that drive the migrator and the seed gate.

use sqlx::SqliteConnection;

use crate::db::introspect;
use crate::AppResult;

pub const SCHEMA_VERSION_KEY: &str = "schema_version";
pub const SEED_VERSION_KEY: &str = "seed_version";

pub async fn ensure_table(conn: &mut SqliteConnection) -> AppResult<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS metadata (
           key   TEXT PRIMARY KEY,
           value TEXT NOT NULL
         )",
    )
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Read a marker. A store that predates the metadata table has no markers.
pub async fn get(conn: &mut SqliteConnection, key: &str) -> AppResult<Option<String>> {
    if !introspect::table_exists(conn, "metadata").await? {
        return Ok(None);
    }
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM metadata WHERE key = ?")
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(value)
}

pub async fn set(conn: &mut SqliteConnection, key: &str, value: &str) -> AppResult<()> {
    ensure_table(conn).await?;
    sqlx::query(
        "INSERT INTO metadata (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Stored schema version; 0 when absent or unparsable.
pub async fn schema_version(conn: &mut SqliteConnection) -> AppResult<i64> {
    Ok(get(conn, SCHEMA_VERSION_KEY)
        .await?
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(0))
}
