//! Shape queries used by the migrator to decide which guarded changes apply.

use sqlx::SqliteConnection;

use crate::AppResult;

pub async fn table_exists(conn: &mut SqliteConnection, table: &str) -> AppResult<bool> {
    let exists: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM sqlite_master WHERE type='table' AND name=?")
            .bind(table)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(exists.is_some())
}

pub async fn index_exists(conn: &mut SqliteConnection, index: &str) -> AppResult<bool> {
    let exists: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM sqlite_master WHERE type='index' AND name=?")
            .bind(index)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(exists.is_some())
}

/// Column names of `table` in declaration order; empty when the table is absent.
pub async fn column_names(conn: &mut SqliteConnection, table: &str) -> AppResult<Vec<String>> {
    let names: Vec<String> =
        sqlx::query_scalar("SELECT name FROM pragma_table_info(?) ORDER BY cid")
            .bind(table)
            .fetch_all(&mut *conn)
            .await?;
    Ok(names)
}

pub async fn has_column(conn: &mut SqliteConnection, table: &str, column: &str) -> AppResult<bool> {
    let exists: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM pragma_table_info(?) WHERE name = ?")
            .bind(table)
            .bind(column)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(exists.is_some())
}

/// `ALTER TABLE {table} ADD COLUMN {column} {decl}` unless the column is
/// already there. Returns whether the column was added.
///
/// `table`, `column` and `decl` come from compiled-in step definitions, never
/// from user input.
pub async fn add_column_if_missing(
    conn: &mut SqliteConnection,
    table: &str,
    column: &str,
    decl: &str,
) -> AppResult<bool> {
    if has_column(conn, table, column).await? {
        return Ok(false);
    }
    let sql = format!("ALTER TABLE {table} ADD COLUMN {column} {decl}");
    sqlx::query(&sql).execute(&mut *conn).await?;
    Ok(true)
}
