//! Whole-store snapshots for the in-memory backend.
//!
//! A snapshot is a complete SQLite image written with `VACUUM INTO` to a
//! sibling `.partial` file and renamed over the target, so a crash mid-write
//! leaves the previous snapshot intact. Mutations made after the last
//! snapshot are lost on crash.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

use crate::time::now_ms;
use crate::{AppError, AppResult};

const PARTIAL_SUFFIX: &str = "partial";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotInfo {
    pub path: String,
    pub size_bytes: u64,
    pub written_at: i64,
}

/// Writes the store to its snapshot file after each unit of work.
///
/// A persister without a target is a no-op, which is what file-backed stores
/// use: their transactions are already durable.
#[derive(Debug, Clone, Default)]
pub struct SnapshotPersister {
    target: Option<PathBuf>,
}

impl SnapshotPersister {
    pub fn new(target: Option<PathBuf>) -> Self {
        Self { target }
    }

    pub fn disabled() -> Self {
        Self { target: None }
    }

    pub fn target(&self) -> Option<&Path> {
        self.target.as_deref()
    }

    pub async fn persist(&self, pool: &SqlitePool) -> AppResult<Option<SnapshotInfo>> {
        match &self.target {
            Some(path) => write_snapshot(pool, path).await.map(Some),
            None => Ok(None),
        }
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    path.with_file_name(name)
}

/// Serialize the full store image to `path`, replacing any previous file.
pub async fn write_snapshot(pool: &SqlitePool, path: &Path) -> AppResult<SnapshotInfo> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| {
            AppError::from(err)
                .with_context("operation", "create_snapshot_dir")
                .with_context("path", parent.display().to_string())
        })?;
    }

    let partial = partial_path(path);
    if partial.exists() {
        warn!(target: "shelfkeeper", event = "snapshot_stale_partial", path = %partial.display());
        fs::remove_file(&partial).map_err(|err| {
            AppError::from(err)
                .with_context("operation", "remove_stale_partial")
                .with_context("path", partial.display().to_string())
        })?;
    }

    let partial_str = partial.to_str().ok_or_else(|| {
        AppError::new("SNAPSHOT/INVALID_PATH", "Snapshot path is not valid UTF-8")
            .with_context("path", partial.display().to_string())
    })?;
    sqlx::query("VACUUM INTO ?")
        .bind(partial_str)
        .execute(pool)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "vacuum_into"))?;

    fs::rename(&partial, path).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "rename_snapshot")
            .with_context("path", path.display().to_string())
    })?;

    let size_bytes = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    let info = SnapshotInfo {
        path: path.display().to_string(),
        size_bytes,
        written_at: now_ms(),
    };
    info!(
        target: "shelfkeeper",
        event = "snapshot_written",
        path = %info.path,
        size_bytes = info.size_bytes
    );
    Ok(info)
}

/// Load the image at `path` into the (empty) store behind `pool`.
///
/// Absent files are not an error: the store simply starts empty. Objects are
/// recreated from the snapshot's own DDL, so constraints and indexes survive.
pub async fn restore(pool: &SqlitePool, path: &Path) -> AppResult<bool> {
    if !path.exists() {
        info!(target: "shelfkeeper", event = "snapshot_absent", path = %path.display());
        return Ok(false);
    }
    let path_str = path.to_str().ok_or_else(|| {
        AppError::new("SNAPSHOT/INVALID_PATH", "Snapshot path is not valid UTF-8")
            .with_context("path", path.display().to_string())
    })?;

    let mut conn = pool.acquire().await?;
    sqlx::query("PRAGMA foreign_keys=OFF;").execute(&mut *conn).await?;
    sqlx::query("ATTACH DATABASE ? AS snapshot")
        .bind(path_str)
        .execute(&mut *conn)
        .await
        .map_err(|err| {
            AppError::new("SNAPSHOT/ATTACH_FAILED", "Snapshot file could not be opened")
                .with_context("path", path.display().to_string())
                .with_cause(err)
        })?;

    let rows = sqlx::query(
        "SELECT type, name, sql FROM snapshot.sqlite_master
          WHERE sql IS NOT NULL AND name NOT LIKE 'sqlite_%'
          ORDER BY CASE type WHEN 'table' THEN 0 ELSE 1 END, rowid",
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut tables = 0usize;
    for row in rows {
        let ty: String = row.try_get("type")?;
        let name: String = row.try_get("name")?;
        let sql: String = row.try_get("sql")?;
        sqlx::query(&sql).execute(&mut *conn).await?;
        if ty == "table" {
            let copy = format!("INSERT INTO main.\"{name}\" SELECT * FROM snapshot.\"{name}\"");
            sqlx::query(&copy).execute(&mut *conn).await?;
            tables += 1;
        }
    }

    let has_sequence: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM snapshot.sqlite_master WHERE type='table' AND name='sqlite_sequence'",
    )
    .fetch_optional(&mut *conn)
    .await?;
    if has_sequence.is_some() {
        sqlx::query("DELETE FROM main.sqlite_sequence")
            .execute(&mut *conn)
            .await?;
        sqlx::query("INSERT INTO main.sqlite_sequence SELECT * FROM snapshot.sqlite_sequence")
            .execute(&mut *conn)
            .await?;
    }

    sqlx::query("DETACH DATABASE snapshot")
        .execute(&mut *conn)
        .await?;
    sqlx::query("PRAGMA foreign_keys=ON;").execute(&mut *conn).await?;

    info!(
        target: "shelfkeeper",
        event = "snapshot_restored",
        path = %path.display(),
        tables = tables
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_path_is_a_sibling() {
        let p = partial_path(Path::new("/data/store.sqlite3"));
        assert_eq!(p, PathBuf::from("/data/store.sqlite3.partial"));
    }
}
