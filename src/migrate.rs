//! Versioned schema upgrades.
//!
//! Steps run in order, each inside its own transaction that also advances
//! the `schema_version` marker. Every step inspects the live shape before
//! changing it, so a store with a stale or missing marker (any earlier app
//! version, or none at all) can replay every step safely.

use futures::future::BoxFuture;
use serde::Serialize;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{error, info};

use crate::db::{finish_tx, introspect};
use crate::metadata::{self, SCHEMA_VERSION_KEY};
use crate::model::ListType;
use crate::quantity::parse_quantity;
use crate::time::now_ms;
use crate::{AppError, AppResult};

type StepFn = for<'c> fn(&'c mut SqliteConnection) -> BoxFuture<'c, AppResult<()>>;

pub struct MigrationStep {
    pub version: i64,
    pub name: &'static str,
    apply: StepFn,
}

static STEPS: &[MigrationStep] = &[
    MigrationStep {
        version: 1,
        name: "baseline",
        apply: baseline,
    },
    MigrationStep {
        version: 2,
        name: "product_and_customer_columns",
        apply: product_and_customer_columns,
    },
    MigrationStep {
        version: 3,
        name: "partial_payments",
        apply: partial_payments,
    },
    MigrationStep {
        version: 4,
        name: "shopping_lists",
        apply: shopping_lists,
    },
    MigrationStep {
        version: 5,
        name: "shopping_list_columns",
        apply: shopping_list_columns,
    },
    MigrationStep {
        version: 6,
        name: "indexes",
        apply: indexes,
    },
];

pub const LEGACY_ITEMS_TABLE: &str = "shopping_list_items_legacy";
pub const DEFAULT_LIST_TITLE: &str = "Shopping list";

/// Columns later steps read from `shopping_lists`, whatever shape it had.
const LIST_CORE_COLUMNS: &[(&str, &str)] = &[
    ("title", "TEXT NOT NULL DEFAULT ''"),
    ("type", "TEXT NOT NULL DEFAULT 'restock'"),
    ("status", "TEXT NOT NULL DEFAULT 'active'"),
    ("created_at", "INTEGER NOT NULL DEFAULT 0"),
];

pub fn latest_version() -> i64 {
    STEPS.last().map(|s| s.version).unwrap_or(0)
}

pub fn steps() -> impl Iterator<Item = (i64, &'static str)> {
    STEPS.iter().map(|s| (s.version, s.name))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub from_version: i64,
    pub to_version: i64,
    pub applied: Vec<String>,
}

pub async fn current_version(pool: &SqlitePool) -> AppResult<i64> {
    let mut conn = pool.acquire().await?;
    metadata::schema_version(&mut conn).await
}

/// Bring the store to the latest schema. Any error is fatal to startup.
pub async fn apply_migrations(pool: &SqlitePool) -> AppResult<MigrationReport> {
    let from_version = current_version(pool).await?;
    let latest = latest_version();
    if from_version > latest {
        error!(
            target: "shelfkeeper",
            event = "migration_newer_schema",
            stored = from_version,
            supported = latest
        );
        return Err(AppError::migration(
            "NEWER_SCHEMA",
            format!("Store schema version {from_version} is newer than supported {latest}"),
        )
        .with_context("stored", from_version.to_string())
        .with_context("supported", latest.to_string()));
    }

    let mut applied = Vec::new();
    for step in STEPS.iter().filter(|s| s.version > from_version) {
        info!(target: "shelfkeeper", event = "migration_step_start", version = step.version, step = step.name);
        let mut tx = pool.begin().await?;
        let result: AppResult<()> = async {
            (step.apply)(&mut *tx).await?;
            record_step(&mut *tx, step).await
        }
        .await;

        if let Err(e) = finish_tx(tx, result).await {
            error!(
                target: "shelfkeeper",
                event = "migration_step_error",
                version = step.version,
                step = step.name,
                error = %e
            );
            return Err(AppError::migration(
                "STEP_FAILED",
                format!("Migration step `{}` failed", step.name),
            )
            .with_context("version", step.version.to_string())
            .with_context("step", step.name)
            .with_cause(e));
        }
        info!(target: "shelfkeeper", event = "migration_step_applied", version = step.version, step = step.name);
        applied.push(step.name.to_string());
    }

    if applied.is_empty() {
        info!(target: "shelfkeeper", event = "migration_up_to_date", version = from_version);
    }

    Ok(MigrationReport {
        from_version,
        to_version: latest,
        applied,
    })
}

async fn record_step(conn: &mut SqliteConnection, step: &MigrationStep) -> AppResult<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
           version    INTEGER PRIMARY KEY,
           name       TEXT NOT NULL,
           applied_at INTEGER NOT NULL
         )",
    )
    .execute(&mut *conn)
    .await?;
    sqlx::query(
        "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)
         ON CONFLICT(version) DO UPDATE SET name = excluded.name, applied_at = excluded.applied_at",
    )
    .bind(step.version)
    .bind(step.name)
    .bind(now_ms())
    .execute(&mut *conn)
    .await?;
    metadata::set(conn, SCHEMA_VERSION_KEY, &step.version.to_string()).await
}

async fn exec_all(conn: &mut SqliteConnection, statements: &[&str]) -> AppResult<()> {
    for sql in statements {
        sqlx::query(sql).execute(&mut *conn).await?;
    }
    Ok(())
}

async fn add_columns(
    conn: &mut SqliteConnection,
    table: &str,
    columns: &[(&str, &str)],
) -> AppResult<()> {
    for (column, decl) in columns {
        if introspect::add_column_if_missing(conn, table, column, decl).await? {
            info!(target: "shelfkeeper", event = "migration_column_added", table = table, column = column);
        }
    }
    Ok(())
}

fn baseline(conn: &mut SqliteConnection) -> BoxFuture<'_, AppResult<()>> {
    Box::pin(async move {
        metadata::ensure_table(conn).await?;
        exec_all(
            conn,
            &[
                "CREATE TABLE IF NOT EXISTS users (
                   id            INTEGER PRIMARY KEY AUTOINCREMENT,
                   username      TEXT NOT NULL UNIQUE,
                   password_hash TEXT NOT NULL,
                   role          TEXT NOT NULL DEFAULT 'admin',
                   created_at    INTEGER NOT NULL DEFAULT 0
                 )",
                "CREATE TABLE IF NOT EXISTS customers (
                   id   INTEGER PRIMARY KEY AUTOINCREMENT,
                   name TEXT NOT NULL
                 )",
                "CREATE TABLE IF NOT EXISTS products (
                   id         INTEGER PRIMARY KEY AUTOINCREMENT,
                   name       TEXT NOT NULL,
                   sell_price REAL NOT NULL DEFAULT 0,
                   quantity   INTEGER NOT NULL DEFAULT 0
                 )",
                "CREATE TABLE IF NOT EXISTS transactions (
                   id           INTEGER PRIMARY KEY AUTOINCREMENT,
                   date         INTEGER NOT NULL,
                   customer_id  INTEGER REFERENCES customers(id),
                   total_amount REAL NOT NULL DEFAULT 0
                 )",
                "CREATE TABLE IF NOT EXISTS transaction_items (
                   id             INTEGER PRIMARY KEY AUTOINCREMENT,
                   transaction_id INTEGER NOT NULL REFERENCES transactions(id) ON DELETE CASCADE,
                   product_id     INTEGER NOT NULL REFERENCES products(id),
                   quantity       INTEGER NOT NULL,
                   unit_price     REAL NOT NULL,
                   line_total     REAL NOT NULL
                 )",
            ],
        )
        .await
    })
}

fn product_and_customer_columns(conn: &mut SqliteConnection) -> BoxFuture<'_, AppResult<()>> {
    Box::pin(async move {
        add_columns(
            conn,
            "products",
            &[
                ("barcode", "TEXT"),
                ("category", "TEXT"),
                ("buy_price", "REAL NOT NULL DEFAULT 0"),
                ("sell_price", "REAL NOT NULL DEFAULT 0"),
                ("quantity", "INTEGER NOT NULL DEFAULT 0"),
                ("min_stock", "INTEGER NOT NULL DEFAULT 0"),
                ("created_at", "INTEGER NOT NULL DEFAULT 0"),
            ],
        )
        .await?;
        add_columns(
            conn,
            "customers",
            &[
                ("phone", "TEXT"),
                ("notes", "TEXT"),
                ("created_at", "INTEGER NOT NULL DEFAULT 0"),
            ],
        )
        .await
    })
}

fn partial_payments(conn: &mut SqliteConnection) -> BoxFuture<'_, AppResult<()>> {
    Box::pin(async move {
        add_columns(
            conn,
            "transactions",
            &[
                ("payment_status", "TEXT NOT NULL DEFAULT 'fully_paid'"),
                ("paid_amount", "REAL NOT NULL DEFAULT 0"),
            ],
        )
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS payment_logs (
               id             INTEGER PRIMARY KEY AUTOINCREMENT,
               transaction_id INTEGER NOT NULL REFERENCES transactions(id) ON DELETE CASCADE,
               amount         REAL NOT NULL,
               note           TEXT,
               created_at     INTEGER NOT NULL
             )",
        )
        .execute(&mut *conn)
        .await?;

        // Sales recorded before partial payments existed were paid in full.
        let res = sqlx::query(
            "UPDATE transactions SET paid_amount = total_amount
              WHERE payment_status = 'fully_paid'
                AND total_amount > 0
                AND (paid_amount IS NULL OR paid_amount = 0)",
        )
        .execute(&mut *conn)
        .await?;
        info!(
            target: "shelfkeeper",
            event = "migration_backfill",
            table = "transactions",
            column = "paid_amount",
            rows = res.rows_affected()
        );
        Ok(())
    })
}

const ITEMS_TABLE_DDL: &str = "CREATE TABLE IF NOT EXISTS shopping_list_items (
   id                  INTEGER PRIMARY KEY AUTOINCREMENT,
   list_id             INTEGER NOT NULL REFERENCES shopping_lists(id) ON DELETE CASCADE,
   product_id          INTEGER REFERENCES products(id) ON DELETE SET NULL,
   name                TEXT NOT NULL,
   quantity_value      REAL NOT NULL DEFAULT 1,
   quantity_label      TEXT,
   estimated_unit_cost REAL NOT NULL DEFAULT 0,
   sell_price          REAL NOT NULL DEFAULT 0,
   category            TEXT,
   notes               TEXT,
   is_completed        INTEGER NOT NULL DEFAULT 0,
   created_at          INTEGER NOT NULL DEFAULT 0
 )";

fn shopping_lists(conn: &mut SqliteConnection) -> BoxFuture<'_, AppResult<()>> {
    Box::pin(async move {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS shopping_lists (
               id         INTEGER PRIMARY KEY AUTOINCREMENT,
               title      TEXT NOT NULL,
               type       TEXT NOT NULL DEFAULT 'restock',
               status     TEXT NOT NULL DEFAULT 'active',
               created_at INTEGER NOT NULL DEFAULT 0
             )",
        )
        .execute(&mut *conn)
        .await?;
        add_columns(conn, "shopping_lists", LIST_CORE_COLUMNS).await?;

        let items_exist = introspect::table_exists(conn, "shopping_list_items").await?;
        let linked = introspect::has_column(conn, "shopping_list_items", "list_id").await?;
        if items_exist && !linked {
            sqlx::query(&format!(
                "ALTER TABLE shopping_list_items RENAME TO {LEGACY_ITEMS_TABLE}"
            ))
            .execute(&mut *conn)
            .await?;
            info!(target: "shelfkeeper", event = "migration_table_renamed", from = "shopping_list_items", to = LEGACY_ITEMS_TABLE);
        }

        sqlx::query(ITEMS_TABLE_DDL).execute(&mut *conn).await?;

        if introspect::table_exists(conn, LEGACY_ITEMS_TABLE).await? {
            let copied = backfill_legacy_items(conn).await?;
            sqlx::query(&format!("DROP TABLE {LEGACY_ITEMS_TABLE}"))
                .execute(&mut *conn)
                .await?;
            info!(
                target: "shelfkeeper",
                event = "migration_legacy_items_rebuilt",
                rows = copied
            );
        }
        Ok(())
    })
}

/// The list that receives orphaned legacy items: the oldest non-monthly
/// list, created when there is none.
async fn default_parent_list(conn: &mut SqliteConnection) -> AppResult<i64> {
    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT MIN(id) FROM shopping_lists WHERE type <> ?",
    )
    .bind(ListType::MonthlyRestock.as_str())
    .fetch_one(&mut *conn)
    .await?;
    if let Some(id) = existing {
        return Ok(id);
    }
    let id = sqlx::query(
        "INSERT INTO shopping_lists (title, type, status, created_at) VALUES (?, ?, 'active', ?)",
    )
    .bind(DEFAULT_LIST_TITLE)
    .bind(ListType::Restock.as_str())
    .bind(now_ms())
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();
    info!(target: "shelfkeeper", event = "migration_default_list_created", list_id = id);
    Ok(id)
}

fn column_or(columns: &[String], candidates: &[&str], cast: &str, fallback: &str) -> String {
    candidates
        .iter()
        .find(|c| columns.iter().any(|have| have.eq_ignore_ascii_case(c)))
        .map(|c| format!("CAST({c} AS {cast})"))
        .unwrap_or_else(|| fallback.to_string())
}

/// Copy every legacy row into the canonical shape. Rows whose id already
/// exists in the new table were copied by an earlier interrupted run.
async fn backfill_legacy_items(conn: &mut SqliteConnection) -> AppResult<u64> {
    let list_id = default_parent_list(conn).await?;
    let columns = introspect::column_names(conn, LEGACY_ITEMS_TABLE).await?;

    let select = format!(
        "SELECT {id} AS id, {name} AS name, {qty} AS quantity, {category} AS category,
                {notes} AS notes, {done} AS is_completed, {created} AS created_at,
                {cost} AS cost, {sell} AS sell_price
           FROM {LEGACY_ITEMS_TABLE} ORDER BY rowid",
        id = column_or(&columns, &["id"], "INTEGER", "rowid"),
        name = column_or(&columns, &["name", "title", "item"], "TEXT", "''"),
        qty = column_or(&columns, &["quantity", "qty", "amount"], "TEXT", "NULL"),
        category = column_or(&columns, &["category"], "TEXT", "NULL"),
        notes = column_or(&columns, &["notes", "note"], "TEXT", "NULL"),
        done = column_or(&columns, &["is_completed", "completed", "done"], "INTEGER", "0"),
        created = column_or(&columns, &["created_at"], "INTEGER", "0"),
        cost = column_or(&columns, &["estimated_unit_cost", "price", "cost"], "REAL", "0"),
        sell = column_or(&columns, &["sell_price"], "REAL", "0"),
    );
    let rows = sqlx::query(&select).fetch_all(&mut *conn).await?;

    let mut copied = 0u64;
    for row in rows {
        let id: i64 = row.try_get("id")?;
        let already: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM shopping_list_items WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;
        if already.is_some() {
            continue;
        }

        let name: Option<String> = row.try_get("name")?;
        let raw_quantity: Option<String> = row.try_get("quantity")?;
        let parsed = parse_quantity(raw_quantity.as_deref());
        let is_completed: Option<i64> = row.try_get("is_completed")?;
        let created_at: Option<i64> = row.try_get("created_at")?;
        let cost: Option<f64> = row.try_get("cost")?;
        let sell: Option<f64> = row.try_get("sell_price")?;

        sqlx::query(
            "INSERT INTO shopping_list_items
               (id, list_id, product_id, name, quantity_value, quantity_label,
                estimated_unit_cost, sell_price, category, notes, is_completed, created_at)
             VALUES (?, ?, NULL, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(list_id)
        .bind(name.unwrap_or_default())
        .bind(parsed.value)
        .bind(parsed.label)
        .bind(cost.unwrap_or(0.0))
        .bind(sell.unwrap_or(0.0))
        .bind(row.try_get::<Option<String>, _>("category")?)
        .bind(row.try_get::<Option<String>, _>("notes")?)
        .bind(i64::from(is_completed.unwrap_or(0) != 0))
        .bind(created_at.filter(|v| *v > 0).unwrap_or_else(now_ms))
        .execute(&mut *conn)
        .await?;
        copied += 1;
    }
    Ok(copied)
}

fn shopping_list_columns(conn: &mut SqliteConnection) -> BoxFuture<'_, AppResult<()>> {
    Box::pin(async move {
        add_columns(
            conn,
            "shopping_lists",
            &[
                ("title", "TEXT NOT NULL DEFAULT ''"),
                ("type", "TEXT NOT NULL DEFAULT 'restock'"),
                ("status", "TEXT NOT NULL DEFAULT 'active'"),
                ("priority", "TEXT NOT NULL DEFAULT 'medium'"),
                ("notes", "TEXT"),
                ("customer_id", "INTEGER REFERENCES customers(id)"),
                ("due_date", "TEXT"),
                ("created_at", "INTEGER NOT NULL DEFAULT 0"),
            ],
        )
        .await?;
        add_columns(
            conn,
            "shopping_list_items",
            &[
                ("product_id", "INTEGER REFERENCES products(id) ON DELETE SET NULL"),
                ("quantity_value", "REAL NOT NULL DEFAULT 1"),
                ("quantity_label", "TEXT"),
                ("estimated_unit_cost", "REAL NOT NULL DEFAULT 0"),
                ("sell_price", "REAL NOT NULL DEFAULT 0"),
                ("category", "TEXT"),
                ("notes", "TEXT"),
                ("is_completed", "INTEGER NOT NULL DEFAULT 0"),
                ("created_at", "INTEGER NOT NULL DEFAULT 0"),
            ],
        )
        .await
    })
}

fn indexes(conn: &mut SqliteConnection) -> BoxFuture<'_, AppResult<()>> {
    Box::pin(async move {
        // Older stores could hold several monthly lists; fold them into the
        // oldest before the singleton index goes on.
        let monthly = ListType::MonthlyRestock.as_str();
        let keeper: Option<i64> =
            sqlx::query_scalar("SELECT MIN(id) FROM shopping_lists WHERE type = ?")
                .bind(monthly)
                .fetch_one(&mut *conn)
                .await?;
        if let Some(keeper) = keeper {
            sqlx::query(
                "UPDATE shopping_list_items SET list_id = ?1
                  WHERE list_id IN (SELECT id FROM shopping_lists WHERE type = ?2 AND id <> ?1)",
            )
            .bind(keeper)
            .bind(monthly)
            .execute(&mut *conn)
            .await?;
            let removed = sqlx::query("DELETE FROM shopping_lists WHERE type = ?2 AND id <> ?1")
                .bind(keeper)
                .bind(monthly)
                .execute(&mut *conn)
                .await?
                .rows_affected();
            if removed > 0 {
                info!(target: "shelfkeeper", event = "migration_monthly_lists_merged", keeper = keeper, removed = removed);
            }
        }

        exec_all(
            conn,
            &[
                "CREATE INDEX IF NOT EXISTS idx_products_barcode ON products(barcode)",
                "CREATE INDEX IF NOT EXISTS idx_transactions_customer ON transactions(customer_id)",
                "CREATE INDEX IF NOT EXISTS idx_transaction_items_tx ON transaction_items(transaction_id)",
                "CREATE INDEX IF NOT EXISTS idx_payment_logs_tx ON payment_logs(transaction_id)",
                "CREATE INDEX IF NOT EXISTS idx_shopping_list_items_list ON shopping_list_items(list_id, is_completed)",
                "CREATE INDEX IF NOT EXISTS idx_shopping_list_items_product ON shopping_list_items(product_id)",
                "CREATE UNIQUE INDEX IF NOT EXISTS ux_shopping_lists_monthly ON shopping_lists(type) WHERE type = 'monthly_restock'",
            ],
        )
        .await
    })
}
