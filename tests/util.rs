#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use shelfkeeper_lib::config::SeedAccount;
use shelfkeeper_lib::ledger::{self, NewProduct};
use shelfkeeper_lib::model::Product;
use shelfkeeper_lib::{migrate, seed, AppResult, PasswordHasher};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

/// Deterministic stand-in so tests skip the Argon2 work factor.
pub struct PlainHasher;

impl PasswordHasher for PlainHasher {
    fn hash(&self, password: &str) -> AppResult<String> {
        Ok(format!("plain:{password}"))
    }
}

pub async fn temp_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("connect sqlite::memory:");
    sqlx::query("PRAGMA foreign_keys=ON;")
        .execute(&pool)
        .await
        .unwrap();
    pool
}

/// Migrated and seeded in-memory store.
pub async fn ready_pool() -> SqlitePool {
    let pool = temp_pool().await;
    migrate::apply_migrations(&pool).await.expect("migrate");
    seed::run_seed(&pool, &SeedAccount::default(), &PlainHasher)
        .await
        .expect("seed");
    pool
}

pub async fn product(pool: &SqlitePool, name: &str, quantity: i64, sell_price: f64) -> Product {
    ledger::create_product(pool, &NewProduct::new(name, sell_price).quantity(quantity))
        .await
        .expect("create product")
}

pub async fn stock_of(pool: &SqlitePool, product_id: i64) -> i64 {
    ledger::get_product(pool, product_id)
        .await
        .expect("product exists")
        .quantity
}

pub async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap()
}
