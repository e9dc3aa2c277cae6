use anyhow::Result;
use shelfkeeper_lib::auth::verify_password;
use shelfkeeper_lib::config::SeedAccount;
use shelfkeeper_lib::metadata::{self, SEED_VERSION_KEY};
use shelfkeeper_lib::seed::{self, SEED_VERSION};
use shelfkeeper_lib::{migrate, Argon2Hasher};

mod util;
use util::PlainHasher;

#[tokio::test]
async fn seed_runs_exactly_once() -> Result<()> {
    let pool = util::temp_pool().await;
    migrate::apply_migrations(&pool).await?;

    let first = seed::run_seed(&pool, &SeedAccount::default(), &PlainHasher).await?;
    assert!(!first.skipped);
    assert!(first.admin_created);
    let second = seed::run_seed(&pool, &SeedAccount::default(), &PlainHasher).await?;
    assert!(second.skipped);

    assert_eq!(util::count(&pool, "users").await, 1);
    let monthly: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM shopping_lists WHERE type = 'monthly_restock'")
            .fetch_one(&pool)
            .await?;
    assert_eq!(monthly, 1);

    let mut conn = pool.acquire().await?;
    assert_eq!(
        metadata::get(&mut conn, SEED_VERSION_KEY).await?.as_deref(),
        Some(SEED_VERSION)
    );
    Ok(())
}

#[tokio::test]
async fn interrupted_seed_repeats_without_duplicates() -> Result<()> {
    let pool = util::ready_pool().await;
    // Marker lost after the rows were written.
    sqlx::query("DELETE FROM metadata WHERE key = ?")
        .bind(SEED_VERSION_KEY)
        .execute(&pool)
        .await?;

    let report = seed::run_seed(&pool, &SeedAccount::default(), &PlainHasher).await?;
    assert!(!report.skipped);
    assert!(!report.admin_created);
    assert_eq!(util::count(&pool, "users").await, 1);
    assert_eq!(util::count(&pool, "shopping_lists").await, 1);
    Ok(())
}

#[tokio::test]
async fn admin_password_is_stored_as_argon2_hash() -> Result<()> {
    let pool = util::temp_pool().await;
    migrate::apply_migrations(&pool).await?;
    let account = SeedAccount {
        username: "owner".into(),
        password: "s3cret".into(),
    };
    seed::run_seed(&pool, &account, &Argon2Hasher).await?;

    let (hash, role): (String, String) =
        sqlx::query_as("SELECT password_hash, role FROM users WHERE username = 'owner'")
            .fetch_one(&pool)
            .await?;
    assert_ne!(hash, "s3cret");
    assert!(verify_password("s3cret", &hash));
    assert_eq!(role, "admin");
    Ok(())
}
