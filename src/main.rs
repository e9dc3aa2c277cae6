use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use shelfkeeper_lib::db::{snapshot, status};
use shelfkeeper_lib::{migrate, reconcile, time, Argon2Hasher, Store, StoreConfig};

#[derive(Debug, Parser)]
#[command(name = "shelfkeeper", about = "Shelfkeeper store maintenance", version)]
struct Cli {
    /// Use this SQLite file instead of the configured store.
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Store inspection and upgrade commands.
    #[command(subcommand)]
    Db(DbCommand),
    /// Shopping-list reconciliation commands.
    #[command(subcommand)]
    Restock(RestockCommand),
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Report schema version, integrity and row counts.
    Status {
        /// Emit the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Apply pending schema upgrades.
    Migrate {
        #[arg(long)]
        json: bool,
    },
    /// Write a full snapshot of the store to a file.
    Snapshot {
        #[arg(long, value_name = "PATH")]
        out: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
enum RestockCommand {
    /// Move the monthly restock list into depot stock and reset it.
    Transfer {
        /// Transfer this list instead of the monthly one (no reset).
        #[arg(long, value_name = "ID")]
        list: Option<i64>,
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let config = match cli.db {
        Some(path) => StoreConfig::file(path),
        None => StoreConfig::from_env().context("load store configuration")?,
    };
    let _log_guard = match &config.log_dir {
        Some(dir) => Some(shelfkeeper_lib::init_logging_with_file(dir)?),
        None => {
            shelfkeeper_lib::init_logging();
            None
        }
    };
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;

    match cli.command {
        Commands::Db(DbCommand::Status { json }) => runtime.block_on(db_status(config, json)),
        Commands::Db(DbCommand::Migrate { json }) => runtime.block_on(db_migrate(config, json)),
        Commands::Db(DbCommand::Snapshot { out }) => runtime.block_on(db_snapshot(config, out)),
        Commands::Restock(RestockCommand::Transfer { list, json }) => {
            runtime.block_on(restock_transfer(config, list, json))
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let serialized = serde_json::to_string_pretty(value).context("serialize report")?;
    println!("{serialized}");
    Ok(())
}

async fn db_status(config: StoreConfig, json: bool) -> Result<i32> {
    let store = Store::open(config).await.context("open store")?;
    let report = status::store_status(store.pool())
        .await
        .context("collect store status")?;
    store.close().await.context("close store")?;

    if json {
        print_json(&report)?;
    } else {
        println!("Schema version : {}", report.schema_version);
        println!(
            "Seed version   : {}",
            report.seed_version.as_deref().unwrap_or("<none>")
        );
        println!("Schema hash    : {}", report.schema_hash);
        println!(
            "Integrity      : {}",
            if report.integrity_ok { "ok" } else { "error" }
        );
        println!("FK violations  : {}", report.foreign_key_violations);
        println!("Tables:");
        for table in &report.tables {
            println!("  {:<24} {}", table.table, table.rows);
        }
    }

    let healthy = report.integrity_ok && report.foreign_key_violations == 0;
    Ok(if healthy { 0 } else { 1 })
}

async fn db_migrate(config: StoreConfig, json: bool) -> Result<i32> {
    let store = Store::open(config).await.context("open store")?;
    let report = migrate::apply_migrations(store.pool())
        .await
        .context("apply migrations")?;
    store.close().await.context("close store")?;

    if json {
        print_json(&report)?;
    } else if report.applied.is_empty() {
        println!("Schema is up to date (version {}).", report.to_version);
    } else {
        println!(
            "Upgraded schema {} -> {}: {}",
            report.from_version,
            report.to_version,
            report.applied.join(", ")
        );
    }
    Ok(0)
}

async fn db_snapshot(config: StoreConfig, out: PathBuf) -> Result<i32> {
    let store = Store::open(config).await.context("open store")?;
    let info = snapshot::write_snapshot(store.pool(), &out)
        .await
        .context("write snapshot")?;
    store.close().await.context("close store")?;
    println!(
        "Snapshot stored at {} ({} bytes, {})",
        info.path,
        info.size_bytes,
        time::format_ms(info.written_at)
    );
    Ok(0)
}

async fn restock_transfer(config: StoreConfig, list: Option<i64>, json: bool) -> Result<i32> {
    let (store, _) = Store::bootstrap(config, &Argon2Hasher)
        .await
        .context("bootstrap store")?;
    let summary = store
        .apply(|pool| async move {
            match list {
                Some(id) => reconcile::transfer_list_to_depot(&pool, id).await,
                None => reconcile::transfer_monthly_restock(&pool, None).await,
            }
        })
        .await
        .context("transfer restock list")?;
    store.close().await.context("close store")?;

    if json {
        print_json(&summary)?;
    } else {
        println!(
            "Transferred {} units across {} products.",
            summary.quantity_moved, summary.products_touched
        );
    }
    Ok(0)
}
