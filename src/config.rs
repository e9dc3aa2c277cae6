use std::env;
use std::path::{Path, PathBuf};

use crate::{AppError, AppResult};

pub const APP_IDENTIFIER: &str = "com.shelfkeeper.app";
pub const DB_FILE_NAME: &str = "shelfkeeper.sqlite3";
pub const SNAPSHOT_FILE_NAME: &str = "shelfkeeper.snapshot.sqlite3";

pub const ENV_DB_PATH: &str = "SHELFKEEPER_DB_PATH";
pub const ENV_STORAGE: &str = "SHELFKEEPER_STORAGE";
pub const ENV_SNAPSHOT_PATH: &str = "SHELFKEEPER_SNAPSHOT_PATH";
pub const ENV_ADMIN_USERNAME: &str = "SHELFKEEPER_ADMIN_USERNAME";
pub const ENV_ADMIN_PASSWORD: &str = "SHELFKEEPER_ADMIN_PASSWORD";
pub const ENV_LOG_DIR: &str = "SHELFKEEPER_LOG_DIR";

const DEFAULT_ADMIN_USERNAME: &str = "admin";
const DEFAULT_ADMIN_PASSWORD: &str = "admin";

/// Where the store keeps its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageMode {
    /// SQLite file with WAL; every committed transaction is durable.
    File(PathBuf),
    /// In-memory image, restored from and written back to a snapshot file.
    /// `None` keeps everything ephemeral (tests).
    Memory { snapshot: Option<PathBuf> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedAccount {
    pub username: String,
    pub password: String,
}

impl Default for SeedAccount {
    fn default() -> Self {
        Self {
            username: DEFAULT_ADMIN_USERNAME.to_string(),
            password: DEFAULT_ADMIN_PASSWORD.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub storage: StorageMode,
    pub admin: SeedAccount,
    pub log_dir: Option<PathBuf>,
}

impl StoreConfig {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageMode::File(path.into()),
            admin: SeedAccount::default(),
            log_dir: None,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            storage: StorageMode::Memory { snapshot: None },
            admin: SeedAccount::default(),
            log_dir: None,
        }
    }

    pub fn memory_with_snapshot(snapshot: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageMode::Memory {
                snapshot: Some(snapshot.into()),
            },
            admin: SeedAccount::default(),
            log_dir: None,
        }
    }

    /// Build the configuration from `SHELFKEEPER_*` environment variables,
    /// falling back to the platform data directory.
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let storage = match non_empty(ENV_STORAGE).as_deref().map(str::trim) {
            None | Some("file") => {
                let path = match non_empty(ENV_DB_PATH) {
                    Some(path) => PathBuf::from(path),
                    None => default_data_dir()?.join(DB_FILE_NAME),
                };
                StorageMode::File(path)
            }
            Some("memory") => {
                let snapshot = match non_empty(ENV_SNAPSHOT_PATH) {
                    Some(path) => PathBuf::from(path),
                    None => default_data_dir()?.join(SNAPSHOT_FILE_NAME),
                };
                StorageMode::Memory {
                    snapshot: Some(snapshot),
                }
            }
            Some(other) => {
                return Err(AppError::new(
                    "CONFIG/INVALID_STORAGE",
                    "Storage mode must be `file` or `memory`",
                )
                .with_context("env", ENV_STORAGE)
                .with_context("value", other));
            }
        };

        let mut admin = SeedAccount::default();
        if let Some(username) = non_empty(ENV_ADMIN_USERNAME) {
            admin.username = username.trim().to_string();
        }
        if let Some(password) = lookup(ENV_ADMIN_PASSWORD) {
            if password.is_empty() {
                return Err(AppError::new(
                    "CONFIG/EMPTY_PASSWORD",
                    "Default administrator password must not be empty",
                )
                .with_context("env", ENV_ADMIN_PASSWORD));
            }
            admin.password = password;
        }

        Ok(Self {
            storage,
            admin,
            log_dir: non_empty(ENV_LOG_DIR).map(PathBuf::from),
        })
    }

    /// The file whose parent directory must exist before opening.
    pub fn backing_path(&self) -> Option<&Path> {
        match &self.storage {
            StorageMode::File(path) => Some(path),
            StorageMode::Memory { snapshot } => snapshot.as_deref(),
        }
    }
}

pub fn default_data_dir() -> AppResult<PathBuf> {
    let base = match dirs::data_dir() {
        Some(dir) => dir,
        None => env::current_dir()?,
    };
    Ok(base.join(APP_IDENTIFIER))
}
