//! Data core for an offline, single-device shop: schema upgrades, seed data,
//! the inventory ledger and shopping-list reconciliation.

pub mod auth;
pub mod config;
pub mod db;
mod error;
pub mod ledger;
pub mod logging;
pub mod metadata;
pub mod migrate;
pub mod model;
pub mod quantity;
pub mod reconcile;
pub mod seed;
pub mod state;
pub mod time;

pub use auth::{Argon2Hasher, PasswordHasher};
pub use config::{StorageMode, StoreConfig};
pub use error::{AppError, AppResult};
pub use logging::{init_logging, init_logging_with_file};
pub use state::{BootReport, Store};
