//! SQLite-backed application store for the Kestrel browser.
//!
//! The store is brought to a current shape at startup in two phases. The
//! synchronous phase applies the idempotent base schema and runs structural
//! migrations (column adds and table rebuilds, decided by introspecting live
//! column sets; there is no migration-version table). Only after it completes
//! may the domain repositories issue queries. The second phase imports
//! settings from an older store file, best-effort, on a background task
//! bounded by a timeout; it enriches the store eventually and is never a
//! startup dependency.

pub mod config;
pub mod db;
pub mod error;
pub mod repo;
pub mod startup;

pub use config::{AppConfig, StoreConfig};
pub use error::MigrationError;
pub use startup::store::{init_store, ImportStatus, ImportTask, StoreBundle};

#[cfg(test)]
mod integration_tests;
