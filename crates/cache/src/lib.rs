//! Record cache for provenant
//!
//! This crate provides:
//! - [`CacheBackend`] implementations: one JSON file per record with a uid
//!   index ([`FileCacheBackend`]), in-memory ([`MemoryCacheBackend`]) and a
//!   read-only view over legacy result files ([`LegacyFileSystemBackend`])
//! - [`Cache`]: exact lookups, migration lineage and compute-or-fetch
//! - [`MigrationEngine`]: selector gated schema migrations

pub mod backend;
pub mod cache;
pub mod migration;

pub use backend::{CacheBackend, FileCacheBackend, LegacyFileSystemBackend, MemoryCacheBackend};
pub use cache::Cache;
pub use migration::{Migration, MigrationEngine, MigrationReport, MigrationStep, MAX_MIGRATION_STEPS};
