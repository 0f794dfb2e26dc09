//! The migration engine's orchestration layer: configuration, the
//! on-disk migration file registry, the live applied-migrations store,
//! the serialized migration-file format, and the `make`/`migrate`/
//! `status` state machine that ties them to the SQLite differ.

mod config;
mod migrator;
mod plan;
mod registry;
mod store;

pub use config::Config;
pub use migrator::{MigrateReport, Migrator, StatusReport, Target};
pub use plan::{Plan, SnapshotPolicy, StoredPolicy};
pub use registry::{MigrationFile, Registry};
pub use store::{AppliedMigration, Store};
