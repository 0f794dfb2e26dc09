//! Shared types for the schema migration engine: the schema model every
//! connector describes and diffs, the diff result shape, the action-policy
//! protocol, and the error taxonomy raised across `make`/`migrate`/`status`.

mod error;
mod policy;
mod schema;

pub use error::{ManualReason, MigrationError, Result};
pub use policy::{ActionCategory, ActionPolicy, PromptReply, Prompter};
pub use schema::{
    ColumnInfo, DatabaseSchema, DiffResult, ForeignKeyRef, KindDiff, ObjectKind, PragmaSnapshot,
    RenameMap, SchemaObject,
};

/// File-format timestamp used for `applied_at`, matching SQLite's
/// `strftime('%Y-%m-%d %H:%M:%f','now')` default.
pub fn now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}
