use thiserror::Error;

pub type Result<T> = std::result::Result<T, MigrationError>;

/// One deferred rename/destructive decision, accumulated while diffing and
/// surfaced together at the end of a `make` call.
#[derive(Debug, Clone)]
pub struct ManualReason(pub String);

impl std::fmt::Display for ManualReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "- {}", self.0)
    }
}

/// The engine's error taxonomy. Each variant carries the
/// triggering cause; none of them are swallowed internally.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Invalid options, a missing file, an unknown target, a reserved table
    /// name reused in the schema file, an invalid prompt response, or an
    /// unknown action string. Raised eagerly, before any I/O against the
    /// live database.
    #[error("{0}")]
    Validation(String),

    /// One or more rename/destructive decisions were deferred to a human.
    /// The message is the bulleted reason list; the migration file itself
    /// may still have been written, per `createOnManualMigration`.
    #[error("the following changes require a manual migration:\n{}", join_reasons(.0))]
    ManualMigrationRequired(Vec<ManualReason>),

    /// Any failure inside `migrate`'s transaction. The transaction has
    /// already been rolled back by the time this is raised, so the live
    /// database is guaranteed to equal its pre-call state.
    #[error("migration rolled back: {source}")]
    RolledBack {
        #[source]
        source: Box<MigrationError>,
    },

    /// `PRAGMA integrity_check` or `PRAGMA foreign_key_check` failed after
    /// commit. Not rolled back; the caller must re-migrate.
    #[error("integrity check failed: {0:?}")]
    Integrity(Vec<String>),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Parse(String),
}

fn join_reasons(reasons: &[ManualReason]) -> String {
    reasons
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

impl MigrationError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn rolled_back(source: MigrationError) -> Self {
        Self::RolledBack {
            source: Box::new(source),
        }
    }
}
