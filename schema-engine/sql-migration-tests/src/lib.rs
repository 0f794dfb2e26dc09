//! Shared fixtures for the end-to-end migration tests in `tests/`: a
//! scratch directory with a config file and schema file already wired
//! up, and a prompter that answers every prompt the same way.

use rusqlite::Connection;
use schema_connector::{FixedPrompter, PromptReply};
use schema_core::{Config, Migrator};
use std::path::PathBuf;
use tempfile::TempDir;

pub struct TestProject {
    pub dir: TempDir,
    pub config: Config,
}

impl TestProject {
    /// Creates a scratch project whose declarative schema is `schema_sql`.
    pub fn new(schema_sql: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let schema_path = dir.path().join("schema.sql");
        std::fs::write(&schema_path, schema_sql).unwrap();
        let config = Config {
            db_path: dir.path().join("db.sqlite3"),
            migrations_path: dir.path().join("migrations"),
            schema_path,
            create_db_if_missing: true,
            ..Config::default()
        };
        Self { dir, config }
    }

    /// Rewrites the declarative schema file in place, for simulating an
    /// edit between two `make` calls.
    pub fn set_schema(&self, schema_sql: &str) {
        std::fs::write(&self.config.schema_path, schema_sql).unwrap();
    }

    pub fn migrations_path(&self) -> PathBuf {
        self.config.migrations_path.clone()
    }

    pub fn migrator(&self) -> Migrator {
        Migrator::open(self.config.clone()).unwrap()
    }

    pub fn live_connection(&self) -> Connection {
        Connection::open(&self.config.db_path).unwrap()
    }
}

pub fn proceed() -> FixedPrompter {
    FixedPrompter(PromptReply::Proceed)
}

pub fn skip() -> FixedPrompter {
    FixedPrompter(PromptReply::Skip)
}

pub fn manual() -> FixedPrompter {
    FixedPrompter(PromptReply::Manual)
}

pub fn table_exists(conn: &Connection, name: &str) -> bool {
    conn.query_row(
        "SELECT 1 FROM sqlite_schema WHERE type = 'table' AND name = ?1",
        [name],
        |_| Ok(()),
    )
    .is_ok()
}

pub fn column_names(conn: &Connection, table: &str) -> Vec<String> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})")).unwrap();
    stmt.query_map([], |row| row.get::<_, String>(1))
        .unwrap()
        .map(|r| r.unwrap())
        .collect()
}

fn schema_object_exists(conn: &Connection, sqlite_type: &str, name: &str) -> bool {
    conn.query_row(
        "SELECT 1 FROM sqlite_schema WHERE type = ?1 AND name = ?2",
        [sqlite_type, name],
        |_| Ok(()),
    )
    .is_ok()
}

pub fn view_exists(conn: &Connection, name: &str) -> bool {
    schema_object_exists(conn, "view", name)
}

pub fn trigger_exists(conn: &Connection, name: &str) -> bool {
    schema_object_exists(conn, "trigger", name)
}

pub fn index_exists(conn: &Connection, name: &str) -> bool {
    schema_object_exists(conn, "index", name)
}
