//! The applied-migrations table: a reserved, caller-named SQLite table
//! tracking which migrations have been run against the live database, plus
//! materialization of applied rows back out to scratch files so their
//! `up`/`down` content can be reparsed during undo.

use rusqlite::Connection;
use schema_connector::{now_iso, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[derive(Debug, Clone)]
pub struct AppliedMigration {
    pub id: String,
    pub name: String,
    pub applied_at: String,
    pub content_hash: String,
    pub content: String,
}

pub struct Store {
    table: String,
}

impl Store {
    pub fn new(table: impl Into<String>) -> Self {
        Self { table: table.into() }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Creates the table on first use. Idempotent.
    pub fn ensure_table(&self, conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (\
                id TEXT PRIMARY KEY, \
                name TEXT NOT NULL, \
                applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f','now')), \
                content_hash TEXT NOT NULL, \
                content TEXT NOT NULL\
            )",
            table = self.table
        ))?;
        Ok(())
    }

    pub fn load_all(&self, conn: &Connection) -> Result<Vec<AppliedMigration>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT id, name, applied_at, content_hash, content FROM \"{}\" ORDER BY id",
            self.table
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok(AppliedMigration {
                id: row.get(0)?,
                name: row.get(1)?,
                applied_at: row.get(2)?,
                content_hash: row.get(3)?,
                content: row.get(4)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn insert(&self, conn: &Connection, id: &str, name: &str, content_hash: &str, content: &str) -> Result<()> {
        conn.execute(
            &format!(
                "INSERT INTO \"{}\" (id, name, applied_at, content_hash, content) VALUES (?1, ?2, ?3, ?4, ?5)",
                self.table
            ),
            rusqlite::params![id, name, now_iso(), content_hash, content],
        )?;
        Ok(())
    }

    pub fn delete(&self, conn: &Connection, id: &str) -> Result<()> {
        conn.execute(&format!("DELETE FROM \"{}\" WHERE id = ?1", self.table), [id])?;
        Ok(())
    }

    pub fn table_exists(&self, conn: &Connection) -> Result<bool> {
        let mut stmt = conn.prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
        Ok(stmt.exists([&self.table])?)
    }

    /// Writes every applied row's content out to `{id}_{name}.toml` under a
    /// fresh temp directory created inside `migrations_dir`, so its plan
    /// can be reparsed the same way an on-disk migration file would be.
    /// The caller is responsible for dropping the returned [`TempDir`]
    /// (and thereby removing it) once the operation finishes, success or
    /// not.
    pub fn materialize(&self, applied: &[AppliedMigration], migrations_dir: &Path) -> Result<(TempDir, Vec<PathBuf>)> {
        let temp = tempfile::Builder::new().prefix("migrator-tmp-").tempdir_in(migrations_dir)?;
        let mut paths = Vec::new();
        for migration in applied {
            let path = temp.path().join(format!("{}_{}.toml", migration.id, migration.name));
            std::fs::write(&path, &migration.content)?;
            paths.push(path);
        }
        Ok((temp, paths))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_table_and_round_trips_a_row() {
        let conn = Connection::open_in_memory().unwrap();
        let store = Store::new("migrations");
        store.ensure_table(&conn).unwrap();
        store.insert(&conn, "0000", "create_users", "abc123", "kind=\"standard\"\n").unwrap();

        let rows = store.load_all(&conn).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "0000");
        assert_eq!(rows[0].name, "create_users");

        store.delete(&conn, "0000").unwrap();
        assert!(store.load_all(&conn).unwrap().is_empty());
    }

    #[test]
    fn materializes_rows_to_temp_files() {
        let conn = Connection::open_in_memory().unwrap();
        let store = Store::new("migrations");
        store.ensure_table(&conn).unwrap();
        store.insert(&conn, "0000", "create_users", "abc123", "kind=\"standard\"\nup=[]\ndown=[]\n").unwrap();
        let applied = store.load_all(&conn).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let (_temp, paths) = store.materialize(&applied, dir.path()).unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].exists());
    }
}
