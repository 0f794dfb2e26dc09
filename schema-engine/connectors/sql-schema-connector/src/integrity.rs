//! Post-commit integrity verification: `PRAGMA integrity_check` and
//! `PRAGMA foreign_key_check`, run after a migration has already been
//! committed. A failure here does not roll anything back — the change is
//! live — it only surfaces what needs attention before the database is
//! trusted again.

use rusqlite::Connection;
use schema_connector::{MigrationError, Result};
use tracing::info_span;

/// Runs both checks and returns `Ok(())` if the database is sound, or
/// `Err(MigrationError::Integrity(problems))` listing every row SQLite
/// reported.
pub fn verify(conn: &Connection) -> Result<()> {
    let _span = info_span!("verify_integrity").entered();

    let mut problems = Vec::new();
    problems.extend(integrity_check(conn)?);
    problems.extend(foreign_key_check(conn)?);

    if problems.is_empty() {
        Ok(())
    } else {
        Err(MigrationError::Integrity(problems))
    }
}

fn integrity_check(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("PRAGMA integrity_check")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut problems = Vec::new();
    for row in rows {
        let message = row?;
        if message != "ok" {
            problems.push(message);
        }
    }
    Ok(problems)
}

fn foreign_key_check(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Option<i64>>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<i64>>(3)?,
        ))
    })?;
    let mut problems = Vec::new();
    for row in rows {
        let (table, rowid, parent, fkid) = row?;
        let rowid = rowid.map(|r| r.to_string()).unwrap_or_else(|| "?".to_owned());
        problems.push(format!(
            "foreign key violation in table '{table}' (rowid {rowid}) referencing '{parent}' (fk index {fkid:?})"
        ));
    }
    Ok(problems)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_on_a_sound_database() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY)").unwrap();
        assert!(verify(&conn).is_ok());
    }

    #[test]
    fn catches_foreign_key_violation() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "PRAGMA foreign_keys = OFF;\
             CREATE TABLE parent (id INTEGER PRIMARY KEY);\
             CREATE TABLE child (id INTEGER PRIMARY KEY, parent_id INTEGER REFERENCES parent(id));\
             INSERT INTO child (id, parent_id) VALUES (1, 99);",
        )
        .unwrap();

        let err = verify(&conn).unwrap_err();
        match err {
            MigrationError::Integrity(problems) => assert!(!problems.is_empty()),
            other => panic!("expected Integrity error, got {other:?}"),
        }
    }
}
