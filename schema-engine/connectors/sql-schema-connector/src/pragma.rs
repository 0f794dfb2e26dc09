//! Applies a declared pragma snapshot to a live database, then verifies it
//! stuck by re-reading each value back through a second connection opened
//! against the same file. Some pragmas (`journal_mode` under certain VFS
//! configurations, `encoding` on a non-empty database) silently refuse to
//! change; a same-connection read-back would not catch that.

use rusqlite::Connection;
use schema_connector::{MigrationError, Result};
use sql_schema_describer::read_pragma;
use std::collections::BTreeMap;
use tracing::{info_span, warn};

/// Sets every pragma in `desired` on `conn`, then opens a fresh connection
/// to `db_path` and confirms each value matches. Returns the names of any
/// pragma whose value did not take, rather than failing outright: the
/// caller decides whether a pragma mismatch blocks the migration.
pub fn apply_and_verify(conn: &Connection, db_path: &str, desired: &BTreeMap<String, String>) -> Result<Vec<String>> {
    let _span = info_span!("apply_pragmas").entered();

    for (name, value) in desired {
        let sql = format!("PRAGMA {name} = {value}");
        conn.execute_batch(&sql)?;
    }

    let verify_conn = Connection::open(db_path).map_err(MigrationError::from)?;
    let mut mismatched = Vec::new();
    for (name, expected) in desired {
        let actual = read_pragma(&verify_conn, name)?;
        match actual {
            Some(actual) if values_equivalent(&actual, expected) => {}
            Some(actual) => {
                warn!(pragma = name, expected, actual, "pragma value did not take");
                mismatched.push(name.clone());
            }
            None => {
                warn!(pragma = name, "pragma produced no value on verification connection");
                mismatched.push(name.clone());
            }
        }
    }
    Ok(mismatched)
}

/// `journal_mode` and similar pragmas echo back a lower-cased string
/// regardless of how the caller capitalized it; compare case-insensitively
/// so `WAL` and `wal` are not treated as a mismatch.
fn values_equivalent(actual: &str, expected: &str) -> bool {
    actual.eq_ignore_ascii_case(expected.trim_matches(|c| c == '\'' || c == '"'))
}
