//! Pure queries against `sqlite_master` and `PRAGMA`, returning ordered
//! mappings from object name to normalized DDL. Never mutates the
//! connection it is given.

use crate::normalize::{normalize, normalize_case_insensitive};
use indexmap::IndexMap;
use rusqlite::Connection;
use schema_connector::{ColumnInfo, DatabaseSchema, ForeignKeyRef, MigrationError, ObjectKind, Result, SchemaObject};

/// Introspects every table, virtual table, view, index and trigger visible
/// on `conn`, plus the per-table column info and the full pragma snapshot.
///
/// When `ignore_name_case` is set, object names are lower-cased after
/// normalization and the normalized body is rewritten to reference the
/// lower-cased name.
pub fn describe(conn: &Connection, ignore_name_case: bool) -> Result<DatabaseSchema> {
    let mut schema = DatabaseSchema::default();

    let mut stmt = conn.prepare(
        "SELECT type, name, sql FROM sqlite_master \
         WHERE sql IS NOT NULL AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
         ORDER BY rowid",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    for row in rows {
        let (kind, name, sql) = row?;
        let is_virtual_table = kind == "table" && is_virtual_table_ddl(&sql);
        let object_kind = match kind.as_str() {
            "table" if is_virtual_table => ObjectKind::VirtualTable,
            "table" => ObjectKind::Table,
            "view" => ObjectKind::View,
            "index" => ObjectKind::Index,
            "trigger" => ObjectKind::Trigger,
            _ => continue,
        };

        let (stored_name, normalized) = if ignore_name_case {
            (name.to_lowercase(), normalize_case_insensitive(&sql, &name))
        } else {
            (name.clone(), normalize(&sql))
        };

        schema.objects_mut(object_kind).insert(
            stored_name.clone(),
            SchemaObject {
                name: stored_name,
                normalized_ddl: normalized,
            },
        );
    }

    for kind in [ObjectKind::Table, ObjectKind::VirtualTable] {
        let names: Vec<String> = schema.objects(kind).keys().cloned().collect();
        for table in names {
            let columns = get_column_info(conn, &table)?;
            schema.columns.insert(table, columns);
        }
    }

    schema.pragmas = read_all_pragmas(conn)?;

    Ok(schema)
}

/// `CREATE VIRTUAL TABLE ...` detection: case-insensitive prefix match on
/// the DDL, ignoring leading whitespace.
fn is_virtual_table_ddl(sql: &str) -> bool {
    sql.trim_start().to_ascii_uppercase().starts_with("CREATE VIRTUAL TABLE")
}

/// Merges `PRAGMA table_info(table)` and `PRAGMA foreign_key_list(table)`,
/// keyed by column name, into one record per column.
pub fn get_column_info(conn: &Connection, table: &str) -> Result<IndexMap<String, ColumnInfo>> {
    let mut columns = IndexMap::new();

    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>("name")?,
            row.get::<_, String>("type")?,
            row.get::<_, i64>("notnull")? != 0,
            row.get::<_, Option<String>>("dflt_value")?,
            row.get::<_, i64>("pk")? as u32,
        ))
    })?;
    for row in rows {
        let (name, sql_type, not_null, default, pk_position) = row?;
        columns.insert(
            name.clone(),
            ColumnInfo {
                name,
                sql_type,
                not_null,
                default,
                pk_position,
                foreign_key: None,
            },
        );
    }

    let mut fk_stmt = conn.prepare(&format!("PRAGMA foreign_key_list({})", quote_ident(table)))?;
    let fk_rows = fk_stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>("from")?,
            row.get::<_, String>("table")?,
            row.get::<_, String>("to")?,
        ))
    })?;
    for row in fk_rows {
        let (from_column, ref_table, ref_column) = row?;
        if let Some(col) = columns.get_mut(&from_column) {
            col.foreign_key = Some(ForeignKeyRef {
                table: ref_table,
                column: ref_column,
            });
        }
    }

    Ok(columns)
}

/// The full pragma snapshot, unordered name -> scalar. Only pragmas with a
/// single-column scalar result are read this way; `foreign_key_list`/
/// `table_info` are handled separately as they are per-table.
const SCALAR_PRAGMAS: &[&str] = &[
    "journal_mode",
    "foreign_keys",
    "synchronous",
    "encoding",
    "auto_vacuum",
    "cache_size",
    "temp_store",
    "user_version",
    "application_id",
];

fn read_all_pragmas(conn: &Connection) -> Result<std::collections::BTreeMap<String, String>> {
    let mut snapshot = std::collections::BTreeMap::new();
    for name in SCALAR_PRAGMAS {
        if let Some(value) = read_pragma(conn, name)? {
            snapshot.insert((*name).to_owned(), value);
        }
    }
    Ok(snapshot)
}

/// Reads one scalar pragma's current value, or `None` if the pragma
/// returned no row.
pub fn read_pragma(conn: &Connection, name: &str) -> Result<Option<String>> {
    let sql = format!("PRAGMA {name}");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => {
            let value: String = row
                .get_ref(0)
                .map_err(|e| MigrationError::Sqlite(e.into()))?
                .as_str()
                .map(str::to_owned)
                .or_else(|_| row.get::<_, i64>(0).map(|n| n.to_string()))
                .unwrap_or_default();
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn_with(sql: &str) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(sql).unwrap();
        conn
    }

    #[test]
    fn describes_a_simple_table() {
        let conn = conn_with("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)");
        let schema = describe(&conn, false).unwrap();
        assert!(schema.tables.contains_key("users"));
        let cols = &schema.columns["users"];
        assert_eq!(cols["id"].pk_position, 1);
        assert_eq!(cols["name"].pk_position, 0);
    }

    #[test]
    fn skips_sqlite_internal_tables() {
        let conn = conn_with("CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT)");
        let schema = describe(&conn, false).unwrap();
        assert!(!schema.tables.contains_key("sqlite_sequence"));
    }

    #[test]
    fn detects_foreign_keys() {
        let conn = conn_with(
            "CREATE TABLE parent (id INTEGER PRIMARY KEY);\
             CREATE TABLE child (id INTEGER PRIMARY KEY, parent_id INTEGER REFERENCES parent(id));",
        );
        let schema = describe(&conn, false).unwrap();
        let fk = schema.columns["child"]["parent_id"].foreign_key.as_ref().unwrap();
        assert_eq!(fk.table, "parent");
        assert_eq!(fk.column, "id");
    }

    #[test]
    fn ignore_name_case_lowercases_stored_key() {
        let conn = conn_with("CREATE TABLE Users (id INTEGER)");
        let schema = describe(&conn, true).unwrap();
        assert!(schema.tables.contains_key("users"));
        assert!(!schema.tables.contains_key("Users"));
    }
}
