//! In `only_track_ambiguous_state` mode, `make` does not write a
//! migration file for every schema change: it only records a schema
//! snapshot when it detects a rename that an automatic diff could not
//! otherwise distinguish from a drop-and-recreate.

use schema_core::Target;
use sql_migration_tests::{proceed, table_exists, TestProject};

#[test]
fn ambiguous_mode_skips_snapshot_when_nothing_is_ambiguous() {
    let mut project = TestProject::new("CREATE TABLE a (id INTEGER PRIMARY KEY);");
    project.config.only_track_ambiguous_state = true;
    let mut migrator = project.migrator();

    migrator.make(&proceed()).unwrap();
    migrator.migrate(Target::Latest, &proceed()).unwrap();

    project.set_schema("CREATE TABLE a (id INTEGER PRIMARY KEY);\nCREATE TABLE b (id INTEGER PRIMARY KEY);");
    migrator.make(&proceed()).unwrap();
    migrator.migrate(Target::Latest, &proceed()).unwrap();

    let conn = project.live_connection();
    assert!(table_exists(&conn, "a"));
    assert!(table_exists(&conn, "b"));
}

#[test]
fn ambiguous_mode_records_a_snapshot_for_a_table_rename() {
    let mut project = TestProject::new("CREATE TABLE widgets (id INTEGER PRIMARY KEY);");
    project.config.only_track_ambiguous_state = true;
    let mut migrator = project.migrator();

    migrator.make(&proceed()).unwrap();
    migrator.migrate(Target::Latest, &proceed()).unwrap();

    // The live database is left untouched at "widgets"; only the
    // declarative schema is edited. Since the live db is still at the
    // latest applied migration, `make` diffs it directly against the new
    // schema before the usual replay-vs-schema diff, recognizes this as a
    // pure rename, and records a schema-snapshot migration rather than an
    // ordinary `ALTER TABLE ... RENAME` one.
    project.set_schema("CREATE TABLE gadgets (id INTEGER PRIMARY KEY);");

    migrator.make(&proceed()).unwrap();

    let migrations_dir = project.migrations_path();
    let has_snapshot = std::fs::read_dir(&migrations_dir)
        .unwrap()
        .any(|e| e.unwrap().file_name().to_string_lossy().contains("schema_snapshot"));
    assert!(has_snapshot);
}
