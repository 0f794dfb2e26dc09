//! Coverage of the four-valued action policy: a destructive column drop
//! can proceed, be skipped, or be forced into a manual migration,
//! depending on what the prompter (or a fixed config policy) decides.

use schema_connector::{ActionPolicy, MigrationError};
use schema_core::Target;
use sql_migration_tests::{column_names, manual, proceed, skip, TestProject};

#[test]
fn destructive_drop_proceeds_when_policy_allows() {
    let project = TestProject::new("CREATE TABLE t (id INTEGER PRIMARY KEY, junk TEXT);");
    let mut migrator = project.migrator();
    migrator.make(&proceed()).unwrap();
    migrator.migrate(Target::Latest, &proceed()).unwrap();

    project.set_schema("CREATE TABLE t (id INTEGER PRIMARY KEY);");
    migrator.make(&proceed()).unwrap();
    migrator.migrate(Target::Latest, &proceed()).unwrap();

    let conn = project.live_connection();
    assert_eq!(column_names(&conn, "t"), vec!["id"]);
}

#[test]
fn destructive_drop_requires_manual_migration_when_policy_demands_it() {
    let mut config_project = TestProject::new("CREATE TABLE t (id INTEGER PRIMARY KEY, junk TEXT);");
    config_project.config.on_destructive_change = ActionPolicy::RequireManualMigration;
    let mut migrator = config_project.migrator();
    migrator.make(&proceed()).unwrap();
    migrator.migrate(Target::Latest, &proceed()).unwrap();

    config_project.set_schema("CREATE TABLE t (id INTEGER PRIMARY KEY);");
    let err = migrator.make(&proceed()).unwrap_err();
    assert!(matches!(err, MigrationError::ManualMigrationRequired(_)));
}

#[test]
fn manual_migration_file_is_written_only_when_configured_to() {
    let mut config_project = TestProject::new("CREATE TABLE t (id INTEGER PRIMARY KEY, junk TEXT);");
    config_project.config.on_destructive_change = ActionPolicy::RequireManualMigration;
    let mut migrator = config_project.migrator();
    migrator.make(&proceed()).unwrap();
    migrator.migrate(Target::Latest, &proceed()).unwrap();

    config_project.set_schema("CREATE TABLE t (id INTEGER PRIMARY KEY);");
    migrator.make(&proceed()).unwrap_err();
    let files_without_flag = std::fs::read_dir(config_project.migrations_path()).unwrap().count();
    assert_eq!(files_without_flag, 1, "create_on_manual_migration defaults to false: no second file");

    config_project.config.create_on_manual_migration = true;
    let mut migrator = config_project.migrator();
    migrator.make(&proceed()).unwrap_err();
    let files_with_flag = std::fs::read_dir(config_project.migrations_path()).unwrap().count();
    assert_eq!(files_with_flag, 2, "create_on_manual_migration=true writes the file despite the error");
}

#[test]
fn prompt_reply_of_manual_also_requires_manual_migration() {
    let mut config_project = TestProject::new("CREATE TABLE t (id INTEGER PRIMARY KEY, junk TEXT);");
    config_project.config.on_destructive_change = ActionPolicy::Prompt;
    let mut migrator = config_project.migrator();
    migrator.make(&proceed()).unwrap();
    migrator.migrate(Target::Latest, &proceed()).unwrap();

    config_project.set_schema("CREATE TABLE t (id INTEGER PRIMARY KEY);");
    let err = migrator.make(&manual()).unwrap_err();
    assert!(matches!(err, MigrationError::ManualMigrationRequired(_)));
}

#[test]
fn prompt_reply_of_skip_leaves_column_in_place() {
    let mut config_project = TestProject::new("CREATE TABLE t (id INTEGER PRIMARY KEY, junk TEXT);");
    config_project.config.on_destructive_change = ActionPolicy::Prompt;
    let mut migrator = config_project.migrator();
    migrator.make(&proceed()).unwrap();
    migrator.migrate(Target::Latest, &proceed()).unwrap();

    config_project.set_schema("CREATE TABLE t (id INTEGER PRIMARY KEY);");
    migrator.make(&skip()).unwrap();
    migrator.migrate(Target::Latest, &proceed()).unwrap();

    let conn = config_project.live_connection();
    assert_eq!(column_names(&conn, "t"), vec!["id", "junk"]);
}
