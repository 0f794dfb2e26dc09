use std::fs;
use std::process::Command;

fn bin_path() -> &'static str {
    env!("CARGO_BIN_EXE_schema-engine")
}

fn run(dir: &std::path::Path, args: &[&str]) -> std::process::Output {
    Command::new(bin_path())
        .current_dir(dir)
        .arg("--config")
        .arg("migrator.toml")
        .args(args)
        .output()
        .expect("failed to run schema-engine")
}

fn write_config(dir: &std::path::Path) {
    fs::write(
        dir.join("migrator.toml"),
        "db_path = \"db.sqlite3\"\n\
         migrations_path = \"migrations\"\n\
         schema_path = \"schema.sql\"\n\
         create_db_if_missing = true\n\
         on_rename = \"proceed\"\n\
         on_destructive_change = \"proceed\"\n",
    )
    .unwrap();
}

#[test]
fn make_then_migrate_then_status() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path());
    fs::write(dir.path().join("schema.sql"), "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);").unwrap();

    let make_output = run(dir.path(), &["make"]);
    assert!(make_output.status.success(), "{:?}", make_output);

    let migrate_output = run(dir.path(), &["migrate", "latest"]);
    assert!(migrate_output.status.success(), "{:?}", migrate_output);

    let status_output = run(dir.path(), &["status"]);
    assert!(status_output.status.success(), "{:?}", status_output);
    let stdout = String::from_utf8_lossy(&status_output.stdout);
    assert!(stdout.contains("current migration: 0000"));
}

#[test]
fn dry_run_migrate_does_not_touch_the_database() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path());
    fs::write(dir.path().join("schema.sql"), "CREATE TABLE users (id INTEGER PRIMARY KEY);").unwrap();

    let make_output = run(dir.path(), &["make"]);
    assert!(make_output.status.success(), "{:?}", make_output);

    let dry_run_output = run(dir.path(), &["migrate", "latest", "--dry-run"]);
    assert!(dry_run_output.status.success(), "{:?}", dry_run_output);
    let stdout = String::from_utf8_lossy(&dry_run_output.stdout);
    assert!(stdout.contains("[dry run]"));

    let status_output = run(dir.path(), &["status"]);
    let stdout = String::from_utf8_lossy(&status_output.stdout);
    assert!(stdout.contains("current migration: zero"));
}

#[test]
fn unknown_command_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path());
    fs::write(dir.path().join("schema.sql"), "CREATE TABLE t (id INTEGER);").unwrap();

    let output = run(dir.path(), &["bogus-command"]);
    assert!(!output.status.success());
}
