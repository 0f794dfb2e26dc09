//! Random temporary identifiers used for rebuild scratch tables and for
//! the two-step case-only table rename.

use rand::Rng;

pub fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..10).map(|_| rng.sample(rand::distributions::Alphanumeric) as char).collect()
}

pub fn temp_table_name(base: &str) -> String {
    format!("_migrator_new_{base}_{}", random_suffix())
}

pub fn temp_rename_name(base: &str) -> String {
    format!("_migrator_tmp_{base}_{}", random_suffix())
}

/// SQLite identifiers compare case-insensitively, so `ALTER TABLE a RENAME
/// TO A` is a no-op; a case-only change must go through a distinct
/// intermediate name first.
pub fn is_case_only_rename(old: &str, new: &str) -> bool {
    old != new && old.eq_ignore_ascii_case(new)
}
