//! Strips the `CREATE <KEYWORD> "name"` header off a normalized DDL string,
//! leaving the structural body used for rename detection: two objects with
//! the same body under different names are treated as a rename rather than
//! a drop-and-recreate.

use once_cell::sync::Lazy;
use regex::Regex;

fn header_re(keyword: &str) -> Regex {
    Regex::new(&format!(
        r#"(?i)^CREATE\s+(?:VIRTUAL\s+)?{keyword}\s+(?:IF\s+NOT\s+EXISTS\s+)?"?[A-Za-z_][A-Za-z0-9_]*"?\s*"#
    ))
    .unwrap()
}

static TABLE_HEADER: Lazy<Regex> = Lazy::new(|| header_re("TABLE"));
static VIEW_HEADER: Lazy<Regex> = Lazy::new(|| header_re("VIEW"));
static TRIGGER_HEADER: Lazy<Regex> = Lazy::new(|| header_re("TRIGGER"));
static INDEX_HEADER: Lazy<Regex> = Lazy::new(|| header_re("INDEX"));

fn header_name_re(keyword: &str) -> Regex {
    Regex::new(&format!(
        r#"(?i)^(CREATE\s+(?:VIRTUAL\s+)?{keyword}\s+(?:IF\s+NOT\s+EXISTS\s+)?)"?([A-Za-z_][A-Za-z0-9_]*)"?(\s*)"#
    ))
    .unwrap()
}

static TABLE_HEADER_NAME: Lazy<Regex> = Lazy::new(|| header_name_re("TABLE"));

/// The column-list-and-constraints body of a (possibly virtual) table,
/// with the `CREATE TABLE "name"` header removed.
pub fn table_body(normalized_ddl: &str) -> String {
    TABLE_HEADER.replace(normalized_ddl, "").into_owned()
}

pub fn view_body(normalized_ddl: &str) -> String {
    VIEW_HEADER.replace(normalized_ddl, "").into_owned()
}

pub fn trigger_body(normalized_ddl: &str) -> String {
    TRIGGER_HEADER.replace(normalized_ddl, "").into_owned()
}

pub fn index_body(normalized_ddl: &str) -> String {
    INDEX_HEADER.replace(normalized_ddl, "").into_owned()
}

/// Rewrites the name token in a `CREATE [VIRTUAL] TABLE "name"` header to
/// `new_name`, leaving `IF NOT EXISTS` and the rest of the DDL untouched.
/// Unlike a literal substring replace, this only ever touches the header's
/// name token, so an occurrence of `new_name`/`name` elsewhere in the body
/// (a column or constraint name, say) is never corrupted.
pub fn retarget_table_name(normalized_ddl: &str, new_name: &str) -> String {
    TABLE_HEADER_NAME
        .replace(normalized_ddl, |caps: &regex::Captures| format!("{}\"{}\"{}", &caps[1], new_name, &caps[3]))
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_table_header() {
        assert_eq!(table_body("CREATE TABLE users(id INTEGER)"), "(id INTEGER)");
    }

    #[test]
    fn rename_soundness_example() {
        let old = table_body("CREATE TABLE users(id INTEGER, name TEXT)");
        let new = table_body("CREATE TABLE people(id INTEGER, name TEXT)");
        assert_eq!(old, new);
    }

    #[test]
    fn retarget_preserves_body_even_when_name_is_a_substring_earlier_in_the_ddl() {
        // "create" contains "e", the table's own name: a naive substring
        // replace on the whole DDL would corrupt the keyword itself.
        let ddl = r#"CREATE TABLE "e" ("id" INTEGER, FOREIGN KEY ("id") REFERENCES "e" ("id"))"#;
        let retargeted = retarget_table_name(ddl, "tmp_e");
        assert_eq!(
            retargeted,
            r#"CREATE TABLE "tmp_e" ("id" INTEGER, FOREIGN KEY ("id") REFERENCES "e" ("id"))"#
        );
    }

    #[test]
    fn retarget_preserves_if_not_exists_and_virtual() {
        let ddl = r#"CREATE VIRTUAL TABLE IF NOT EXISTS "docs" USING fts5(body)"#;
        let retargeted = retarget_table_name(ddl, "tmp_docs");
        assert_eq!(retargeted, r#"CREATE VIRTUAL TABLE IF NOT EXISTS "tmp_docs" USING fts5(body)"#);
    }
}
