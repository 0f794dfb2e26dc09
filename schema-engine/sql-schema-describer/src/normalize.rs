//! Canonicalizes `sqlite_master.sql` strings so textual equality reflects
//! semantic equality.

use once_cell::sync::Lazy;
use regex::Regex;

static LINE_COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"--[^\n]*\n?").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static PUNCT_SPACING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r" *([(),]) *").unwrap());
static BARE_IDENT_QUOTES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([A-Za-z_][A-Za-z0-9_]*)""#).unwrap());

/// Canonicalize one `sqlite_master.sql` string. Total and deterministic:
/// the same input always normalizes to the same output, and normalizing a
/// normalized string is a no-op (`normalize(normalize(x)) == normalize(x)`).
///
/// Steps, in order:
/// 1. strip line comments
/// 2. collapse whitespace runs to one space
/// 3. remove spaces adjacent to `(`, `)`, `,`
/// 4. unwrap double-quotes around a bare identifier
/// 5. trim
pub fn normalize(raw: &str) -> String {
    let no_comments = LINE_COMMENT_RE.replace_all(raw, "\n");
    let collapsed = WHITESPACE_RE.replace_all(&no_comments, " ");
    let tight = PUNCT_SPACING_RE.replace_all(&collapsed, "$1");
    let unquoted = BARE_IDENT_QUOTES_RE.replace_all(&tight, "$1");
    unquoted.trim().to_owned()
}

/// Applies `ignoreNameCase` on top of [`normalize`]: lower-cases `name`
/// wherever it appears as a standalone token in the already-normalized
/// body. Only called when the engine is configured to ignore name case;
/// the object's own stored key is lower-cased by the caller separately.
pub fn normalize_case_insensitive(raw: &str, name: &str) -> String {
    let normalized = normalize(raw);
    if name.is_empty() {
        return normalized;
    }
    let token_re = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(name))).unwrap();
    token_re.replace_all(&normalized, name.to_lowercase()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_comments() {
        let sql = "CREATE TABLE t (\n  -- a comment\n  id INTEGER\n)";
        assert_eq!(normalize(sql), "CREATE TABLE t (id INTEGER)");
    }

    #[test]
    fn collapses_whitespace() {
        let sql = "CREATE   TABLE\nt  (id   INTEGER)";
        assert_eq!(normalize(sql), "CREATE TABLE t(id INTEGER)");
    }

    #[test]
    fn unwraps_bare_identifier_quotes() {
        let sql = r#"CREATE TABLE "users" ("id" INTEGER)"#;
        assert_eq!(normalize(sql), "CREATE TABLE users(id INTEGER)");
    }

    #[test]
    fn keeps_quotes_around_non_identifiers() {
        let sql = r#"CREATE TABLE t (id INTEGER DEFAULT "1 2")"#;
        assert_eq!(normalize(sql), r#"CREATE TABLE t(id INTEGER DEFAULT "1 2")"#);
    }

    #[test]
    fn idempotent() {
        let sql = r#"CREATE   TABLE "Users" (
            -- primary key
            "id" INTEGER PRIMARY KEY,
            "name" TEXT
        )"#;
        let once = normalize(sql);
        let twice = normalize(&once);
        assert_eq!(once, twice);
    }
}
