//! The on-disk migration descriptor and the in-memory plan it parses
//! into. Rather than loading executable code at call time, every
//! migration file is a TOML document: `pragmas` is a plain key/value
//! table, `up`/`down` are ordered lists of SQL statements. A migration can
//! instead describe a *schema snapshot* — a captured set of DDL plus the
//! rename policy that produced it — used by ambiguous-only mode to replay
//! rename decisions without re-deriving them from scratch.

use schema_connector::{ActionPolicy, MigrationError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a migration file's `up`/`down` steps actually are.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Plan {
    Standard {
        #[serde(default)]
        pragmas: BTreeMap<String, String>,
        up: Vec<String>,
        down: Vec<String>,
    },
    Snapshot {
        ddl: Vec<String>,
        policy: SnapshotPolicy,
    },
}

/// The rename-resolution policy captured at snapshot time so a later
/// `migrate` can replay the same decisions deterministically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotPolicy {
    pub on_rename: StoredPolicy,
    pub on_destructive_change: StoredPolicy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoredPolicy {
    Proceed,
    Skip,
    RequireManualMigration,
}

impl StoredPolicy {
    pub fn from_resolved(policy: ActionPolicy) -> Result<Self> {
        match policy {
            ActionPolicy::Proceed => Ok(Self::Proceed),
            ActionPolicy::Skip => Ok(Self::Skip),
            ActionPolicy::RequireManualMigration => Ok(Self::RequireManualMigration),
            ActionPolicy::Prompt => Err(MigrationError::validation(
                "cannot snapshot an unresolved PROMPT policy",
            )),
        }
    }

    pub fn as_action_policy(self) -> ActionPolicy {
        match self {
            Self::Proceed => ActionPolicy::Proceed,
            Self::Skip => ActionPolicy::Skip,
            Self::RequireManualMigration => ActionPolicy::RequireManualMigration,
        }
    }
}

/// Sentinel pushed in place of an empty `up`/`down` list. It renders into
/// the migration file as a comment-shaped line for human readability, but
/// it is never valid SQL: every statement executor must check
/// [`is_empty_marker`] before running a statement and raise instead of
/// letting it execute as an inert no-op.
pub const EMPTY_STATEMENT_MARKER: &str = "-- __EMPTY_MIGRATION__";

pub fn is_empty_marker(stmt: &str) -> bool {
    stmt.starts_with(EMPTY_STATEMENT_MARKER)
}

impl Plan {
    pub fn parse(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| MigrationError::Parse(format!("malformed migration file: {e}")))
    }

    pub fn render(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| MigrationError::Parse(e.to_string()))
    }

    /// The fixed generator template: a standard plan with its up/down
    /// statement lists and the pragma snapshot that should hold once this
    /// migration has been applied. An empty `up` or `down` list is
    /// replaced by [`EMPTY_STATEMENT_MARKER`], citing `id`, so an empty
    /// migration can never silently no-op in either direction: callers
    /// that execute a plan's statements must check [`is_empty_marker`]
    /// before running one and raise instead.
    pub fn standard_template(id: &str, up: Vec<String>, down: Vec<String>, pragmas: BTreeMap<String, String>) -> Self {
        let placeholder = |dir: &str| vec![format!("{EMPTY_STATEMENT_MARKER} migration {id} has no {dir} statements")];
        Plan::Standard {
            pragmas,
            up: if up.is_empty() { placeholder("up") } else { up },
            down: if down.is_empty() { placeholder("down") } else { down },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_standard_plan() {
        let plan = Plan::standard_template(
            "0001",
            vec!["CREATE TABLE t(id INTEGER);".to_owned()],
            vec!["DROP TABLE t;".to_owned()],
            BTreeMap::new(),
        );
        let rendered = plan.render().unwrap();
        let parsed = Plan::parse(&rendered).unwrap();
        match parsed {
            Plan::Standard { up, down, .. } => {
                assert_eq!(up, vec!["CREATE TABLE t(id INTEGER);"]);
                assert_eq!(down, vec!["DROP TABLE t;"]);
            }
            Plan::Snapshot { .. } => panic!("expected standard plan"),
        }
    }

    #[test]
    fn empty_statements_become_placeholders() {
        let plan = Plan::standard_template("0002", vec![], vec![], BTreeMap::new());
        match plan {
            Plan::Standard { up, down, .. } => {
                assert!(up[0].contains("0002"));
                assert!(down[0].contains("0002"));
                assert!(is_empty_marker(&up[0]));
                assert!(is_empty_marker(&down[0]));
            }
            Plan::Snapshot { .. } => unreachable!(),
        }
    }

    #[test]
    fn non_empty_statements_are_not_mistaken_for_the_marker() {
        assert!(!is_empty_marker("CREATE TABLE t(id INTEGER);"));
    }

    #[test]
    fn parses_a_snapshot_plan() {
        let raw = r#"
kind = "snapshot"
ddl = ["CREATE TABLE t(id INTEGER);"]

[policy]
on_rename = "proceed"
on_destructive_change = "require_manual_migration"
"#;
        let plan = Plan::parse(raw).unwrap();
        match plan {
            Plan::Snapshot { ddl, policy } => {
                assert_eq!(ddl.len(), 1);
                assert_eq!(policy.on_rename, StoredPolicy::Proceed);
            }
            Plan::Standard { .. } => panic!("expected snapshot plan"),
        }
    }
}
