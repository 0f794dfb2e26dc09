//! The migrator state machine: `make`, `migrate`, `status`. Owns the
//! migration-file registry and the live database's applied-migrations
//! table, and drives the differ against scratch connections to produce or
//! replay migration plans.

use crate::config::Config;
use crate::plan::{is_empty_marker, Plan, SnapshotPolicy, StoredPolicy};
use crate::registry::{MigrationFile, Registry};
use crate::store::{AppliedMigration, Store};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;
use schema_connector::{ActionPolicy, FixedPrompter, MigrationError, PromptReply, Prompter, Result};
use sql_schema_connector::{apply_pragmas, diff, verify_integrity, DifferOptions};
use sql_schema_describer::describe;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, info_span, warn};

static PRAGMA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)PRAGMA\s+(\w+)\s*=\s*(\w+);").unwrap());

/// The migrate target: a specific 4-digit id, `latest` (the newest file
/// on disk), or `zero` (undo everything).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Latest,
    Zero,
    Id(String),
}

impl Target {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "latest" => Target::Latest,
            "zero" => Target::Zero,
            other => Target::Id(other.to_owned()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MigrateReport {
    pub undone: Vec<String>,
    pub applied: Vec<String>,
    pub no_op: bool,
}

#[derive(Debug)]
pub struct StatusReport {
    pub current_id: String,
    pub current_name: Option<String>,
    pub pragmas: BTreeMap<String, String>,
    pub missing_migrations: Vec<String>,
    pub extra_migrations: Vec<String>,
    pub has_schema_changes: bool,
    pub has_tampered_data: bool,
    pub schema_diff_error: Option<String>,
}

pub struct Migrator {
    config: Config,
    registry: Registry,
    store: Store,
}

impl Migrator {
    pub fn open(config: Config) -> Result<Self> {
        let registry = Registry::open(&config.migrations_path)?;
        let store = Store::new(config.migrations_table.clone());
        Ok(Self { config, registry, store })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn open_live_connection(&self) -> Result<Connection> {
        let path = &self.config.db_path;
        if path.as_os_str().is_empty() || path.is_dir() {
            return Err(MigrationError::validation(
                "db_path must be a regular file path, not empty or a directory",
            ));
        }
        if !path.exists() {
            if !self.config.create_db_if_missing {
                return Err(MigrationError::validation(format!(
                    "database file '{}' does not exist and create_db_if_missing is false",
                    path.display()
                )));
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(Connection::open(path)?)
    }

    fn differ_options(&self) -> DifferOptions {
        DifferOptions {
            on_rename: self.config.on_rename,
            on_destructive_change: self.config.on_destructive_change,
            on_changed_index: self.config.on_changed_index,
            on_changed_view: self.config.on_changed_view,
            on_changed_trigger: self.config.on_changed_trigger,
            migrations_table: self.config.migrations_table.clone(),
            ignore_name_case: self.config.ignore_name_case,
        }
    }

    /// Replays every migration file's recorded effect, in order, into a
    /// fresh scratch connection: `Standard` plans execute their `up`
    /// statements, `Snapshot` plans execute their captured DDL directly.
    fn replay_into(&self, conn: &Connection, files: &[MigrationFile]) -> Result<()> {
        for file in files {
            let content = file.read_content()?;
            let plan = Plan::parse(&content)?;
            match plan {
                Plan::Standard { up, .. } => {
                    for stmt in up {
                        if is_empty_marker(&stmt) {
                            return Err(MigrationError::validation(format!(
                                "migration '{}' has no up statements to replay",
                                file.id
                            )));
                        }
                        conn.execute_batch(&stmt)?;
                    }
                }
                Plan::Snapshot { ddl, .. } => {
                    for stmt in ddl {
                        conn.execute_batch(&stmt)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn apply_schema_file(&self, conn: &Connection) -> Result<String> {
        let text = std::fs::read_to_string(&self.config.schema_path)?;
        apply_parsed_pragmas(conn, &text)?;
        conn.execute_batch(&text)?;
        Ok(text)
    }

    /// Standard-mode `make`: diffs a migration-replay scratch DB against
    /// the declarative schema file and, if anything changed (or
    /// `create_if_no_changes`), writes a new migration file. Returns the
    /// written file, if any.
    pub fn make(&mut self, prompter: &dyn Prompter) -> Result<Option<MigrationFile>> {
        let _span = info_span!("make").entered();

        if self.config.only_track_ambiguous_state {
            self.reconcile_ambiguous_state(prompter)?;
        }

        self.registry.rescan()?;
        let old_conn = Connection::open_in_memory()?;
        let new_conn = Connection::open_in_memory()?;

        self.replay_into(&old_conn, self.registry.files())?;
        let schema_text = self.apply_schema_file(&new_conn)?;
        apply_parsed_pragmas(&old_conn, &schema_text)?;

        let opts = self.differ_options();
        let (diff_result, name) = diff(&old_conn, &new_conn, &opts, prompter)?;

        let has_manual_reasons = !diff_result.manual_reasons.is_empty();
        let should_write = (!diff_result.is_empty() || self.config.create_if_no_changes)
            && (!has_manual_reasons || self.config.create_on_manual_migration);
        let written = if should_write {
            let pragmas = describe(&new_conn, opts.ignore_name_case)?.pragmas;
            let id = self.registry.next_id();
            let plan = Plan::standard_template(&id, diff_result.up.clone(), diff_result.down.clone(), pragmas);
            let content = plan.render()?;
            let segment = if name.is_empty() { "snapshot".to_owned() } else { name };
            Some(self.registry.write_new(&segment, &content)?)
        } else {
            None
        };

        if has_manual_reasons {
            return Err(MigrationError::ManualMigrationRequired(diff_result.manual_reasons));
        }

        Ok(written)
    }

    /// Before the normal file-vs-schema diff, checks whether the live
    /// database has drifted from the declarative schema by a rename only.
    /// If so, captures a schema-snapshot migration recording the resolved
    /// rename decisions, so a future `migrate` replays them instead of
    /// re-deriving them.
    fn reconcile_ambiguous_state(&mut self, prompter: &dyn Prompter) -> Result<()> {
        let live_conn = self.open_live_connection()?;
        let schema_conn = Connection::open_in_memory()?;
        self.apply_schema_file(&schema_conn)?;

        let rename_only_opts = DifferOptions {
            on_rename: self.config.on_rename,
            on_destructive_change: ActionPolicy::Proceed,
            on_changed_index: ActionPolicy::Proceed,
            on_changed_view: ActionPolicy::Proceed,
            on_changed_trigger: ActionPolicy::Proceed,
            migrations_table: self.config.migrations_table.clone(),
            ignore_name_case: self.config.ignore_name_case,
        };

        // Diff against disposable clones so the live connection is left
        // untouched by this probing diff.
        let probe_live = clone_schema_only(&live_conn)?;
        let probe_schema = clone_schema_only(&schema_conn)?;
        let (probe_result, _) = diff(&probe_live, &probe_schema, &rename_only_opts, prompter)?;

        if probe_result.tables.renamed.is_empty()
            && probe_result.views.renamed.is_empty()
            && probe_result.indices.renamed.is_empty()
            && probe_result.triggers.renamed.is_empty()
        {
            return Ok(());
        }

        self.registry.rescan()?;
        self.store.ensure_table(&live_conn)?;
        let applied = self.store.load_all(&live_conn)?;
        if applied.len() != self.registry.len() {
            return Err(MigrationError::validation(
                "ambiguous-only mode requires the live database to be at latest before recording a rename snapshot",
            ));
        }

        let schema = describe(&live_conn, self.config.ignore_name_case)?;
        let mut ddl: Vec<String> = Vec::new();
        ddl.extend(schema.virtual_tables.values().map(|o| o.normalized_ddl.clone()));
        ddl.extend(schema.tables.values().map(|o| o.normalized_ddl.clone()));
        ddl.extend(schema.views.values().map(|o| o.normalized_ddl.clone()));
        ddl.extend(schema.triggers.values().map(|o| o.normalized_ddl.clone()));
        ddl.extend(schema.indices.values().map(|o| o.normalized_ddl.clone()));

        let policy = SnapshotPolicy {
            on_rename: StoredPolicy::from_resolved(resolve_for_snapshot(self.config.on_rename, prompter))?,
            on_destructive_change: StoredPolicy::from_resolved(resolve_for_snapshot(
                self.config.on_destructive_change,
                prompter,
            ))?,
        };
        let plan = Plan::Snapshot { ddl, policy };
        let content = plan.render()?;
        let id = self.registry.next_id();
        let file = self.registry.write_new("schema_snapshot", &content)?;
        self.store.insert(&live_conn, &file.id, &file.name, &file.content_hash, &content)?;
        info!(id, "recorded ambiguous-state schema snapshot");
        Ok(())
    }

    /// Drives the live database forward or backward to `target`,
    /// reconciling any divergence between the applied history and the
    /// current on-disk file set.
    pub fn migrate(&mut self, target: Target, prompter: &dyn Prompter) -> Result<MigrateReport> {
        self.migrate_inner(target, prompter, false)
    }

    /// Computes and executes the same undo/redo plan as [`Migrator::migrate`]
    /// but rolls the transaction back unconditionally before returning,
    /// and never runs `VACUUM`: useful for previewing what a `migrate`
    /// call would do against the live database without changing it.
    pub fn migrate_dry_run(&mut self, target: Target, prompter: &dyn Prompter) -> Result<MigrateReport> {
        self.migrate_inner(target, prompter, true)
    }

    fn migrate_inner(&mut self, target: Target, prompter: &dyn Prompter, dry_run: bool) -> Result<MigrateReport> {
        let _span = info_span!("migrate", dry_run).entered();

        self.registry.rescan()?;
        let mut conn = self.open_live_connection()?;
        self.store.ensure_table(&conn)?;
        let applied = self.store.load_all(&conn)?;

        let target_files: Vec<MigrationFile> = match &target {
            Target::Zero => Vec::new(),
            Target::Latest => self.registry.files().to_vec(),
            Target::Id(id) => {
                let pos = self.registry.position(id)?;
                self.registry.files()[..=pos].to_vec()
            }
        };

        let common_len = applied
            .iter()
            .zip(target_files.iter())
            .take_while(|(a, f)| a.content_hash == f.content_hash)
            .count();

        let mut undo_plan: Vec<AppliedMigration> = applied[common_len..].to_vec();
        undo_plan.reverse();
        let redo_plan: Vec<MigrationFile> = target_files[common_len..].to_vec();

        let ambiguous_latest_pass = self.config.only_track_ambiguous_state && matches!(target, Target::Latest);

        if undo_plan.is_empty() && redo_plan.is_empty() && !ambiguous_latest_pass {
            return Ok(MigrateReport {
                no_op: true,
                ..Default::default()
            });
        }

        let (_temp_dir, _) = self.store.materialize(&applied, &self.config.migrations_path)?;

        let mut report = MigrateReport::default();
        let mut pragmas: BTreeMap<String, String> = BTreeMap::new();

        // Every undo/redo step runs inside one real SQLite transaction:
        // on any error it is dropped without a commit, which rusqlite
        // rolls back automatically, leaving the live database exactly at
        // its pre-call state.
        let tx = conn.transaction()?;

        let tx_result = (|| -> Result<()> {
            tx.execute_batch("PRAGMA defer_foreign_keys = TRUE;")?;

            for migration in &undo_plan {
                let plan = Plan::parse(&migration.content)?;
                if let Plan::Standard { down, pragmas: p, .. } = plan {
                    for stmt in down {
                        if is_empty_marker(&stmt) {
                            return Err(MigrationError::validation(format!(
                                "migration '{}' has no down statements to undo",
                                migration.id
                            )));
                        }
                        tx.execute_batch(&stmt)?;
                    }
                    pragmas.extend(p);
                }
                self.store.delete(&tx, &migration.id)?;
                report.undone.push(migration.id.clone());
            }

            for file in &redo_plan {
                let content = file.read_content()?;
                let plan = Plan::parse(&content)?;
                match plan {
                    Plan::Standard { up, pragmas: p, .. } => {
                        for stmt in up {
                            if is_empty_marker(&stmt) {
                                return Err(MigrationError::validation(format!(
                                    "migration '{}' has no up statements to apply",
                                    file.id
                                )));
                            }
                            tx.execute_batch(&stmt)?;
                        }
                        pragmas.extend(p);
                    }
                    Plan::Snapshot { ddl, policy } => {
                        let scratch = Connection::open_in_memory()?;
                        for stmt in &ddl {
                            scratch.execute_batch(stmt)?;
                        }
                        let opts = DifferOptions {
                            on_rename: policy.on_rename.as_action_policy(),
                            on_destructive_change: policy.on_destructive_change.as_action_policy(),
                            on_changed_index: ActionPolicy::Proceed,
                            on_changed_view: ActionPolicy::Proceed,
                            on_changed_trigger: ActionPolicy::Proceed,
                            migrations_table: self.config.migrations_table.clone(),
                            ignore_name_case: self.config.ignore_name_case,
                        };
                        let fixed = FixedPrompter(PromptReply::Proceed);
                        let (result, _) = diff(&tx, &scratch, &opts, &fixed)?;
                        if !result.manual_reasons.is_empty() {
                            return Err(MigrationError::ManualMigrationRequired(result.manual_reasons));
                        }
                    }
                }
                self.store.insert(&tx, &file.id, &file.name, &file.content_hash, &content)?;
                report.applied.push(file.id.clone());
            }

            if ambiguous_latest_pass {
                self.apply_implicit_schema_diff(&tx, prompter, &mut pragmas)?;
            }

            Ok(())
        })();

        if let Err(e) = tx_result {
            // Dropping `tx` here rolls it back.
            return Err(MigrationError::rolled_back(e));
        }

        if dry_run {
            info!("dry run: rolling back migration transaction, skipping pragmas/integrity/vacuum");
            return Ok(report);
        }

        tx.commit()?;

        if !pragmas.is_empty() {
            let db_path = self.config.db_path.to_string_lossy().into_owned();
            let mismatched = apply_pragmas(&conn, &db_path, &pragmas)?;
            if !mismatched.is_empty() && !self.config.hide_warnings {
                warn!(?mismatched, "some pragmas did not persist");
            }
        }
        verify_integrity(&conn)?;

        conn.execute_batch("VACUUM;")?;
        Ok(report)
    }

    /// Runs the declarative schema file against `conn` (already inside
    /// `migrate`'s open transaction) and diffs it in, without ever
    /// blocking on a prompt: per the ambiguous-only `migrate`-to-latest
    /// step, a rename or destructive change that the caller's config
    /// leaves on the default `Prompt` policy is instead forced to
    /// `RequireManualMigration` here, since there is no interactive
    /// decision to make synchronously mid-transaction. A caller who
    /// configured something other than `Prompt` (including `Proceed` or
    /// `Skip`) keeps that explicit choice.
    fn apply_implicit_schema_diff(
        &self,
        conn: &Connection,
        prompter: &dyn Prompter,
        pragmas: &mut BTreeMap<String, String>,
    ) -> Result<()> {
        let schema_conn = Connection::open_in_memory()?;
        self.apply_schema_file(&schema_conn)?;
        let non_blocking = |policy: ActionPolicy| match policy {
            ActionPolicy::Prompt => ActionPolicy::RequireManualMigration,
            other => other,
        };
        let opts = DifferOptions {
            on_rename: non_blocking(self.config.on_rename),
            on_destructive_change: non_blocking(self.config.on_destructive_change),
            ..self.differ_options()
        };
        let (result, _) = diff(conn, &schema_conn, &opts, prompter)?;
        if !result.manual_reasons.is_empty() {
            return Err(MigrationError::ManualMigrationRequired(result.manual_reasons));
        }
        pragmas.extend(describe(&schema_conn, opts.ignore_name_case)?.pragmas);
        Ok(())
    }

    pub fn status(&mut self) -> Result<StatusReport> {
        let _span = info_span!("status").entered();
        self.registry.rescan()?;

        let conn = self.open_live_connection()?;
        let applied = if self.store.table_exists(&conn)? {
            self.store.load_all(&conn)?
        } else {
            Vec::new()
        };

        let (current_id, current_name) = applied
            .last()
            .map(|m| (m.id.clone(), Some(m.name.clone())))
            .unwrap_or_else(|| ("zero".to_owned(), None));

        let pragmas = applied
            .last()
            .and_then(|m| Plan::parse(&m.content).ok())
            .and_then(|plan| match plan {
                Plan::Standard { pragmas, .. } => Some(pragmas),
                Plan::Snapshot { .. } => None,
            })
            .unwrap_or_default();

        let applied_ids: std::collections::HashSet<&str> = applied.iter().map(|m| m.id.as_str()).collect();
        let file_ids: std::collections::HashSet<&str> = self.registry.files().iter().map(|f| f.id.as_str()).collect();
        let missing_migrations: Vec<String> = self
            .registry
            .files()
            .iter()
            .filter(|f| !applied_ids.contains(f.id.as_str()))
            .map(|f| f.id.clone())
            .collect();
        let extra_migrations: Vec<String> = applied
            .iter()
            .filter(|m| !file_ids.contains(m.id.as_str()))
            .map(|m| m.id.clone())
            .collect();

        let replay = Connection::open_in_memory()?;
        self.replay_into(&replay, self.registry.files())?;

        let mut schema_diff_error = None;
        let mut has_schema_changes = false;
        let mut has_tampered_data = false;

        let dry_prompter = FixedPrompter(PromptReply::Skip);
        let opts = self.differ_options();

        match (|| -> Result<bool> {
            let schema_conn = Connection::open_in_memory()?;
            self.apply_schema_file(&schema_conn)?;
            let replay_clone = clone_schema_only(&replay)?;
            let (result, _) = diff(&replay_clone, &schema_conn, &opts, &dry_prompter)?;
            Ok(!result.is_empty())
        })() {
            Ok(changed) => has_schema_changes = changed,
            Err(e) => schema_diff_error = Some(e.to_string()),
        }

        if schema_diff_error.is_none() {
            match (|| -> Result<bool> {
                let replay_clone = clone_schema_only(&replay)?;
                let live_clone = clone_schema_only(&conn)?;
                let (result, _) = diff(&replay_clone, &live_clone, &opts, &dry_prompter)?;
                Ok(!result.is_empty())
            })() {
                Ok(tampered) => has_tampered_data = tampered,
                Err(e) => schema_diff_error = Some(e.to_string()),
            }
        }

        Ok(StatusReport {
            current_id,
            current_name,
            pragmas,
            missing_migrations,
            extra_migrations,
            has_schema_changes,
            has_tampered_data,
            schema_diff_error,
        })
    }
}

fn apply_parsed_pragmas(conn: &Connection, schema_text: &str) -> Result<()> {
    for caps in PRAGMA_RE.captures_iter(schema_text) {
        let name = &caps[1];
        let value = &caps[2];
        conn.execute_batch(&format!("PRAGMA {name} = {value};"))?;
    }
    Ok(())
}

fn resolve_for_snapshot(policy: ActionPolicy, prompter: &dyn Prompter) -> ActionPolicy {
    match policy {
        ActionPolicy::Prompt => prompter
            .prompt(schema_connector::ActionCategory::Rename, "resolve rename policy for schema snapshot")
            .into_policy(),
        other => other,
    }
}

/// Dumps the schema (not the data) of `conn` into a fresh in-memory
/// connection, for probing diffs that must not mutate the caller's
/// connection.
fn clone_schema_only(conn: &Connection) -> Result<Connection> {
    let schema = describe(conn, false)?;
    let clone = Connection::open_in_memory()?;
    for kind_ddls in [&schema.virtual_tables, &schema.tables, &schema.views, &schema.triggers, &schema.indices] {
        for object in kind_ddls.values() {
            clone.execute_batch(&format!("{};", object.normalized_ddl))?;
        }
    }
    Ok(clone)
}
