//! The schema differ: the central algorithm that produces
//! `(upStatements, downStatements, manualReasons, renames)` from two
//! SQLite connections and a per-category action policy.

use crate::diffutil::mapped_difference;
use crate::naming::NameSegment;
use crate::rebuild::{alterable_column_changes, rebuild_table};
use crate::{body, naming, rename};
use indexmap::{IndexMap, IndexSet};
use rusqlite::Connection;
use schema_connector::{
    ActionCategory, ActionPolicy, DatabaseSchema, DiffResult, KindDiff, ManualReason, MigrationError, ObjectKind,
    Prompter, Result,
};
use sql_schema_describer::describe;
use tracing::{debug, info, info_span};

/// The five policy axes the differ consults at its decision points.
#[derive(Debug, Clone)]
pub struct DifferOptions {
    pub on_rename: ActionPolicy,
    pub on_destructive_change: ActionPolicy,
    pub on_changed_index: ActionPolicy,
    pub on_changed_view: ActionPolicy,
    pub on_changed_trigger: ActionPolicy,
    /// The reserved applied-migrations table name; diffing refuses to
    /// proceed if the declarative schema defines an object under this
    /// name.
    pub migrations_table: String,
    pub ignore_name_case: bool,
}

struct DiffCtx<'a> {
    old: &'a Connection,
    new: &'a Connection,
    opts: &'a DifferOptions,
    prompter: &'a dyn Prompter,
    result: DiffResult,
    segments: Vec<NameSegment>,
}

/// Runs the full differ over `old` (mutated in place with the `up`
/// statements as they are produced) and `new` (read-only), honoring
/// `opts`. Returns the diff and, as a side effect, leaves `old`'s schema
/// equal to `new`'s for every object kind the differ covers.
pub fn diff(old: &Connection, new: &Connection, opts: &DifferOptions, prompter: &dyn Prompter) -> Result<(DiffResult, String)> {
    let _span = info_span!("schema_diff").entered();

    reject_reserved_name(new, &opts.migrations_table, opts.ignore_name_case)?;

    for conn in [old, new] {
        conn.execute_batch("PRAGMA foreign_keys = OFF; PRAGMA writable_schema = ON;")?;
    }

    let mut ctx = DiffCtx {
        old,
        new,
        opts,
        prompter,
        result: DiffResult::default(),
        segments: Vec::new(),
    };

    ctx.diff_virtual_tables()?;
    ctx.drop_shadow_tables()?;
    ctx.diff_tables()?;
    ctx.diff_unalterable(ObjectKind::View)?;
    ctx.diff_unalterable(ObjectKind::Trigger)?;
    ctx.diff_unalterable(ObjectKind::Index)?;

    for conn in [old, new] {
        conn.execute_batch("PRAGMA writable_schema = OFF;")?;
    }

    ctx.result.down.reverse();
    if !ctx.result.manual_reasons.is_empty() {
        ctx.result.has_ambiguous_change = true;
    }

    let name = naming::build_name(&ctx.segments).unwrap_or_default();
    Ok((ctx.result, name))
}

fn reject_reserved_name(new: &Connection, migrations_table: &str, ignore_name_case: bool) -> Result<()> {
    let schema = describe(new, ignore_name_case)?;
    let lookup_name = if ignore_name_case {
        migrations_table.to_lowercase()
    } else {
        migrations_table.to_owned()
    };
    if schema.tables.contains_key(&lookup_name) {
        return Err(MigrationError::validation(format!(
            "the schema file defines a table named '{migrations_table}', which is reserved for migration bookkeeping"
        )));
    }
    Ok(())
}

impl<'a> DiffCtx<'a> {
    fn exec_up(&mut self, sql: String) -> Result<()> {
        debug!(%sql, "applying up statement");
        self.old.execute_batch(&sql)?;
        self.result.up.push(sql);
        Ok(())
    }

    fn push_down(&mut self, sql: String) {
        self.result.down.push(sql);
    }

    /// Pushes several down statements belonging to one logical change,
    /// whose relative order matters (e.g. a two-step rename through a
    /// temporary name). `group` must already be in the order the
    /// statements need to *execute* in to undo the change; this pushes
    /// them in the opposite order so that the whole-diff `down.reverse()`
    /// in [`diff`] restores that execution order once everything else in
    /// the list has also been flipped back into place.
    fn push_down_group(&mut self, group: Vec<String>) {
        for stmt in group.into_iter().rev() {
            self.push_down(stmt);
        }
    }

    fn manual(&mut self, reason: String) {
        self.result.manual_reasons.push(ManualReason(reason));
    }

    fn decide(&self, category: ActionCategory, policy: ActionPolicy, description: &str) -> ActionPolicy {
        match policy {
            ActionPolicy::Prompt => {
                let reply = self.prompter.prompt(category, description);
                reply.into_policy()
            }
            other => other,
        }
    }

    // ---- virtual tables ----

    fn diff_virtual_tables(&mut self) -> Result<()> {
        let _span = info_span!("diff_virtual_tables").entered();
        let old_schema = describe(self.old, self.opts.ignore_name_case)?;
        let new_schema = describe(self.new, self.opts.ignore_name_case)?;
        self.diff_object_kind(ObjectKind::VirtualTable, &old_schema, &new_schema, true)
    }

    /// Shadow tables (e.g. FTS5's `_content`/`_data` tables) would confuse
    /// the regular-table diff; drop them from both scratch connections
    /// once the virtual table step is done.
    fn drop_shadow_tables(&mut self) -> Result<()> {
        let new_schema = describe(self.new, self.opts.ignore_name_case)?;
        let vtable_names: Vec<String> = new_schema.virtual_tables.keys().cloned().collect();
        for conn in [&*self.old, &*self.new] {
            let schema = describe(conn, self.opts.ignore_name_case)?;
            for table in schema.tables.keys() {
                if vtable_names.iter().any(|v| table.starts_with(&format!("{v}_"))) {
                    let _ = conn.execute_batch(&format!("DROP TABLE IF EXISTS \"{table}\""));
                }
            }
        }
        Ok(())
    }

    // ---- regular tables ----

    fn diff_tables(&mut self) -> Result<()> {
        let _span = info_span!("diff_tables").entered();
        let old_schema = describe(self.old, self.opts.ignore_name_case)?;
        let new_schema = describe(self.new, self.opts.ignore_name_case)?;

        let old_names: IndexSet<String> = old_schema.tables.keys().cloned().collect();
        let new_names: IndexSet<String> = new_schema.tables.keys().cloned().collect();

        let removed_keys: Vec<String> = old_names.iter().filter(|n| !new_names.contains(*n)).cloned().collect();
        let added_keys: Vec<String> = new_names.iter().filter(|n| !old_names.contains(*n)).cloned().collect();

        let renames = mapped_difference(
            &old_schema.tables,
            &removed_keys,
            &new_schema.tables,
            &added_keys,
            |a, b| body::table_body(&a.normalized_ddl) == body::table_body(&b.normalized_ddl),
        );

        let mut handled_old: IndexSet<String> = IndexSet::new();
        let mut handled_new: IndexSet<String> = IndexSet::new();

        for (new_name, old_name) in renames.iter() {
            handled_old.insert(old_name.clone());
            handled_new.insert(new_name.clone());
            let decision = self.decide(
                ActionCategory::Rename,
                self.opts.on_rename,
                &format!("rename table '{old_name}' to '{new_name}'"),
            );
            match decision {
                ActionPolicy::Skip => {
                    handled_old.remove(old_name);
                    handled_new.remove(new_name);
                }
                ActionPolicy::RequireManualMigration => {
                    self.manual(format!("table '{old_name}' appears to have been renamed to '{new_name}'; review and migrate manually"));
                }
                ActionPolicy::Proceed => {
                    self.rename_table(old_name, new_name)?;
                    self.result.tables.renamed.insert(old_name.clone(), new_name.clone());
                    self.segments.push(NameSegment(format!("rename_{old_name}_to_{new_name}")));
                }
                ActionPolicy::Prompt => unreachable!("prompt is always resolved by decide()"),
            }
        }

        for name in &added_keys {
            if handled_new.contains(name) {
                continue;
            }
            let ddl = &new_schema.tables[name].normalized_ddl;
            self.exec_up(format!("{ddl};"))?;
            self.push_down(format!("DROP TABLE \"{name}\";"));
            self.result.tables.added.push(name.clone());
            self.segments.push(NameSegment(format!("create_{name}")));
        }

        for name in &removed_keys {
            if handled_old.contains(name) {
                continue;
            }
            let decision = self.decide(
                ActionCategory::DestructiveChange,
                self.opts.on_destructive_change,
                &format!("drop table '{name}' (all of its data would be lost)"),
            );
            match decision {
                ActionPolicy::Skip => {
                    self.result.up.push(format!("-- skipped: drop table \"{name}\""));
                }
                ActionPolicy::RequireManualMigration => {
                    self.manual(format!("table '{name}' was removed from the declarative schema"));
                }
                ActionPolicy::Proceed => {
                    let old_ddl = old_schema.tables[name].normalized_ddl.clone();
                    self.exec_up(format!("DROP TABLE \"{name}\";"))?;
                    self.push_down(format!("{old_ddl};"));
                    self.result.tables.removed.push(name.clone());
                    self.segments.push(NameSegment(format!("remove_{name}")));
                }
                ActionPolicy::Prompt => unreachable!(),
            }
        }

        // Re-describe so column diffs see current (post-rename) state.
        let old_schema = describe(self.old, self.opts.ignore_name_case)?;
        let common: Vec<String> = new_schema
            .tables
            .keys()
            .filter(|n| old_schema.tables.contains_key(*n))
            .cloned()
            .collect();

        for name in common {
            self.diff_one_table(&name, &old_schema, &new_schema)?;
        }

        Ok(())
    }

    fn rename_table(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        if rename::is_case_only_rename(old_name, new_name) {
            let tmp = rename::temp_rename_name(old_name);
            self.exec_up(format!("ALTER TABLE \"{old_name}\" RENAME TO \"{tmp}\";"))?;
            self.exec_up(format!("ALTER TABLE \"{tmp}\" RENAME TO \"{new_name}\";"))?;
            self.push_down_group(vec![
                format!("ALTER TABLE \"{new_name}\" RENAME TO \"{tmp}\";"),
                format!("ALTER TABLE \"{tmp}\" RENAME TO \"{old_name}\";"),
            ]);
        } else {
            self.exec_up(format!("ALTER TABLE \"{old_name}\" RENAME TO \"{new_name}\";"))?;
            self.push_down(format!("ALTER TABLE \"{new_name}\" RENAME TO \"{old_name}\";"));
        }
        Ok(())
    }

    fn diff_one_table(&mut self, name: &str, old_schema: &DatabaseSchema, new_schema: &DatabaseSchema) -> Result<()> {
        let old_ddl = &old_schema.tables[name].normalized_ddl;
        let new_ddl = &new_schema.tables[name].normalized_ddl;
        if old_ddl == new_ddl {
            return Ok(());
        }

        let old_cols = &old_schema.columns[name];
        let new_cols = &new_schema.columns[name];

        let column_diff = alterable_column_changes(old_cols, new_cols);

        if column_diff.alterable {
            self.apply_alterable_column_changes(name, &column_diff)?;
        } else {
            info!(table = name, "rebuilding table");
            let temp = rename::temp_table_name(name);
            let (up, down) = rebuild_table(name, &temp, old_ddl, new_ddl, old_cols, new_cols);
            for stmt in up {
                self.exec_up(stmt)?;
            }
            self.push_down_group(down);
        }

        self.result.tables.modified.push(name.to_owned());
        self.segments.push(NameSegment(format!("modify_{name}")));
        Ok(())
    }

    fn apply_alterable_column_changes(&mut self, table: &str, diff: &crate::rebuild::AlterableColumnDiff) -> Result<()> {
        let mut column_kind = KindDiff::default();

        for (col, not_null_no_default) in &diff.added {
            if *not_null_no_default {
                self.manual(format!(
                    "column '{col}' was added to table '{table}' as NOT NULL with no default; add it manually"
                ));
                continue;
            }
            let col_ddl = diff.added_ddl.get(col).cloned().unwrap_or_default();
            self.exec_up(format!("ALTER TABLE \"{table}\" ADD COLUMN {col_ddl};"))?;
            self.push_down(format!("ALTER TABLE \"{table}\" DROP COLUMN \"{col}\";"));
            column_kind.added.push(col.clone());
        }

        for col in &diff.removed {
            let decision = self.decide(
                ActionCategory::DestructiveChange,
                self.opts.on_destructive_change,
                &format!("drop column '{col}' from table '{table}'"),
            );
            match decision {
                ActionPolicy::Skip => {}
                ActionPolicy::RequireManualMigration => {
                    self.manual(format!("column '{col}' was removed from table '{table}'"));
                }
                ActionPolicy::Proceed => {
                    let old_col_ddl = diff.removed_ddl.get(col).cloned().unwrap_or_default();
                    self.exec_up(format!("ALTER TABLE \"{table}\" DROP COLUMN \"{col}\";"))?;
                    self.push_down(format!("ALTER TABLE \"{table}\" ADD COLUMN {old_col_ddl};"));
                    column_kind.removed.push(col.clone());
                }
                ActionPolicy::Prompt => unreachable!(),
            }
        }

        for (old_name, new_name) in &diff.renamed {
            let decision = self.decide(
                ActionCategory::Rename,
                self.opts.on_rename,
                &format!("rename column '{old_name}' to '{new_name}' on table '{table}'"),
            );
            match decision {
                ActionPolicy::Skip => {}
                ActionPolicy::RequireManualMigration => {
                    self.manual(format!(
                        "column '{old_name}' on table '{table}' appears to have been renamed to '{new_name}'"
                    ));
                }
                ActionPolicy::Proceed => {
                    self.exec_up(format!(
                        "ALTER TABLE \"{table}\" RENAME COLUMN \"{old_name}\" TO \"{new_name}\";"
                    ))?;
                    self.push_down(format!(
                        "ALTER TABLE \"{table}\" RENAME COLUMN \"{new_name}\" TO \"{old_name}\";"
                    ));
                    column_kind.renamed.insert(old_name.clone(), new_name.clone());
                }
                ActionPolicy::Prompt => unreachable!(),
            }
        }

        self.result.columns.insert(table.to_owned(), column_kind);
        Ok(())
    }

    // ---- views, triggers, indices ----

    fn diff_unalterable(&mut self, kind: ObjectKind) -> Result<()> {
        let _span = info_span!("diff_unalterable", ?kind).entered();
        let old_schema = describe(self.old, self.opts.ignore_name_case)?;
        let new_schema = describe(self.new, self.opts.ignore_name_case)?;
        self.diff_object_kind(kind, &old_schema, &new_schema, false)
    }

    fn diff_object_kind(&mut self, kind: ObjectKind, old_schema: &DatabaseSchema, new_schema: &DatabaseSchema, is_virtual: bool) -> Result<()> {
        let old_objs = old_schema.objects(kind);
        let new_objs = new_schema.objects(kind);

        let old_names: Vec<String> = old_objs.keys().cloned().collect();
        let new_names: Vec<String> = new_objs.keys().cloned().collect();

        let removed: Vec<String> = old_names.iter().filter(|n| !new_objs.contains_key(*n)).cloned().collect();
        let added: Vec<String> = new_names.iter().filter(|n| !old_objs.contains_key(*n)).cloned().collect();

        let body_of = |ddl: &str| match kind {
            ObjectKind::Table | ObjectKind::VirtualTable => body::table_body(ddl),
            ObjectKind::View => body::view_body(ddl),
            ObjectKind::Trigger => body::trigger_body(ddl),
            ObjectKind::Index => body::index_body(ddl),
        };

        let renames = mapped_difference(old_objs, &removed, new_objs, &added, |a, b| {
            body_of(&a.normalized_ddl) == body_of(&b.normalized_ddl)
        });

        // There is no `onChangedVirtualTable` policy axis; a redefined
        // virtual table (e.g. an FTS5 table with a changed `USING` clause)
        // is deliberately governed by `onChangedView`, the closest existing
        // axis, rather than inventing a sixth one.
        let (change_category, change_policy) = match kind {
            ObjectKind::View => (ActionCategory::ChangedView, self.opts.on_changed_view),
            ObjectKind::Trigger => (ActionCategory::ChangedTrigger, self.opts.on_changed_trigger),
            ObjectKind::Index => (ActionCategory::ChangedIndex, self.opts.on_changed_index),
            ObjectKind::Table | ObjectKind::VirtualTable => (ActionCategory::ChangedView, self.opts.on_changed_view),
        };

        let mut diff = KindDiff::default();
        let mut handled_old: IndexSet<String> = IndexSet::new();
        let mut handled_new: IndexSet<String> = IndexSet::new();

        for (new_name, old_name) in renames.iter() {
            let decision = self.decide(
                ActionCategory::Rename,
                self.opts.on_rename,
                &format!("{kind:?} '{old_name}' appears renamed to '{new_name}'"),
            );
            match decision {
                ActionPolicy::Skip => {}
                ActionPolicy::RequireManualMigration => {
                    self.manual(format!("{kind:?} '{old_name}' appears to have been renamed to '{new_name}'"));
                    handled_old.insert(old_name.clone());
                    handled_new.insert(new_name.clone());
                }
                ActionPolicy::Proceed => {
                    // Views/triggers/indices have no ALTER ... RENAME in SQLite
                    // always drop + recreate, even
                    // for a case-only name change.
                    let old_ddl = old_objs[old_name].normalized_ddl.clone();
                    let new_ddl = new_objs[new_name].normalized_ddl.clone();
                    self.drop_object(kind, old_name)?;
                    self.exec_up(format!("{new_ddl};"))?;
                    self.push_down_group(vec![
                        format!("DROP {kw} \"{new_name}\";", kw = drop_keyword(kind)),
                        format!("{old_ddl};"),
                    ]);
                    diff.renamed.insert(old_name.clone(), new_name.clone());
                    handled_old.insert(old_name.clone());
                    handled_new.insert(new_name.clone());
                    self.segments.push(NameSegment(format!("rename_{old_name}_to_{new_name}")));
                }
                ActionPolicy::Prompt => unreachable!(),
            }
        }

        for name in &added {
            if handled_new.contains(name) {
                continue;
            }
            let ddl = new_objs[name].normalized_ddl.clone();
            self.exec_up(format!("{ddl};"))?;
            self.push_down(format!("DROP {kw} \"{name}\";", kw = drop_keyword(kind)));
            diff.added.push(name.clone());
            if !is_virtual {
                self.segments.push(NameSegment(format!("{prefix}{name}", prefix = kind.create_prefix())));
            }
        }

        for name in &removed {
            if handled_old.contains(name) {
                continue;
            }
            let decision = self.decide(
                ActionCategory::DestructiveChange,
                self.opts.on_destructive_change,
                &format!("drop {kind:?} '{name}'"),
            );
            match decision {
                ActionPolicy::Skip => {}
                ActionPolicy::RequireManualMigration => {
                    self.manual(format!("{kind:?} '{name}' was removed from the declarative schema"));
                }
                ActionPolicy::Proceed => {
                    let old_ddl = old_objs[name].normalized_ddl.clone();
                    self.drop_object(kind, name)?;
                    self.push_down(format!("{old_ddl};"));
                    diff.removed.push(name.clone());
                    self.segments.push(NameSegment(format!("remove_{name}")));
                }
                ActionPolicy::Prompt => unreachable!(),
            }
        }

        for name in new_names.iter().filter(|n| old_objs.contains_key(*n) && !handled_new.contains(*n)) {
            let old_ddl = &old_objs[name].normalized_ddl;
            let new_ddl = &new_objs[name].normalized_ddl;
            if old_ddl == new_ddl {
                continue;
            }
            let decision = self.decide(change_category, change_policy, &format!("recreate {kind:?} '{name}' with a new definition"));
            match decision {
                ActionPolicy::Skip => {}
                ActionPolicy::RequireManualMigration => {
                    self.manual(format!("{kind:?} '{name}' changed definition"));
                }
                ActionPolicy::Proceed => {
                    let old_ddl = old_ddl.clone();
                    let new_ddl = new_ddl.clone();
                    self.drop_object(kind, name)?;
                    self.exec_up(format!("{new_ddl};"))?;
                    self.push_down_group(vec![
                        format!("DROP {kw} \"{name}\";", kw = drop_keyword(kind)),
                        format!("{old_ddl};"),
                    ]);
                    diff.modified.push(name.clone());
                    self.segments.push(NameSegment(format!("modify_{name}")));
                }
                ActionPolicy::Prompt => unreachable!(),
            }
        }

        match kind {
            ObjectKind::VirtualTable => self.result.virtual_tables = diff,
            ObjectKind::View => self.result.views = diff,
            ObjectKind::Trigger => self.result.triggers = diff,
            ObjectKind::Index => self.result.indices = diff,
            ObjectKind::Table => unreachable!("tables go through diff_tables"),
        }
        Ok(())
    }

    fn drop_object(&mut self, kind: ObjectKind, name: &str) -> Result<()> {
        self.exec_up(format!("DROP {kw} \"{name}\";", kw = drop_keyword(kind)))
    }
}

fn drop_keyword(kind: ObjectKind) -> &'static str {
    match kind {
        ObjectKind::Table | ObjectKind::VirtualTable => "TABLE",
        ObjectKind::View => "VIEW",
        ObjectKind::Trigger => "TRIGGER",
        ObjectKind::Index => "INDEX",
    }
}
