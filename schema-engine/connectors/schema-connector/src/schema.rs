use indexmap::IndexMap;
use std::collections::BTreeMap;

/// Kinds of schema object the differ orders and diffs.
/// Columns are not listed here: they are owned by their table and diffed
/// per-table rather than as a top-level object set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    VirtualTable,
    Table,
    View,
    Trigger,
    Index,
}

impl ObjectKind {
    /// The name-segment prefix used when synthesizing a migration file name.
    pub fn create_prefix(self) -> &'static str {
        match self {
            ObjectKind::VirtualTable => "create-virtual_",
            ObjectKind::Table => "create_",
            ObjectKind::View => "create-view_",
            ObjectKind::Trigger => "create-trigger_",
            ObjectKind::Index => "create-index_",
        }
    }
}

/// One column of a table, the merge of `PRAGMA table_info` and
/// `PRAGMA foreign_key_list` keyed by column name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub sql_type: String,
    pub not_null: bool,
    pub default: Option<String>,
    /// 1-based position in the primary key, 0 if the column is not part of
    /// one (mirrors `PRAGMA table_info`'s `pk` column directly).
    pub pk_position: u32,
    pub foreign_key: Option<ForeignKeyRef>,
}

/// The table and column a column's `REFERENCES` clause targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyRef {
    pub table: String,
    pub column: String,
}

/// A normalized top-level schema object: a table, virtual table, view,
/// index or trigger, keyed by name elsewhere in [`DatabaseSchema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaObject {
    pub name: String,
    pub normalized_ddl: String,
}

/// Everything the introspector can read back out of `sqlite_master` and
/// `PRAGMA`s for one connection.
#[derive(Debug, Clone, Default)]
pub struct DatabaseSchema {
    pub tables: IndexMap<String, SchemaObject>,
    pub virtual_tables: IndexMap<String, SchemaObject>,
    pub views: IndexMap<String, SchemaObject>,
    pub indices: IndexMap<String, SchemaObject>,
    pub triggers: IndexMap<String, SchemaObject>,
    /// Columns owned by each table, in `PRAGMA table_info` order.
    pub columns: IndexMap<String, IndexMap<String, ColumnInfo>>,
    pub pragmas: BTreeMap<String, String>,
}

impl DatabaseSchema {
    pub fn objects(&self, kind: ObjectKind) -> &IndexMap<String, SchemaObject> {
        match kind {
            ObjectKind::Table => &self.tables,
            ObjectKind::VirtualTable => &self.virtual_tables,
            ObjectKind::View => &self.views,
            ObjectKind::Index => &self.indices,
            ObjectKind::Trigger => &self.triggers,
        }
    }

    pub fn objects_mut(&mut self, kind: ObjectKind) -> &mut IndexMap<String, SchemaObject> {
        match kind {
            ObjectKind::Table => &mut self.tables,
            ObjectKind::VirtualTable => &mut self.virtual_tables,
            ObjectKind::View => &mut self.views,
            ObjectKind::Index => &mut self.indices,
            ObjectKind::Trigger => &mut self.triggers,
        }
    }
}

/// Pre-normalization DDL keyed by name, preserving insertion (i.e.
/// `sqlite_master` rowid) order, on both sides of a rename detection.
/// `old -> new`.
pub type RenameMap = IndexMap<String, String>;

/// The added/removed/modified/renamed sets for one [`ObjectKind`], plus the
/// same shape reused per-table for column diffs.
#[derive(Debug, Clone, Default)]
pub struct KindDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
    pub renamed: RenameMap,
}

impl KindDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty() && self.renamed.is_empty()
    }
}

/// The differ's complete output for one `make`/`migrate` diff call.
#[derive(Debug, Clone, Default)]
pub struct DiffResult {
    pub virtual_tables: KindDiff,
    pub tables: KindDiff,
    pub views: KindDiff,
    pub triggers: KindDiff,
    pub indices: KindDiff,
    /// Column diffs, keyed by the (post-rename) table name.
    pub columns: IndexMap<String, KindDiff>,
    pub up: Vec<String>,
    pub down: Vec<String>,
    pub manual_reasons: Vec<crate::ManualReason>,
    pub has_ambiguous_change: bool,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.up.is_empty() && self.down.is_empty()
    }
}

/// Unordered pragma name -> scalar value, split by whether the pragma
/// persists in the file header.
#[derive(Debug, Clone, Default)]
pub struct PragmaSnapshot {
    pub persistent: BTreeMap<String, String>,
    pub non_persistent: BTreeMap<String, String>,
}

impl PragmaSnapshot {
    pub fn all(&self) -> BTreeMap<String, String> {
        let mut merged = self.persistent.clone();
        merged.extend(self.non_persistent.clone());
        merged
    }
}
