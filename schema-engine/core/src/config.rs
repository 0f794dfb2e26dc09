//! Configuration loading: a TOML file merged with `SQLITE_MIGRATOR_*`
//! environment overrides, producing the options every `Migrator` call
//! needs.

use schema_connector::{ActionPolicy, MigrationError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_path: PathBuf,
    pub migrations_path: PathBuf,
    pub schema_path: PathBuf,
    pub migrations_table: String,
    pub create_db_if_missing: bool,
    pub only_track_ambiguous_state: bool,
    pub ignore_name_case: bool,
    pub hide_warnings: bool,
    pub create_if_no_changes: bool,
    pub create_on_manual_migration: bool,

    #[serde(with = "policy_serde")]
    pub on_rename: ActionPolicy,
    #[serde(with = "policy_serde")]
    pub on_destructive_change: ActionPolicy,
    #[serde(with = "policy_serde")]
    pub on_changed_index: ActionPolicy,
    #[serde(with = "policy_serde")]
    pub on_changed_view: ActionPolicy,
    #[serde(with = "policy_serde")]
    pub on_changed_trigger: ActionPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./db.sqlite3"),
            migrations_path: PathBuf::from("./migrations"),
            schema_path: PathBuf::from("./schema.sql"),
            migrations_table: "migrations".to_owned(),
            create_db_if_missing: false,
            only_track_ambiguous_state: false,
            ignore_name_case: false,
            hide_warnings: false,
            create_if_no_changes: false,
            create_on_manual_migration: false,
            on_rename: ActionPolicy::Prompt,
            on_destructive_change: ActionPolicy::Prompt,
            on_changed_index: ActionPolicy::Proceed,
            on_changed_view: ActionPolicy::Proceed,
            on_changed_trigger: ActionPolicy::Proceed,
        }
    }
}

impl Config {
    /// Reads a TOML file at `path`, falling back to defaults for any
    /// field it does not set, then layers `SQLITE_MIGRATOR_*` environment
    /// variables over the result.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&text).map_err(|e| MigrationError::Parse(e.to_string()))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Same as [`Config::load`] but starting from defaults when no config
    /// file exists at `path`.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let mut config = Self::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SQLITE_MIGRATOR_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SQLITE_MIGRATOR_MIGRATIONS_PATH") {
            self.migrations_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SQLITE_MIGRATOR_SCHEMA_PATH") {
            self.schema_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SQLITE_MIGRATOR_MIGRATIONS_TABLE") {
            self.migrations_table = v;
        }
        if let Ok(v) = std::env::var("SQLITE_MIGRATOR_CREATE_DB_IF_MISSING") {
            self.create_db_if_missing = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("SQLITE_MIGRATOR_ONLY_TRACK_AMBIGUOUS_STATE") {
            self.only_track_ambiguous_state = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("SQLITE_MIGRATOR_IGNORE_NAME_CASE") {
            self.ignore_name_case = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("SQLITE_MIGRATOR_HIDE_WARNINGS") {
            self.hide_warnings = parse_bool(&v);
        }
    }

    fn validate(&self) -> Result<()> {
        if self.migrations_table.trim().is_empty() {
            return Err(MigrationError::validation("migrations_table must not be empty"));
        }
        Ok(())
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

mod policy_serde {
    use schema_connector::{ActionPolicy, MigrationError};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(policy: &ActionPolicy, serializer: S) -> Result<S::Ok, S::Error> {
        let s = match policy {
            ActionPolicy::Proceed => "proceed",
            ActionPolicy::Skip => "skip",
            ActionPolicy::RequireManualMigration => "require_manual_migration",
            ActionPolicy::Prompt => "prompt",
        };
        serializer.serialize_str(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ActionPolicy, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ActionPolicy::parse(&raw).map_err(|e: MigrationError| serde::de::Error::custom(e.to_string()))
    }
}
