//! Scans a directory of `NNNN_name.toml` migration files, maintaining
//! ascending order by numeric id, and writes new ones with the fixed
//! generator template.

use schema_connector::{MigrationError, Result};
use sql_schema_connector::file_hash;
use std::fs;
use std::path::{Path, PathBuf};

pub const FILE_SUFFIX: &str = "toml";

#[derive(Debug, Clone)]
pub struct MigrationFile {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    pub content_hash: String,
}

impl MigrationFile {
    pub fn read_content(&self) -> Result<String> {
        Ok(fs::read_to_string(&self.path)?)
    }
}

#[derive(Debug)]
pub struct Registry {
    dir: PathBuf,
    files: Vec<MigrationFile>,
}

impl Registry {
    /// Opens `dir`, creating it if it does not exist yet, and scans its
    /// current contents.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let mut registry = Self {
            dir: dir.to_owned(),
            files: Vec::new(),
        };
        registry.rescan()?;
        Ok(registry)
    }

    /// A file participates iff its name contains at least one `_` and
    /// ends in [`FILE_SUFFIX`]. `id` is the substring before the first
    /// `_`; `name` is the remainder with the suffix removed. The result
    /// is sorted ascending by numeric id — equivalent to lexicographic
    /// order because every id is zero-padded to the same width.
    pub fn rescan(&mut self) -> Result<()> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(stripped) = file_name.strip_suffix(&format!(".{FILE_SUFFIX}")) else {
                continue;
            };
            let Some((id, name)) = stripped.split_once('_') else {
                continue;
            };
            if id.parse::<u32>().is_err() {
                continue;
            }
            let content = fs::read_to_string(&path)?;
            files.push(MigrationFile {
                id: id.to_owned(),
                name: name.to_owned(),
                path,
                content_hash: file_hash(content.as_bytes()),
            });
        }
        files.sort_by(|a, b| a.id.cmp(&b.id));
        self.files = files;
        Ok(())
    }

    pub fn files(&self) -> &[MigrationFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn next_id(&self) -> String {
        format!("{:04}", self.files.len())
    }

    /// Writes `content` to a new file named `{next_id}_{name_segment}.toml`
    /// and records it in the registry.
    pub fn write_new(&mut self, name_segment: &str, content: &str) -> Result<MigrationFile> {
        let id = self.next_id();
        let file_name = format!("{id}_{name_segment}.{FILE_SUFFIX}");
        let path = self.dir.join(&file_name);
        fs::write(&path, content)?;
        let file = MigrationFile {
            id,
            name: name_segment.to_owned(),
            path,
            content_hash: file_hash(content.as_bytes()),
        };
        self.files.push(file.clone());
        Ok(file)
    }

    pub fn find(&self, id: &str) -> Option<&MigrationFile> {
        self.files.iter().find(|f| f.id == id)
    }

    pub fn position(&self, id: &str) -> Result<usize> {
        self.files
            .iter()
            .position(|f| f.id == id)
            .ok_or_else(|| MigrationError::validation(format!("no migration with id '{id}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_and_sorts_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("0001_second.toml"), "kind=\"standard\"\nup=[]\ndown=[]\n").unwrap();
        fs::write(dir.path().join("0000_first.toml"), "kind=\"standard\"\nup=[]\ndown=[]\n").unwrap();
        fs::write(dir.path().join("README.md"), "not a migration").unwrap();

        let registry = Registry::open(dir.path()).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.files()[0].name, "first");
        assert_eq!(registry.files()[1].name, "second");
    }

    #[test]
    fn next_id_is_zero_padded() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::open(dir.path()).unwrap();
        assert_eq!(registry.next_id(), "0000");
        registry.write_new("create_users", "kind=\"standard\"\nup=[]\ndown=[]\n").unwrap();
        assert_eq!(registry.next_id(), "0001");
    }
}
