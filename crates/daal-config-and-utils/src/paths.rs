//! Filesystem locations used by DAAL binaries.

use crate::{CoreError, CoreResult};
use std::path::{Path, PathBuf};

/// Resolves every file DAAL reads or writes under one base directory.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory (~/.daal)
    base_dir: PathBuf,
}

impl Paths {
    /// Paths rooted at `~/.daal`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;
        Ok(Self {
            base_dir: home.join(".daal"),
        })
    }

    /// Paths rooted at a custom directory (tests, portable installs).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// `~/.daal/config.json`
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// `~/.daal/storage.json`, the persisted key-value snapshot.
    pub fn storage_file(&self) -> PathBuf {
        self.base_dir.join("storage.json")
    }

    /// `~/.daal/daal.sqlite`, the default SQLite database.
    pub fn database_file(&self) -> PathBuf {
        self.base_dir.join("daal.sqlite")
    }

    /// `~/.daal/logs`
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// `~/.daal/logs/daal.jsonl`
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("daal.jsonl")
    }

    /// Create the base and log directories.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_layout() {
        let paths = Paths::with_base_dir(PathBuf::from("/tmp/daal-test"));
        assert_eq!(paths.config_file(), PathBuf::from("/tmp/daal-test/config.json"));
        assert_eq!(paths.storage_file(), PathBuf::from("/tmp/daal-test/storage.json"));
        assert_eq!(paths.database_file(), PathBuf::from("/tmp/daal-test/daal.sqlite"));
        assert_eq!(paths.log_file(), PathBuf::from("/tmp/daal-test/logs/daal.jsonl"));
    }

    #[test]
    fn test_ensure_dirs_creates_tree() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().join("nested"));
        paths.ensure_dirs().unwrap();
        assert!(paths.base_dir().exists());
        assert!(paths.logs_dir().exists());
    }
}
