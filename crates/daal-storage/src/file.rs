//! JSON-file backed storage.

use crate::{KeyValueStorage, StorageError, StorageResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Persists every key in a single JSON object on disk.
///
/// The document is loaded once at construction and rewritten in full on every
/// mutation (temp file + rename, so readers never observe a torn file). A
/// mutation that fails to persist leaves the in-memory view untouched. Two
/// `FileStorage` values pointed at the same path do not see each other's
/// writes; the last one to write wins.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    data: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open (or lazily create) the document at `path`.
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        let data = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str::<BTreeMap<String, String>>(&content).map_err(|e| {
                    StorageError::Corrupt {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    }
                })?
            }
        } else {
            BTreeMap::new()
        };

        info!(path = %path.display(), keys = data.len(), "Opened file storage");

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, data: &BTreeMap<String, String>) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(data)?)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), keys = data.len(), "Persisted file storage");
        Ok(())
    }
}

impl KeyValueStorage for FileStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut data = self.data.lock();
        let mut next = data.clone();
        next.insert(key.to_string(), value.to_string());
        self.persist(&next)?;
        *data = next;
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let mut data = self.data.lock();
        if !data.contains_key(key) {
            return Ok(false);
        }
        let mut next = data.clone();
        next.remove(key);
        self.persist(&next)?;
        *data = next;
        Ok(true)
    }

    fn list_keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .data
            .lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
