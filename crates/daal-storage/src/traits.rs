//! Storage trait definitions.

use crate::StorageResult;

/// Key-value port over string blobs.
///
/// Implementations must be cheap to share behind `Arc` and safe to call from
/// any task. Writes are last-writer-wins per key; there is no
/// compare-and-swap.
pub trait KeyValueStorage: Send + Sync {
    /// Store a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Retrieve a value.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Delete a value. Returns true if the key existed.
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Check if a key exists.
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// List all keys starting with `prefix`, in lexical order.
    fn list_keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>>;
}
