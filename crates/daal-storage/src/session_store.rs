//! Per-adapter session persistence.

use crate::{KeyValueStorage, StorageKeys, StorageResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Persists one serialized session under a namespaced key.
///
/// Each adapter gets its own namespace (see [`StorageKeys`]), so signing out
/// of one backend never touches another backend's session.
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn KeyValueStorage>,
    key: String,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>, namespace: &str) -> Self {
        Self {
            storage,
            key: StorageKeys::session_key(namespace),
        }
    }

    /// Storage key holding the session.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Store the session, replacing any previous one.
    pub fn save<T: Serialize>(&self, session: &T) -> StorageResult<()> {
        let encoded = serde_json::to_string(session)?;
        self.storage.set(&self.key, &encoded)
    }

    /// Load the stored session, if any.
    pub fn load<T: DeserializeOwned>(&self) -> StorageResult<Option<T>> {
        match self.storage.get(&self.key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Remove the stored session. Returns true if one existed.
    pub fn clear(&self) -> StorageResult<bool> {
        let removed = self.storage.delete(&self.key)?;
        if removed {
            tracing::debug!(key = %self.key, "Cleared stored session");
        }
        Ok(removed)
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStorage;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestSession {
        token: String,
        user_id: String,
    }

    #[test]
    fn test_save_load_clear() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let store = SessionStore::new(storage.clone(), StorageKeys::HTTP_SESSION_NAMESPACE);

        assert_eq!(store.load::<TestSession>().unwrap(), None);

        let session = TestSession {
            token: "tok".to_string(),
            user_id: "user-1".to_string(),
        };
        store.save(&session).unwrap();
        assert_eq!(store.load::<TestSession>().unwrap(), Some(session));
        assert!(storage.has("daal.http.session").unwrap());

        assert!(store.clear().unwrap());
        assert!(!store.clear().unwrap());
        assert_eq!(store.load::<TestSession>().unwrap(), None);
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let http = SessionStore::new(storage.clone(), StorageKeys::HTTP_SESSION_NAMESPACE);
        let mock = SessionStore::new(storage, StorageKeys::MOCK_SESSION_NAMESPACE);

        http.save(&serde_json::json!({"token": "a"})).unwrap();
        mock.save(&serde_json::json!({"token": "b"})).unwrap();
        http.clear().unwrap();

        let remaining: Option<serde_json::Value> = mock.load().unwrap();
        assert_eq!(remaining.unwrap()["token"], "b");
    }

    #[test]
    fn test_storage_keys_unique() {
        let keys = [
            StorageKeys::MOCK_TABLES.to_string(),
            StorageKeys::session_key(StorageKeys::MOCK_SESSION_NAMESPACE),
            StorageKeys::session_key(StorageKeys::HTTP_SESSION_NAMESPACE),
            StorageKeys::session_key(StorageKeys::EMBEDDED_SESSION_NAMESPACE),
            StorageKeys::session_key(StorageKeys::SQL_SESSION_NAMESPACE),
        ];
        let unique: std::collections::HashSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), keys.len(), "Storage keys must be unique");
    }
}
