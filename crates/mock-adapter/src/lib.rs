//! Offline backend over a persisted table snapshot.
//!
//! All tables live in memory and are written back to the Storage Port as
//! one JSON snapshot (`daal.mock.tables`) after every mutation. The
//! snapshot is read once, at construction.
//!
//! # Concurrency
//!
//! Within one adapter, mutations are serialized by a lock, so a process
//! never interleaves two snapshot rewrites. Two adapters (or processes)
//! sharing the same storage do not coordinate: each rewrites the whole
//! snapshot from its own copy, and the last writer wins. Concurrent inserts
//! through different instances can therefore lose updates.

use async_trait::async_trait;
use daal_core::{
    generate_id, matches, stamp_insert, stamp_update, values_equal, Backend, DaalError,
    DaalResult, FilterSpec, QueryOptions, Record, Session, SessionTracker,
};
use daal_storage::{KeyValueStorage, SessionStore, StorageKeys};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Delay applied before every operation unless configured otherwise.
pub const DEFAULT_LATENCY: Duration = Duration::from_millis(50);

/// Credentials table consulted by sign-in.
pub const AUTH_USERS_TABLE: &str = "auth_users";
pub const PROFILES_TABLE: &str = "profiles";

pub const DEMO_EMAIL: &str = "demo@example.com";
pub const DEMO_PASSWORD: &str = "demo1234";

type Tables = BTreeMap<String, Vec<Record>>;

fn as_record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

/// Tables written when no snapshot exists yet: one demo account and its
/// profile.
fn default_tables() -> Tables {
    let mut user = as_record(json!({
        "email": DEMO_EMAIL,
        "password": DEMO_PASSWORD,
    }));
    stamp_insert(&mut user);
    let mut profile = as_record(json!({
        "id": user["id"].clone(),
        "email": DEMO_EMAIL,
        "full_name": "Demo User",
    }));
    stamp_insert(&mut profile);

    let mut tables = Tables::new();
    tables.insert(AUTH_USERS_TABLE.to_string(), vec![user]);
    tables.insert(PROFILES_TABLE.to_string(), vec![profile]);
    tables
}

/// Credentials record as exposed to callers.
fn principal_of(user: &Record) -> Value {
    let mut principal = user.clone();
    principal.remove("password");
    Value::Object(principal)
}

pub struct MockAdapter {
    storage: Arc<dyn KeyValueStorage>,
    tables: Mutex<Tables>,
    session: SessionTracker,
    latency: Duration,
}

impl MockAdapter {
    /// Load the snapshot from `storage`, seeding default tables when none
    /// exists.
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> DaalResult<Self> {
        let tables = match storage.get(StorageKeys::MOCK_TABLES)? {
            Some(raw) => serde_json::from_str::<Tables>(&raw)
                .map_err(|e| DaalError::Backend(format!("corrupt mock snapshot: {}", e)))?,
            None => {
                let tables = default_tables();
                storage.set(StorageKeys::MOCK_TABLES, &serde_json::to_string(&tables)?)?;
                info!("Seeded mock store with default tables");
                tables
            }
        };
        debug!(tables = tables.len(), "Loaded mock snapshot");

        let session = SessionTracker::persisted(SessionStore::new(
            storage.clone(),
            StorageKeys::MOCK_SESSION_NAMESPACE,
        ));
        Ok(Self {
            storage,
            tables: Mutex::new(tables),
            session,
            latency: DEFAULT_LATENCY,
        })
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Store rows verbatim (no generated columns) and persist.
    pub fn seed(&self, table: &str, rows: Vec<Record>) -> DaalResult<()> {
        self.mutate(|tables| {
            tables.entry(table.to_string()).or_default().extend(rows);
            Ok(())
        })
    }

    /// Copy of a table's current rows.
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.tables.lock().get(table).cloned().unwrap_or_default()
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    /// Run `f` on a copy of the tables, rewrite the snapshot, then publish
    /// the copy, under one lock. Nothing changes if `f` or the write fails.
    fn mutate<T>(&self, f: impl FnOnce(&mut Tables) -> DaalResult<T>) -> DaalResult<T> {
        let mut tables = self.tables.lock();
        let mut next = tables.clone();
        let result = f(&mut next)?;
        let snapshot = serde_json::to_string(&next)?;
        self.storage.set(StorageKeys::MOCK_TABLES, &snapshot)?;
        *tables = next;
        Ok(result)
    }

    fn filtered(&self, table: &str, filters: &FilterSpec) -> Vec<Record> {
        self.tables
            .lock()
            .get(table)
            .map(|rows| rows.iter().filter(|r| matches(r, filters)).cloned().collect())
            .unwrap_or_default()
    }

    fn current_user_id(&self) -> DaalResult<String> {
        self.session
            .current()
            .and_then(|s| s.user_id())
            .ok_or_else(|| DaalError::Auth("not authenticated".to_string()))
    }

    fn start_session(&self, user: &Record) -> DaalResult<Session> {
        let session = Session::new(format!("mock-{}", generate_id()), principal_of(user));
        self.session.establish(session.clone())?;
        Ok(session)
    }
}

#[async_trait]
impl Backend for MockAdapter {
    const NAME: &'static str = "mock";

    fn session(&self) -> &SessionTracker {
        &self.session
    }

    async fn try_query(
        &self,
        table: &str,
        filters: &FilterSpec,
        options: &QueryOptions,
    ) -> DaalResult<Vec<Record>> {
        self.simulate_latency().await;
        let rows = options.apply(self.filtered(table, filters));
        debug!(table, rows = rows.len(), "Mock select");
        Ok(rows)
    }

    async fn try_insert_many(&self, table: &str, records: Vec<Record>) -> DaalResult<Vec<Record>> {
        self.simulate_latency().await;
        self.mutate(|tables| {
            let rows = tables.entry(table.to_string()).or_default();
            let mut inserted = Vec::with_capacity(records.len());
            for mut record in records {
                stamp_insert(&mut record);
                rows.push(record.clone());
                inserted.push(record);
            }
            debug!(table, rows = inserted.len(), "Mock insert");
            Ok(inserted)
        })
    }

    async fn try_update(
        &self,
        table: &str,
        filters: &FilterSpec,
        patch: Record,
    ) -> DaalResult<Vec<Record>> {
        self.simulate_latency().await;
        self.mutate(|tables| {
            let mut updated = Vec::new();
            if let Some(rows) = tables.get_mut(table) {
                for row in rows.iter_mut().filter(|r| matches(r, filters)) {
                    stamp_update(row, &patch);
                    updated.push(row.clone());
                }
            }
            debug!(table, rows = updated.len(), "Mock update");
            Ok(updated)
        })
    }

    async fn try_delete(&self, table: &str, filters: &FilterSpec) -> DaalResult<Vec<Record>> {
        self.simulate_latency().await;
        self.mutate(|tables| {
            let Some(rows) = tables.get_mut(table) else {
                return Ok(Vec::new());
            };
            let (removed, kept): (Vec<Record>, Vec<Record>) =
                rows.drain(..).partition(|r| matches(r, filters));
            *rows = kept;
            debug!(table, rows = removed.len(), "Mock delete");
            Ok(removed)
        })
    }

    async fn try_upsert(&self, table: &str, record: Record) -> DaalResult<Record> {
        self.simulate_latency().await;
        self.mutate(|tables| {
            let rows = tables.entry(table.to_string()).or_default();
            let existing = record.get("id").filter(|id| !id.is_null()).and_then(|id| {
                rows.iter_mut()
                    .find(|r| r.get("id").is_some_and(|v| values_equal(v, id)))
            });
            match existing {
                Some(row) => {
                    stamp_update(row, &record);
                    Ok(row.clone())
                }
                None => {
                    let mut record = record;
                    stamp_insert(&mut record);
                    rows.push(record.clone());
                    Ok(record)
                }
            }
        })
    }

    async fn try_count(&self, table: &str, filters: &FilterSpec) -> DaalResult<u64> {
        self.simulate_latency().await;
        Ok(self.filtered(table, filters).len() as u64)
    }

    async fn try_rpc(&self, name: &str, params: Value) -> DaalResult<Value> {
        self.simulate_latency().await;
        match name {
            "get_current_profile" => {
                let user_id = self.current_user_id()?;
                let profile = self
                    .filtered(PROFILES_TABLE, &FilterSpec::new().eq("id", user_id))
                    .into_iter()
                    .next();
                Ok(profile.map(Value::Object).unwrap_or(Value::Null))
            }
            "update_current_profile" => {
                let user_id = self.current_user_id()?;
                let Value::Object(patch) = params else {
                    return Err(DaalError::Validation(
                        "update_current_profile expects an object".to_string(),
                    ));
                };
                let filters = FilterSpec::new().eq("id", user_id);
                self.mutate(|tables| {
                    let profile = tables
                        .get_mut(PROFILES_TABLE)
                        .and_then(|rows| rows.iter_mut().find(|r| matches(r, &filters)))
                        .ok_or_else(|| DaalError::NotFound("profile".to_string()))?;
                    stamp_update(profile, &patch);
                    Ok(Value::Object(profile.clone()))
                })
            }
            other => {
                debug!(function = other, "Unknown mock procedure, returning null");
                Ok(Value::Null)
            }
        }
    }

    async fn try_sign_in(&self, email: &str, password: &str) -> DaalResult<Session> {
        self.simulate_latency().await;
        let credentials = FilterSpec::new().eq("email", email).eq("password", password);
        let user = self
            .filtered(AUTH_USERS_TABLE, &credentials)
            .into_iter()
            .next()
            .ok_or_else(|| DaalError::Auth("Invalid login credentials".to_string()))?;
        let session = self.start_session(&user)?;
        info!(user_id = ?session.user_id(), "Mock sign-in");
        Ok(session)
    }

    async fn try_sign_up(&self, email: &str, password: &str) -> DaalResult<Session> {
        self.simulate_latency().await;
        let user = self.mutate(|tables| {
            let taken = tables
                .get(AUTH_USERS_TABLE)
                .is_some_and(|rows| rows.iter().any(|r| r.get("email").and_then(Value::as_str) == Some(email)));
            if taken {
                return Err(DaalError::Validation(format!(
                    "email {} is already registered",
                    email
                )));
            }

            let mut user = as_record(json!({ "email": email, "password": password }));
            stamp_insert(&mut user);
            let mut profile = as_record(json!({
                "id": user["id"].clone(),
                "email": email,
                "full_name": Value::Null,
            }));
            stamp_insert(&mut profile);

            tables
                .entry(AUTH_USERS_TABLE.to_string())
                .or_default()
                .push(user.clone());
            tables
                .entry(PROFILES_TABLE.to_string())
                .or_default()
                .push(profile);
            Ok(user)
        })?;
        let session = self.start_session(&user)?;
        info!(user_id = ?session.user_id(), "Mock sign-up");
        Ok(session)
    }

    async fn try_sign_out(&self) -> DaalResult<()> {
        self.simulate_latency().await;
        self.session.sign_out()?;
        Ok(())
    }
}

impl std::fmt::Debug for MockAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockAdapter")
            .field("latency", &self.latency)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daal_core::{BackendAdapter, OrderBy};
    use daal_storage::{FileStorage, MemoryStorage, StorageError, StorageResult};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::tempdir;

    fn record(value: Value) -> Record {
        as_record(value)
    }

    fn adapter_on(storage: Arc<dyn KeyValueStorage>) -> MockAdapter {
        MockAdapter::new(storage).unwrap().with_latency(Duration::ZERO)
    }

    fn adapter() -> MockAdapter {
        adapter_on(Arc::new(MemoryStorage::new()))
    }

    /// Memory storage whose writes can be switched off.
    #[derive(Default)]
    struct FlakyStorage {
        inner: MemoryStorage,
        fail_writes: AtomicBool,
    }

    impl KeyValueStorage for FlakyStorage {
        fn set(&self, key: &str, value: &str) -> StorageResult<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StorageError::Io(std::io::Error::other("disk full")));
            }
            self.inner.set(key, value)
        }

        fn get(&self, key: &str) -> StorageResult<Option<String>> {
            self.inner.get(key)
        }

        fn delete(&self, key: &str) -> StorageResult<bool> {
            self.inner.delete(key)
        }

        fn list_keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
            self.inner.list_keys_with_prefix(prefix)
        }
    }

    #[tokio::test]
    async fn test_insert_then_select_by_name() {
        let adapter = adapter();
        adapter.insert("widgets", record(json!({"name": "W1"}))).await;

        let envelope = adapter
            .select("widgets", "*", &FilterSpec::new().eq("name", "W1"))
            .await;
        assert!(envelope.success);
        let rows = envelope.data.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "W1");
        for column in ["id", "created_at", "updated_at"] {
            assert!(rows[0][column].as_str().is_some_and(|s| !s.is_empty()));
        }
    }

    #[tokio::test]
    async fn test_failed_snapshot_write_discards_mutation() {
        let storage = Arc::new(FlakyStorage::default());
        let adapter = adapter_on(storage.clone());
        adapter.insert("widgets", record(json!({"name": "kept"}))).await;

        storage.fail_writes.store(true, Ordering::SeqCst);
        let envelope = adapter.insert("widgets", record(json!({"name": "lost"}))).await;
        assert!(!envelope.success);
        let envelope = adapter
            .update("widgets", &FilterSpec::new(), record(json!({"name": "renamed"})))
            .await;
        assert!(!envelope.success);
        let envelope = adapter.delete("widgets", &FilterSpec::new()).await;
        assert!(!envelope.success);

        let rows = adapter.select("widgets", "*", &FilterSpec::new()).await.data.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "kept");
        assert_eq!(adapter.count("widgets", &FilterSpec::new()).await.data, Some(1));
    }

    #[tokio::test]
    async fn test_seeds_demo_account_once() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let first = adapter_on(storage.clone());
        assert_eq!(first.rows(AUTH_USERS_TABLE).len(), 1);
        first.delete(AUTH_USERS_TABLE, &FilterSpec::new()).await;

        let second = adapter_on(storage);
        assert!(second.rows(AUTH_USERS_TABLE).is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_survives_restart_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");
        {
            let adapter = adapter_on(Arc::new(FileStorage::open(&path).unwrap()));
            adapter.insert("widgets", record(json!({"name": "persisted"}))).await;
        }
        let reopened = adapter_on(Arc::new(FileStorage::open(&path).unwrap()));
        let count = reopened
            .count("widgets", &FilterSpec::new().eq("name", "persisted"))
            .await;
        assert_eq!(count.data, Some(1));
    }

    #[tokio::test]
    async fn test_update_scopes_to_matches_and_advances_updated_at() {
        let adapter = adapter();
        let rows = adapter
            .insert_many(
                "widgets",
                vec![record(json!({"name": "a", "qty": 1})), record(json!({"name": "b", "qty": 2}))],
            )
            .await
            .data
            .unwrap();

        let updated = adapter
            .update("widgets", &FilterSpec::new().eq("name", "a"), record(json!({"qty": 10, "id": "hijack"})))
            .await
            .data
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0]["qty"], 10);
        assert_eq!(updated[0]["id"], rows[0]["id"]);
        assert!(updated[0]["updated_at"].as_str() > rows[0]["updated_at"].as_str());

        let untouched = adapter
            .select_one("widgets", "*", &FilterSpec::new().eq("name", "b"))
            .await
            .data
            .flatten()
            .unwrap();
        assert_eq!(untouched, rows[1]);
    }

    #[tokio::test]
    async fn test_delete_returns_removed_rows() {
        let adapter = adapter();
        adapter.seed("t", vec![record(json!({"id": 1})), record(json!({"id": 2}))]).unwrap();
        let removed = adapter.delete("t", &FilterSpec::new().gt("id", 1)).await;
        assert_eq!(removed.data, Some(vec![record(json!({"id": 2}))]));
        assert_eq!(adapter.rows("t"), vec![record(json!({"id": 1}))]);
    }

    #[tokio::test]
    async fn test_query_options_and_projection() {
        let adapter = adapter();
        adapter
            .seed(
                "t",
                vec![
                    record(json!({"id": 1, "n": "c"})),
                    record(json!({"id": 2, "n": "a"})),
                    record(json!({"id": 3, "n": "b"})),
                ],
            )
            .unwrap();
        let options = QueryOptions::columns("n")
            .with_order(OrderBy::asc("n"))
            .with_limit(2);
        let rows = adapter.query("t", &FilterSpec::new(), &options).await.data.unwrap();
        assert_eq!(rows, vec![record(json!({"n": "a"})), record(json!({"n": "b"}))]);
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_merges() {
        let adapter = adapter();
        let first = adapter.upsert("t", record(json!({"id": "k", "v": 1}))).await.data.unwrap();
        let second = adapter.upsert("t", record(json!({"id": "k", "v": 2}))).await.data.unwrap();
        assert_eq!(second["v"], 2);
        assert_eq!(second["created_at"], first["created_at"]);
        assert_eq!(adapter.rows("t").len(), 1);
    }

    #[tokio::test]
    async fn test_auth_lifecycle_and_profile_rpcs() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let adapter = adapter_on(storage.clone());

        let denied = adapter.rpc("get_current_profile", Value::Null).await;
        assert_eq!(denied.error.as_deref(), Some("Auth error: not authenticated"));

        let bad = adapter.sign_in(DEMO_EMAIL, "wrong").await;
        assert_eq!(bad.error.as_deref(), Some("Auth error: Invalid login credentials"));

        let session = adapter.sign_in(DEMO_EMAIL, DEMO_PASSWORD).await.data.unwrap();
        assert!(session.principal.get("password").is_none());

        let profile = adapter.rpc("get_current_profile", Value::Null).await.data.unwrap();
        assert_eq!(profile["full_name"], "Demo User");
        let profile = adapter
            .rpc("update_current_profile", json!({"full_name": "Renamed"}))
            .await
            .data
            .unwrap();
        assert_eq!(profile["full_name"], "Renamed");

        assert_eq!(adapter.rpc("unknown_fn", json!({})).await.data, Some(Value::Null));

        // Session survives a restart.
        let restarted = adapter_on(storage);
        assert_eq!(restarted.is_authenticated().await.data, Some(true));
        assert!(restarted.sign_out().await.success);
        assert_eq!(restarted.is_authenticated().await.data, Some(false));
    }

    #[tokio::test]
    async fn test_sign_up_rejects_duplicates_and_creates_profile() {
        let adapter = adapter();
        let duplicate = adapter.sign_up(DEMO_EMAIL, "x").await;
        assert!(duplicate.error.unwrap().starts_with("Validation error"));

        let session = adapter.sign_up("new@example.com", "pw").await.data.unwrap();
        let user_id = session.user_id().unwrap();
        let profile = adapter
            .select_one(PROFILES_TABLE, "email", &FilterSpec::new().eq("id", user_id))
            .await;
        assert_eq!(
            profile.data.flatten(),
            Some(record(json!({"email": "new@example.com"})))
        );
        assert_eq!(
            adapter.get_current_user().await.data.flatten().unwrap()["email"],
            "new@example.com"
        );
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_an_error() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        storage.set(StorageKeys::MOCK_TABLES, "[1,2]").unwrap();
        assert!(MockAdapter::new(storage).is_err());
    }

    #[tokio::test]
    async fn test_latency_is_applied() {
        let adapter = MockAdapter::new(Arc::new(MemoryStorage::new()))
            .unwrap()
            .with_latency(Duration::from_millis(20));
        let started = std::time::Instant::now();
        adapter.count("t", &FilterSpec::new()).await;
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
