use crate::{SqlBuilder, SqlDialect, SqlExecutor, SqlStatement};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use daal_core::{
    generate_id, timestamp_now, Backend, Columns, DaalError, DaalResult, FilterSpec,
    QueryOptions, Record, Session, SessionTracker,
};
use daal_storage::{KeyValueStorage, SessionStore, StorageKeys};
use rand::RngCore;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Credentials table consulted by sign-in and written by sign-up.
pub const AUTH_USERS_TABLE: &str = "auth_users";

/// `auth_users` layout for SQLite databases.
pub const SQLITE_AUTH_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS auth_users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    salt TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);
";

const SALT_LEN: usize = 16;

fn hash_password(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    STANDARD.encode(hasher.finalize())
}

fn new_credentials(password: &str) -> (String, String) {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    (STANDARD.encode(salt), hash_password(&salt, password))
}

fn verify_password(user: &Record, password: &str) -> bool {
    let (Some(salt), Some(expected)) = (
        user.get("salt").and_then(Value::as_str),
        user.get("password_hash").and_then(Value::as_str),
    ) else {
        return false;
    };
    match STANDARD.decode(salt) {
        Ok(salt) => hash_password(&salt, password) == expected,
        Err(_) => false,
    }
}

/// Credentials row as exposed to callers.
fn principal_of(mut user: Record) -> Value {
    user.remove("password_hash");
    user.remove("salt");
    Value::Object(user)
}

fn invalid_credentials() -> DaalError {
    DaalError::Auth("Invalid login credentials".to_string())
}

/// Backend that turns every operation into one parameterized statement.
///
/// Updates and deletes refuse to run without a filter. When a touch column
/// is configured, updates and upserts that do not set it get the current
/// timestamp.
pub struct SqlAdapter {
    executor: Arc<dyn SqlExecutor>,
    builder: SqlBuilder,
    session: SessionTracker,
    touch_column: Option<String>,
}

impl SqlAdapter {
    /// Adapter with a process-local session.
    pub fn new(executor: Arc<dyn SqlExecutor>, dialect: SqlDialect) -> Self {
        Self {
            executor,
            builder: SqlBuilder::new(dialect),
            session: SessionTracker::in_memory(),
            touch_column: None,
        }
    }

    /// Persist the session to `storage` so it survives restarts.
    pub fn with_session_storage(mut self, storage: Arc<dyn KeyValueStorage>) -> Self {
        self.session = SessionTracker::persisted(SessionStore::new(
            storage,
            StorageKeys::SQL_SESSION_NAMESPACE,
        ));
        self
    }

    pub fn with_touch_column(mut self, column: impl Into<String>) -> Self {
        self.touch_column = Some(column.into());
        self
    }

    fn touch(&self, record: &mut Record) {
        if let Some(column) = &self.touch_column {
            if !record.contains_key(column) {
                record.insert(column.clone(), Value::String(timestamp_now()));
            }
        }
    }

    async fn run(&self, statement: SqlStatement) -> DaalResult<Vec<Record>> {
        debug!(sql = %statement.sql, args = statement.args.len(), "Executing statement");
        self.executor
            .execute(&statement.sql, &statement.args)
            .await
            .map_err(|e| {
                warn!(sql = %statement.sql, error = %e, "Statement failed");
                DaalError::from(e)
            })
    }

    async fn first_row(&self, statement: SqlStatement) -> DaalResult<Option<Record>> {
        Ok(self.run(statement).await?.into_iter().next())
    }

    async fn find_user(&self, email: &str) -> DaalResult<Option<Record>> {
        let statement = self.builder.select_one(
            AUTH_USERS_TABLE,
            &Columns::All,
            &FilterSpec::new().eq("email", email),
        )?;
        self.first_row(statement).await
    }
}

#[async_trait]
impl Backend for SqlAdapter {
    const NAME: &'static str = "sql";

    fn session(&self) -> &SessionTracker {
        &self.session
    }

    async fn try_query(
        &self,
        table: &str,
        filters: &FilterSpec,
        options: &QueryOptions,
    ) -> DaalResult<Vec<Record>> {
        let statement = self.builder.select(table, filters, options)?;
        self.run(statement).await
    }

    async fn try_select_one(
        &self,
        table: &str,
        columns: &Columns,
        filters: &FilterSpec,
    ) -> DaalResult<Option<Record>> {
        let statement = self.builder.select_one(table, columns, filters)?;
        self.first_row(statement).await
    }

    async fn try_insert_many(&self, table: &str, records: Vec<Record>) -> DaalResult<Vec<Record>> {
        let statement = self.builder.insert(table, &records)?;
        self.run(statement).await
    }

    async fn try_update(
        &self,
        table: &str,
        filters: &FilterSpec,
        mut patch: Record,
    ) -> DaalResult<Vec<Record>> {
        self.touch(&mut patch);
        let statement = self.builder.update(table, filters, &patch)?;
        self.run(statement).await
    }

    async fn try_delete(&self, table: &str, filters: &FilterSpec) -> DaalResult<Vec<Record>> {
        let statement = self.builder.delete(table, filters)?;
        self.run(statement).await
    }

    async fn try_upsert(&self, table: &str, mut record: Record) -> DaalResult<Record> {
        self.touch(&mut record);
        let statement = self.builder.upsert(table, &record)?;
        self.first_row(statement)
            .await?
            .ok_or_else(|| DaalError::Backend(format!("upsert into {} returned no rows", table)))
    }

    async fn try_count(&self, table: &str, filters: &FilterSpec) -> DaalResult<u64> {
        let statement = self.builder.count(table, filters)?;
        self.first_row(statement)
            .await?
            .and_then(|row| row.values().next().and_then(Value::as_u64))
            .ok_or_else(|| DaalError::Backend(format!("count on {} returned no value", table)))
    }

    async fn try_rpc(&self, name: &str, params: Value) -> DaalResult<Value> {
        let statement = self.builder.rpc(name, &params)?;
        Ok(self
            .first_row(statement)
            .await?
            .and_then(|mut row| row.remove("result"))
            .unwrap_or(Value::Null))
    }

    async fn try_sign_in(&self, email: &str, password: &str) -> DaalResult<Session> {
        let user = self.find_user(email).await?.ok_or_else(invalid_credentials)?;
        if !verify_password(&user, password) {
            return Err(invalid_credentials());
        }
        let session = Session::new(format!("sql-{}", generate_id()), principal_of(user));
        self.session.establish(session.clone())?;
        info!(user_id = ?session.user_id(), "SQL sign-in");
        Ok(session)
    }

    async fn try_sign_up(&self, email: &str, password: &str) -> DaalResult<Session> {
        if self.find_user(email).await?.is_some() {
            return Err(DaalError::Validation(format!(
                "email {} is already registered",
                email
            )));
        }

        let (salt, password_hash) = new_credentials(password);
        let mut user = Record::new();
        user.insert("id".to_string(), Value::String(generate_id()));
        user.insert("email".to_string(), Value::String(email.to_string()));
        user.insert("password_hash".to_string(), Value::String(password_hash));
        user.insert("salt".to_string(), Value::String(salt));

        let statement = self.builder.insert(AUTH_USERS_TABLE, &[user])?;
        let created = self
            .first_row(statement)
            .await?
            .ok_or_else(|| DaalError::Backend("sign-up returned no rows".to_string()))?;

        let session = Session::new(format!("sql-{}", generate_id()), principal_of(created));
        self.session.establish(session.clone())?;
        info!(user_id = ?session.user_id(), "SQL sign-up");
        Ok(session)
    }

    async fn try_sign_out(&self) -> DaalResult<()> {
        self.session.sign_out()?;
        Ok(())
    }
}

impl std::fmt::Debug for SqlAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlAdapter")
            .field("dialect", &self.builder.dialect())
            .field("touch_column", &self.touch_column)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SqlResult, SqliteExecutor};
    use daal_core::BackendAdapter;
    use daal_storage::MemoryStorage;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Records statements and replays queued row sets.
    #[derive(Default)]
    struct RecordingExecutor {
        statements: Mutex<Vec<(String, Vec<Value>)>>,
        responses: Mutex<Vec<Vec<Record>>>,
    }

    impl RecordingExecutor {
        fn respond(&self, rows: Vec<Value>) {
            let rows: Vec<Record> = rows
                .into_iter()
                .map(|v| serde_json::from_value(v).unwrap())
                .collect();
            self.responses.lock().push(rows);
        }

        fn statements(&self) -> Vec<(String, Vec<Value>)> {
            self.statements.lock().clone()
        }
    }

    #[async_trait]
    impl SqlExecutor for RecordingExecutor {
        async fn execute(&self, sql: &str, args: &[Value]) -> SqlResult<Vec<Record>> {
            self.statements.lock().push((sql.to_string(), args.to_vec()));
            let mut responses = self.responses.lock();
            Ok(if responses.is_empty() {
                Vec::new()
            } else {
                responses.remove(0)
            })
        }
    }

    fn record(value: Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    fn recording() -> (Arc<RecordingExecutor>, SqlAdapter) {
        let executor = Arc::new(RecordingExecutor::default());
        let adapter = SqlAdapter::new(executor.clone(), SqlDialect::Postgres);
        (executor, adapter)
    }

    async fn sqlite() -> SqlAdapter {
        let executor = SqliteExecutor::open_in_memory().await.unwrap();
        executor.execute_batch(SQLITE_AUTH_SCHEMA).await.unwrap();
        executor
            .execute_batch("CREATE TABLE notes (id INTEGER PRIMARY KEY, title TEXT, updated_at TEXT)")
            .await
            .unwrap();
        SqlAdapter::new(Arc::new(executor), SqlDialect::Sqlite).with_touch_column("updated_at")
    }

    #[tokio::test]
    async fn test_insert_many_is_one_statement() {
        let (executor, adapter) = recording();
        executor.respond(vec![json!({"a": 1}), json!({"a": 2})]);

        let envelope = adapter
            .insert_many("t", vec![record(json!({"a": 1})), record(json!({"a": 2}))])
            .await;
        assert!(envelope.success);
        assert_eq!(envelope.data.unwrap().len(), 2);
        assert_eq!(
            executor.statements(),
            vec![(
                "INSERT INTO t (a) VALUES ($1), ($2) RETURNING *".to_string(),
                vec![json!(1), json!(2)]
            )]
        );
    }

    #[tokio::test]
    async fn test_unfiltered_update_and_delete_never_execute() {
        let (executor, adapter) = recording();

        let update = adapter
            .update("t", &FilterSpec::new(), record(json!({"a": 1})))
            .await;
        assert!(!update.success);
        assert!(update.error.unwrap().starts_with("Validation error"));

        let delete = adapter.delete("t", &FilterSpec::new()).await;
        assert!(!delete.success);
        assert!(delete.error.unwrap().starts_with("Validation error"));

        assert!(executor.statements().is_empty());
    }

    #[tokio::test]
    async fn test_count_and_rpc_read_first_row() {
        let (executor, adapter) = recording();
        executor.respond(vec![json!({"count": 3})]);
        executor.respond(vec![json!({"result": {"ok": true}})]);

        assert_eq!(adapter.count("t", &FilterSpec::new().gt("a", 1)).await.data, Some(3));
        let rpc = adapter.rpc("check", json!({"user_id": 5})).await;
        assert_eq!(rpc.data, Some(json!({"ok": true})));

        let statements = executor.statements();
        assert_eq!(statements[0].0, "SELECT COUNT(*) FROM t WHERE a > $1");
        assert_eq!(statements[1].0, "SELECT check(user_id => $1) AS result");
    }

    #[tokio::test]
    async fn test_executor_errors_become_backend_failures() {
        let adapter = sqlite().await;
        let envelope = adapter.select("missing", "*", &FilterSpec::new()).await;
        assert!(!envelope.success);
        assert!(envelope.error.unwrap().starts_with("Backend error"));
    }

    #[tokio::test]
    async fn test_crud_against_sqlite() {
        let adapter = sqlite().await;

        let inserted = adapter
            .insert("notes", record(json!({"title": "first"})))
            .await
            .into_result()
            .unwrap();
        assert_eq!(inserted["id"], json!(1));

        let updated = adapter
            .update("notes", &FilterSpec::new().eq("id", 1), record(json!({"title": "second"})))
            .await
            .into_result()
            .unwrap();
        assert_eq!(updated[0]["title"], "second");
        assert!(updated[0]["updated_at"].as_str().is_some());

        let upserted = adapter
            .upsert("notes", record(json!({"id": 1, "title": "third"})))
            .await
            .into_result()
            .unwrap();
        assert_eq!(upserted["title"], "third");
        assert_eq!(adapter.count("notes", &FilterSpec::new()).await.data, Some(1));

        let one = adapter
            .select_one("notes", "title", &FilterSpec::new().ilike("title", "HIR"))
            .await;
        assert_eq!(one.data, Some(Some(record(json!({"title": "third"})))));

        let removed = adapter.delete("notes", &FilterSpec::new().eq("id", 1)).await;
        assert_eq!(removed.data.unwrap().len(), 1);
        assert_eq!(adapter.count("notes", &FilterSpec::new()).await.data, Some(0));
    }

    #[tokio::test]
    async fn test_sign_up_then_sign_in() {
        let adapter = sqlite().await;

        let session = adapter
            .sign_up("ann@example.com", "hunter22")
            .await
            .into_result()
            .unwrap();
        assert!(session.token.starts_with("sql-"));
        assert_eq!(session.email(), Some("ann@example.com"));
        assert!(session.principal.get("password_hash").is_none());
        assert!(session.principal.get("salt").is_none());

        let duplicate = adapter.sign_up("ann@example.com", "other").await;
        assert!(duplicate.error.unwrap().starts_with("Validation error"));

        adapter.sign_out().await.into_result().unwrap();
        assert_eq!(adapter.is_authenticated().await.data, Some(false));

        let wrong = adapter.sign_in("ann@example.com", "nope").await;
        assert_eq!(wrong.error.as_deref(), Some("Auth error: Invalid login credentials"));

        let signed_in = adapter.sign_in("ann@example.com", "hunter22").await;
        assert!(signed_in.success);
        let user = adapter.get_current_user().await.data.unwrap().unwrap();
        assert_eq!(user["email"], "ann@example.com");
    }

    #[tokio::test]
    async fn test_session_persists_in_storage() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let executor = SqliteExecutor::open_in_memory().await.unwrap();
        executor.execute_batch(SQLITE_AUTH_SCHEMA).await.unwrap();
        let executor: Arc<dyn SqlExecutor> = Arc::new(executor);

        let first = SqlAdapter::new(executor.clone(), SqlDialect::Sqlite)
            .with_session_storage(storage.clone());
        first.sign_up("bo@example.com", "pw123456").await.into_result().unwrap();

        let second = SqlAdapter::new(executor, SqlDialect::Sqlite).with_session_storage(storage);
        assert_eq!(second.is_authenticated().await.data, Some(true));
    }

    #[test]
    fn test_password_hash_is_salted() {
        let (salt_a, hash_a) = new_credentials("secret");
        let (salt_b, hash_b) = new_credentials("secret");
        assert_ne!(salt_a, salt_b);
        assert_ne!(hash_a, hash_b);

        let user = record(json!({"salt": salt_a, "password_hash": hash_a}));
        assert!(verify_password(&user, "secret"));
        assert!(!verify_password(&user, "Secret"));
        assert!(!verify_password(&Record::new(), "secret"));
    }
}
