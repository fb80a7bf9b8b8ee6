//! Data access abstraction layer.
//!
//! One filter/query DSL and one auth contract ([`BackendAdapter`]) over four
//! backends:
//!
//! - [`EmbeddedClientAdapter`]: hosted data platform through its REST client
//! - [`HttpAdapter`]: plain REST server
//! - [`MockAdapter`]: offline store persisted through the Storage Port
//! - [`SqlAdapter`]: parameterized SQL through an [`SqlExecutor`]
//!
//! Every operation returns a [`ResponseEnvelope`]; callers branch on
//! `success` and never see a raised error. [`build_adapter`] picks the
//! backend named in [`Config`].

use daal_storage::FileStorage;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

pub use daal_config_and_utils::{init_logging, BackendKind, Config, CoreError, Paths};
pub use daal_core::{
    matches, Backend, BackendAdapter, Columns, DaalError, DaalResult, ErrorKind, FilterCondition,
    FilterSpec, OrderBy, QueryOptions, Record, ResponseEnvelope, Session, SessionState,
};
pub use daal_storage::{KeyValueStorage, MemoryStorage, StorageError};
pub use embedded_client_adapter::{
    EmbeddedClientAdapter, InMemoryRemoteClient, RemoteClient, RemoteError, SupabaseRestClient,
};
pub use http_adapter::{HttpAdapter, HttpTransport, ReqwestTransport};
pub use mock_adapter::MockAdapter;
pub use sql_adapter::{SqlAdapter, SqlDialect, SqlError, SqlExecutor, SqliteExecutor};

/// Why an adapter could not be constructed.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] CoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Sql(#[from] SqlError),

    #[error(transparent)]
    Backend(#[from] DaalError),
}

pub type SetupResult<T> = Result<T, SetupError>;

/// Construct the adapter selected by `config.backend`.
///
/// Sessions (and the mock snapshot) persist in the storage file under
/// `paths`; the SQL backend opens the SQLite file from the config, or the
/// default database file.
pub async fn build_adapter(config: &Config, paths: &Paths) -> SetupResult<Arc<dyn BackendAdapter>> {
    let storage: Arc<dyn KeyValueStorage> = Arc::new(FileStorage::open(paths.storage_file())?);

    let adapter: Arc<dyn BackendAdapter> = match config.backend {
        BackendKind::Mock => {
            let storage: Arc<dyn KeyValueStorage> = match &config.mock.storage_path {
                Some(path) => Arc::new(FileStorage::open(path.clone())?),
                None => storage,
            };
            Arc::new(
                MockAdapter::new(storage)?
                    .with_latency(Duration::from_millis(config.mock.latency_ms)),
            )
        }
        BackendKind::Http => {
            let base_url = config.http_base_url()?;
            Arc::new(HttpAdapter::new(
                base_url.as_str(),
                Arc::new(ReqwestTransport::new()),
                storage,
            ))
        }
        BackendKind::Embedded => {
            let client = SupabaseRestClient::new(
                config.supabase_url()?.as_str(),
                config.supabase_anon_key.clone(),
            )?;
            Arc::new(EmbeddedClientAdapter::new(Arc::new(client), storage))
        }
        BackendKind::Sql => {
            let path = config
                .sql
                .sqlite_path
                .clone()
                .unwrap_or_else(|| paths.database_file());
            let executor = SqliteExecutor::open(&path).await?;
            executor.execute_batch(sql_adapter::SQLITE_AUTH_SCHEMA).await?;
            Arc::new(
                SqlAdapter::new(Arc::new(executor), SqlDialect::Sqlite)
                    .with_session_storage(storage),
            )
        }
    };

    info!(backend = %config.backend, adapter = adapter.name(), "Adapter ready");
    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn config(backend: BackendKind) -> Config {
        let mut config = Config {
            backend,
            ..Config::default()
        };
        config.mock.latency_ms = 0;
        config
    }

    #[tokio::test]
    async fn test_builds_each_backend() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        for (kind, name) in [
            (BackendKind::Mock, "mock"),
            (BackendKind::Http, "http"),
            (BackendKind::Embedded, "embedded"),
            (BackendKind::Sql, "sql"),
        ] {
            let adapter = build_adapter(&config(kind), &paths).await.unwrap();
            assert_eq!(adapter.name(), name);
        }
        assert!(paths.database_file().exists());
    }

    #[tokio::test]
    async fn test_mock_state_survives_rebuild() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        let config = config(BackendKind::Mock);

        let first = build_adapter(&config, &paths).await.unwrap();
        let record = json!({"name": "W1"}).as_object().cloned().unwrap();
        assert!(first.insert("widgets", record).await.success);
        assert!(first.sign_in("demo@example.com", "demo1234").await.success);

        let second = build_adapter(&config, &paths).await.unwrap();
        assert_eq!(second.count("widgets", &FilterSpec::new()).await.data, Some(1));
        assert_eq!(second.is_authenticated().await.data, Some(true));
    }

    #[tokio::test]
    async fn test_sql_sign_up_on_fresh_database() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        let mut config = config(BackendKind::Sql);
        config.sql.sqlite_path = Some(dir.path().join("data").join("app.db"));

        let adapter = build_adapter(&config, &paths).await.unwrap();
        let session = adapter.sign_up("new@example.com", "pw123456").await;
        assert!(session.success, "{:?}", session.error);
        assert!(dir.path().join("data").join("app.db").exists());
    }

    #[tokio::test]
    async fn test_invalid_url_fails_setup() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        let mut config = config(BackendKind::Http);
        config.http_base_url = "not a url".to_string();

        let err = build_adapter(&config, &paths).await.err().unwrap();
        assert!(matches!(err, SetupError::Config(_)));
    }
}
