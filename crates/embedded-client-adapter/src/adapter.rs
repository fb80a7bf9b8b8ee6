use crate::builder::{contains_pattern, RemoteQuery};
use crate::client::RemoteClient;
use async_trait::async_trait;
use daal_core::{
    Backend, DaalError, DaalResult, FilterCondition, FilterSpec, QueryOptions, Record, Session,
    SessionTracker,
};
use daal_storage::{KeyValueStorage, SessionStore, StorageKeys};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Chain every condition of `filters` onto `query`.
pub fn apply_filters(filters: &FilterSpec, query: RemoteQuery) -> RemoteQuery {
    filters
        .iter()
        .fold(query, |query, (column, condition)| match condition {
            FilterCondition::Eq(v) => query.eq(column.as_str(), v.clone()),
            FilterCondition::Neq(v) => query.neq(column.as_str(), v.clone()),
            FilterCondition::Gt(v) => query.gt(column.as_str(), v.clone()),
            FilterCondition::Gte(v) => query.gte(column.as_str(), v.clone()),
            FilterCondition::Lt(v) => query.lt(column.as_str(), v.clone()),
            FilterCondition::Lte(v) => query.lte(column.as_str(), v.clone()),
            FilterCondition::Like(p) => query.like(column.as_str(), contains_pattern(p)),
            FilterCondition::Ilike(p) => query.ilike(column.as_str(), contains_pattern(p)),
            FilterCondition::In(vs) => query.in_(column.as_str(), vs.clone()),
            FilterCondition::IsNull => query.is_null(column.as_str()),
        })
}

/// Apply projection, ordering and paging.
fn apply_options(options: &QueryOptions, mut query: RemoteQuery) -> RemoteQuery {
    query = query.select(options.select.to_csv());
    if let Some(order) = &options.order_by {
        query = query.order(order.column.as_str(), order.ascending);
    }
    if let Some(offset) = options.offset {
        query = query.offset(offset);
    }
    if let Some(limit) = options.limit {
        query = query.limit(limit);
    }
    if options.single {
        query = query.maybe_single();
    }
    query
}

/// Adapter delegating to a schema-bound remote platform client.
pub struct EmbeddedClientAdapter {
    client: Arc<dyn RemoteClient>,
    session: SessionTracker,
}

impl EmbeddedClientAdapter {
    /// Adapter whose session is persisted in `storage`.
    pub fn new(client: Arc<dyn RemoteClient>, storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            client,
            session: SessionTracker::persisted(SessionStore::new(
                storage,
                StorageKeys::EMBEDDED_SESSION_NAMESPACE,
            )),
        }
    }

    /// Adapter with a process-local session.
    pub fn in_memory(client: Arc<dyn RemoteClient>) -> Self {
        Self {
            client,
            session: SessionTracker::in_memory(),
        }
    }

    fn token(&self) -> Option<String> {
        self.session.token()
    }

    async fn run(&self, query: RemoteQuery) -> DaalResult<Vec<Record>> {
        let token = self.token();
        let response = self.client.execute(query, token.as_deref()).await?;
        Ok(response.rows)
    }

    fn establish(&self, auth: crate::client::RemoteAuth) -> DaalResult<Session> {
        let token = auth.access_token.ok_or_else(|| {
            DaalError::Auth("sign-up pending email confirmation".to_string())
        })?;
        let session = Session::new(token, auth.user);
        self.session.establish(session.clone())?;
        info!(user_id = ?session.user_id(), "Signed in to platform");
        Ok(session)
    }
}

#[async_trait]
impl Backend for EmbeddedClientAdapter {
    const NAME: &'static str = "embedded";

    fn session(&self) -> &SessionTracker {
        &self.session
    }

    async fn try_query(
        &self,
        table: &str,
        filters: &FilterSpec,
        options: &QueryOptions,
    ) -> DaalResult<Vec<Record>> {
        let query = apply_options(options, apply_filters(filters, RemoteQuery::table(table)));
        let rows = self.run(query).await?;
        debug!(table, rows = rows.len(), "Selected rows");
        Ok(rows)
    }

    async fn try_insert_many(&self, table: &str, records: Vec<Record>) -> DaalResult<Vec<Record>> {
        self.run(RemoteQuery::table(table).insert(records)).await
    }

    async fn try_update(
        &self,
        table: &str,
        filters: &FilterSpec,
        patch: Record,
    ) -> DaalResult<Vec<Record>> {
        self.run(apply_filters(filters, RemoteQuery::table(table).update(patch)))
            .await
    }

    async fn try_delete(&self, table: &str, filters: &FilterSpec) -> DaalResult<Vec<Record>> {
        self.run(apply_filters(filters, RemoteQuery::table(table).delete()))
            .await
    }

    async fn try_upsert(&self, table: &str, record: Record) -> DaalResult<Record> {
        self.run(RemoteQuery::table(table).upsert(vec![record]))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DaalError::Backend(format!("upsert into {} returned no rows", table)))
    }

    async fn try_count(&self, table: &str, filters: &FilterSpec) -> DaalResult<u64> {
        let query = apply_filters(filters, RemoteQuery::table(table).count_exact());
        let token = self.token();
        let response = self.client.execute(query, token.as_deref()).await?;
        response
            .count
            .ok_or_else(|| DaalError::Backend(format!("count on {} returned no total", table)))
    }

    async fn try_rpc(&self, name: &str, params: Value) -> DaalResult<Value> {
        let token = self.token();
        Ok(self.client.rpc(name, params, token.as_deref()).await?)
    }

    async fn try_sign_in(&self, email: &str, password: &str) -> DaalResult<Session> {
        let auth = self.client.sign_in_with_password(email, password).await?;
        self.establish(auth)
    }

    async fn try_sign_up(&self, email: &str, password: &str) -> DaalResult<Session> {
        let auth = self.client.sign_up(email, password).await?;
        self.establish(auth)
    }

    async fn try_sign_out(&self) -> DaalResult<()> {
        if let Some(token) = self.token() {
            if let Err(e) = self.client.sign_out(&token).await {
                warn!(error = %e, "Remote sign-out failed, clearing local session anyway");
            }
        }
        self.session.sign_out()?;
        Ok(())
    }
}

impl std::fmt::Debug for EmbeddedClientAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedClientAdapter")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{RemoteAction, RemoteOp};
    use crate::memory::InMemoryRemoteClient;
    use daal_core::{BackendAdapter, OrderBy};
    use daal_storage::MemoryStorage;
    use serde_json::json;

    fn row(value: Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    fn adapter() -> (Arc<InMemoryRemoteClient>, EmbeddedClientAdapter) {
        let client = Arc::new(InMemoryRemoteClient::new());
        let adapter = EmbeddedClientAdapter::in_memory(client.clone());
        (client, adapter)
    }

    #[test]
    fn test_apply_filters_maps_every_operator() {
        let filters = FilterSpec::new()
            .eq("a", 1)
            .like("b", "50%")
            .in_list("c", [1, 2])
            .is_null("d");
        let query = apply_filters(&filters, RemoteQuery::table("t"));
        let ops: Vec<(String, RemoteOp)> = query
            .filters
            .iter()
            .map(|f| (f.column.clone(), f.op))
            .collect();
        assert_eq!(
            ops,
            vec![
                ("a".to_string(), RemoteOp::Eq),
                ("b".to_string(), RemoteOp::Like),
                ("c".to_string(), RemoteOp::In),
                ("d".to_string(), RemoteOp::Is),
            ]
        );
        assert_eq!(query.filters[1].value, json!("%50\\%%"));
    }

    #[test]
    fn test_apply_options() {
        let options = QueryOptions::columns("id,name")
            .with_order(OrderBy::desc("name"))
            .with_offset(5)
            .with_limit(10);
        let query = apply_options(&options, RemoteQuery::table("t"));
        assert_eq!(
            query.action,
            RemoteAction::Select {
                columns: "id,name".to_string()
            }
        );
        assert_eq!(query.order, Some(("name".to_string(), false)));
        assert_eq!((query.offset, query.limit), (Some(5), Some(10)));
    }

    #[tokio::test]
    async fn test_crud_round_trip() {
        let (_, adapter) = adapter();
        let inserted = adapter.insert("widgets", row(json!({"name": "W1"}))).await;
        let inserted = inserted.data.unwrap();
        let id = inserted["id"].clone();

        let found = adapter
            .select_one("widgets", "*", &FilterSpec::new().eq("id", id.clone()))
            .await;
        assert_eq!(found.data.flatten(), Some(inserted.clone()));

        let updated = adapter
            .update("widgets", &FilterSpec::new().eq("id", id.clone()), row(json!({"name": "W2"})))
            .await;
        assert_eq!(updated.data.unwrap()[0]["name"], "W2");

        assert_eq!(adapter.count("widgets", &FilterSpec::new()).await.data, Some(1));
        let removed = adapter.delete("widgets", &FilterSpec::new().eq("id", id)).await;
        assert_eq!(removed.data.unwrap().len(), 1);
        assert_eq!(adapter.count("widgets", &FilterSpec::new()).await.data, Some(0));
    }

    #[tokio::test]
    async fn test_select_one_is_null_when_missing() {
        let (_, adapter) = adapter();
        let found = adapter
            .select_one("widgets", "*", &FilterSpec::new().eq("id", "nope"))
            .await;
        assert!(found.success);
        assert_eq!(found.data, Some(None));
    }

    #[tokio::test]
    async fn test_rpc_and_unknown_function() {
        let (client, adapter) = adapter();
        client.register_rpc("add", |params| json!(params["a"].as_i64().unwrap_or(0) + 1));

        assert_eq!(adapter.rpc("add", json!({"a": 41})).await.data, Some(json!(42)));
        let missing = adapter.rpc("nope", json!({})).await;
        assert_eq!(
            missing.error.as_deref(),
            Some("Backend error: Could not find the function nope")
        );
    }

    #[tokio::test]
    async fn test_session_persisted_and_invalidated_on_expiry() {
        let client = Arc::new(InMemoryRemoteClient::new().with_required_auth());
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let adapter = EmbeddedClientAdapter::new(client.clone(), storage.clone());

        let session = adapter.sign_up("a@b.c", "pw").await.data.unwrap();
        assert_eq!(session.email(), Some("a@b.c"));
        assert!(adapter.select("t", "*", &FilterSpec::new()).await.success);

        // A second adapter instance picks up the stored session.
        let restored = EmbeddedClientAdapter::new(client.clone(), storage.clone());
        assert_eq!(restored.is_authenticated().await.data, Some(true));

        client.revoke_tokens();
        let denied = adapter.select("t", "*", &FilterSpec::new()).await;
        assert_eq!(denied.error.as_deref(), Some("Auth error: JWT expired"));
        assert_eq!(adapter.is_authenticated().await.data, Some(false));
        assert!(!storage
            .has(&StorageKeys::session_key(StorageKeys::EMBEDDED_SESSION_NAMESPACE))
            .unwrap());
    }

    #[tokio::test]
    async fn test_sign_out_clears_session() {
        let (client, adapter) = adapter();
        client.sign_up("a@b.c", "pw").await.unwrap();
        assert!(adapter.sign_in("a@b.c", "pw").await.success);
        assert_eq!(
            adapter.get_current_user().await.data.flatten().unwrap()["email"],
            "a@b.c"
        );
        assert!(adapter.sign_out().await.success);
        assert_eq!(adapter.get_current_user().await.data, Some(None));

        let rejected = adapter.sign_in("a@b.c", "wrong").await;
        assert_eq!(rejected.error.as_deref(), Some("Auth error: Invalid login credentials"));
    }
}
