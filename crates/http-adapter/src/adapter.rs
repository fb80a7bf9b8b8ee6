use crate::transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use async_trait::async_trait;
use daal_core::{
    Backend, Columns, DaalError, DaalResult, FilterCondition, FilterSpec, QueryOptions, Record,
    Session, SessionTracker,
};
use daal_storage::{KeyValueStorage, SessionStore, StorageKeys};
use serde_json::{json, Value};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::form_urlencoded;

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Flatten `filters` into `key=value` pairs.
///
/// Only equality survives a flat query string; any other operator is
/// rejected rather than sent without its semantics.
pub fn filter_pairs(filters: &FilterSpec) -> DaalResult<Vec<(String, String)>> {
    filters
        .iter()
        .map(|(column, condition)| match condition {
            FilterCondition::Eq(v) => Ok((column.clone(), render_value(v))),
            other => {
                warn!(
                    column = %column,
                    operator = other.operator(),
                    "Filter operator has no query-string encoding"
                );
                Err(DaalError::Validation(format!(
                    "operator '{}' on column '{}' is not supported by the HTTP backend; only equality filters are",
                    other.operator(),
                    column
                )))
            }
        })
        .collect()
}

/// Query parameters carrying projection, ordering and paging.
fn option_pairs(options: &QueryOptions) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    if let Columns::List(_) = &options.select {
        pairs.push(("select".to_string(), options.select.to_csv()));
    }
    if let Some(order) = &options.order_by {
        let direction = if order.ascending { "asc" } else { "desc" };
        pairs.push(("order".to_string(), format!("{}.{}", order.column, direction)));
    }
    if let Some(limit) = options.effective_limit() {
        pairs.push(("limit".to_string(), limit.to_string()));
    }
    if let Some(offset) = options.offset {
        pairs.push(("offset".to_string(), offset.to_string()));
    }
    pairs
}

fn encode(pairs: &[(String, String)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

fn parse_body(response: &HttpResponse) -> DaalResult<Value> {
    if response.body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&response.body).map_err(|e| {
        DaalError::Backend(format!(
            "invalid JSON in response ({}): {}",
            summarize_response_body(&response.body),
            e
        ))
    })
}

/// Rows from a response body: a list, a single object, or nothing.
fn into_rows(body: Value) -> DaalResult<Vec<Record>> {
    match body {
        Value::Null => Ok(Vec::new()),
        Value::Object(row) => Ok(vec![row]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row),
                other => Err(DaalError::Backend(format!("expected a row object, got {}", other))),
            })
            .collect(),
        other => Err(DaalError::Backend(format!("expected rows, got {}", other))),
    }
}

fn into_single_row(body: Value, what: &str) -> DaalResult<Record> {
    into_rows(body)?
        .into_iter()
        .next()
        .ok_or_else(|| DaalError::Backend(format!("{} returned no row", what)))
}

/// Adapter for a generic REST backend at `base_url`.
pub struct HttpAdapter {
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    session: SessionTracker,
}

impl HttpAdapter {
    /// Adapter whose bearer session is persisted in `storage`.
    pub fn new(
        base_url: &str,
        transport: Arc<dyn HttpTransport>,
        storage: Arc<dyn KeyValueStorage>,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
            session: SessionTracker::persisted(SessionStore::new(
                storage,
                StorageKeys::HTTP_SESSION_NAMESPACE,
            )),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str, pairs: &[(String, String)]) -> String {
        if pairs.is_empty() {
            format!("{}/{}", self.base_url, path)
        } else {
            format!("{}/{}?{}", self.base_url, path, encode(pairs))
        }
    }

    /// Send a request with the current bearer token and turn non-2xx
    /// statuses into errors.
    async fn send(&self, method: HttpMethod, url: String, body: Option<Value>) -> DaalResult<Value> {
        let request = HttpRequest {
            method,
            url,
            bearer: self.session.token(),
            body,
        };
        debug!(method = method.as_str(), url = %request.url, "HTTP request");
        let response = self.transport.send(request).await?;
        if response.is_success() {
            return parse_body(&response);
        }

        let body_summary = summarize_response_body(&response.body);
        error!(status = response.status, body_summary = %body_summary, "HTTP request failed");

        if response.status == 401 {
            info!("Received 401, evicting stored token");
            return Err(DaalError::http_status(401, &response.reason));
        }
        let message = serde_json::from_str::<Value>(&response.body)
            .ok()
            .and_then(|v| {
                ["message", "error"]
                    .iter()
                    .find_map(|key| v.get(key).and_then(Value::as_str).map(String::from))
            });
        match message {
            Some(message) => Err(DaalError::Backend(message)),
            None => Err(DaalError::http_status(response.status, &response.reason)),
        }
    }

    async fn authenticate(&self, path: &str, email: &str, password: &str) -> DaalResult<Session> {
        let body = self
            .send(
                HttpMethod::Post,
                self.url(path, &[]),
                Some(json!({ "email": email, "password": password })),
            )
            .await?;
        let token = ["token", "access_token"]
            .iter()
            .find_map(|key| body.get(key).and_then(Value::as_str))
            .ok_or_else(|| DaalError::Auth("login response carried no token".to_string()))?;
        let principal = body
            .get("user")
            .cloned()
            .unwrap_or_else(|| json!({ "email": email }));
        let session = Session::new(token, principal);
        self.session.establish(session.clone())?;
        info!(user_id = ?session.user_id(), "Signed in to REST backend");
        Ok(session)
    }
}

#[async_trait]
impl Backend for HttpAdapter {
    const NAME: &'static str = "http";

    fn session(&self) -> &SessionTracker {
        &self.session
    }

    async fn try_query(
        &self,
        table: &str,
        filters: &FilterSpec,
        options: &QueryOptions,
    ) -> DaalResult<Vec<Record>> {
        let mut pairs = filter_pairs(filters)?;
        pairs.extend(option_pairs(options));
        let body = self.send(HttpMethod::Get, self.url(table, &pairs), None).await?;
        into_rows(body)
    }

    async fn try_select_one(
        &self,
        table: &str,
        columns: &Columns,
        filters: &FilterSpec,
    ) -> DaalResult<Option<Record>> {
        let mut pairs = filter_pairs(filters)?;
        if let Columns::List(_) = columns {
            pairs.push(("select".to_string(), columns.to_csv()));
        }
        pairs.push(("limit".to_string(), "1".to_string()));
        let body = self.send(HttpMethod::Get, self.url(table, &pairs), None).await?;
        Ok(into_rows(body)?.into_iter().next())
    }

    async fn try_insert(&self, table: &str, record: Record) -> DaalResult<Record> {
        let body = self
            .send(HttpMethod::Post, self.url(table, &[]), Some(Value::Object(record)))
            .await?;
        into_single_row(body, "insert")
    }

    async fn try_insert_many(&self, table: &str, records: Vec<Record>) -> DaalResult<Vec<Record>> {
        let payload = Value::Array(records.into_iter().map(Value::Object).collect());
        let body = self
            .send(HttpMethod::Post, self.url(table, &[]), Some(payload))
            .await?;
        into_rows(body)
    }

    async fn try_update(
        &self,
        table: &str,
        filters: &FilterSpec,
        patch: Record,
    ) -> DaalResult<Vec<Record>> {
        let pairs = filter_pairs(filters)?;
        let body = self
            .send(HttpMethod::Put, self.url(table, &pairs), Some(Value::Object(patch)))
            .await?;
        into_rows(body)
    }

    async fn try_delete(&self, table: &str, filters: &FilterSpec) -> DaalResult<Vec<Record>> {
        let pairs = filter_pairs(filters)?;
        let body = self
            .send(HttpMethod::Delete, self.url(table, &pairs), None)
            .await?;
        into_rows(body)
    }

    async fn try_upsert(&self, table: &str, record: Record) -> DaalResult<Record> {
        let body = self
            .send(
                HttpMethod::Post,
                self.url(&format!("{}/upsert", table), &[]),
                Some(Value::Object(record)),
            )
            .await?;
        into_single_row(body, "upsert")
    }

    async fn try_count(&self, table: &str, filters: &FilterSpec) -> DaalResult<u64> {
        let pairs = filter_pairs(filters)?;
        let body = self
            .send(HttpMethod::Get, self.url(&format!("{}/count", table), &pairs), None)
            .await?;
        body.get("count")
            .unwrap_or(&body)
            .as_u64()
            .ok_or_else(|| DaalError::Backend(format!("count on {} returned {}", table, body)))
    }

    async fn try_rpc(&self, name: &str, params: Value) -> DaalResult<Value> {
        self.send(HttpMethod::Post, self.url(&format!("rpc/{}", name), &[]), Some(params))
            .await
    }

    async fn try_sign_in(&self, email: &str, password: &str) -> DaalResult<Session> {
        self.authenticate("auth/login", email, password).await
    }

    async fn try_sign_up(&self, email: &str, password: &str) -> DaalResult<Session> {
        self.authenticate("auth/register", email, password).await
    }

    async fn try_sign_out(&self) -> DaalResult<()> {
        if self.session.token().is_some() {
            if let Err(e) = self
                .send(HttpMethod::Post, self.url("auth/logout", &[]), None)
                .await
            {
                warn!(error = %e, "Logout request failed, clearing local session anyway");
            }
        }
        self.session.sign_out()?;
        Ok(())
    }

    async fn try_current_user(&self) -> DaalResult<Option<Value>> {
        if self.session.token().is_none() {
            return Ok(None);
        }
        let body = self.send(HttpMethod::Get, self.url("auth/me", &[]), None).await?;
        Ok(Some(body.get("user").cloned().unwrap_or(body)))
    }
}

impl std::fmt::Debug for HttpAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAdapter")
            .field("base_url", &self.base_url)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
