//! Supabase (PostgREST + GoTrue) implementation of [`RemoteClient`].

use crate::builder::{RemoteAction, RemoteFilter, RemoteOp, RemoteQuery};
use crate::client::{RemoteAuth, RemoteClient, RemoteResponse};
use crate::error::{RemoteError, RemoteResult};
use async_trait::async_trait;
use daal_core::Record;
use reqwest::header::CONTENT_RANGE;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::{debug, error};

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Error text carried by a platform error body, if any.
fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["message", "msg", "error_description", "error"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .map(String::from)
}

/// Render a scalar the way PostgREST expects it in a filter.
fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Items of an `in.(...)` list; strings with reserved characters are quoted.
fn render_list_item(value: &Value) -> String {
    match value {
        Value::String(s) if s.contains([',', '(', ')', '"', '\\', ' ']) || s.is_empty() => {
            format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
        }
        other => render_scalar(other),
    }
}

fn render_filter(filter: &RemoteFilter) -> String {
    match (filter.op, &filter.value) {
        (RemoteOp::Is, _) | (RemoteOp::Eq, Value::Null) => "is.null".to_string(),
        (RemoteOp::Neq, Value::Null) => "not.is.null".to_string(),
        (RemoteOp::In, Value::Array(items)) => format!(
            "in.({})",
            items
                .iter()
                .map(render_list_item)
                .collect::<Vec<_>>()
                .join(",")
        ),
        (op, value) => format!("{}.{}", op.as_str(), render_scalar(value)),
    }
}

/// Query-string pairs for `query`, in a stable order.
pub(crate) fn query_params(query: &RemoteQuery) -> Vec<(String, String)> {
    let mut params = Vec::new();
    if let RemoteAction::Select { columns } = &query.action {
        params.push(("select".to_string(), columns.clone()));
    }
    for filter in &query.filters {
        params.push((filter.column.clone(), render_filter(filter)));
    }
    if let Some((column, ascending)) = &query.order {
        let direction = if *ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{}.{}.nullslast", column, direction)));
    }
    if let Some(offset) = query.offset {
        params.push(("offset".to_string(), offset.to_string()));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

/// Parse the total from a `Content-Range` header (`0-24/573`, `*/0`).
fn parse_content_range(raw: &str) -> Option<u64> {
    raw.rsplit('/').next()?.trim().parse().ok()
}

/// Supabase REST client.
#[derive(Clone)]
pub struct SupabaseRestClient {
    http_client: reqwest::Client,
    api_url: String,
    anon_key: String,
}

impl SupabaseRestClient {
    /// Create a client for the project at `api_url`
    /// (e.g. `https://xyz.supabase.co`).
    pub fn new(api_url: &str, anon_key: impl Into<String>) -> RemoteResult<Self> {
        url::Url::parse(api_url)
            .map_err(|e| RemoteError::Config(format!("invalid platform URL '{}': {}", api_url, e)))?;
        Ok(Self {
            http_client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
        })
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.api_url, table)
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.api_url, path)
    }

    fn request(&self, method: Method, url: &str, token: Option<&str>) -> RequestBuilder {
        let bearer = token.unwrap_or(&self.anon_key);
        self.http_client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", bearer))
    }

    /// Map a non-success response to a [`RemoteError`]. `auth_endpoint`
    /// treats 400 as rejected credentials, as GoTrue reports them that way.
    async fn check_response(response: Response, auth_endpoint: bool) -> RemoteResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let body_summary = summarize_response_body(&body);
        error!(status = %status, body_summary = %body_summary, "Platform request failed");

        let message = extract_error_message(&body);
        let reason = status.canonical_reason().unwrap_or("Unknown").to_string();
        let rejected = status == StatusCode::UNAUTHORIZED
            || (auth_endpoint && status == StatusCode::BAD_REQUEST);
        if rejected {
            return Err(RemoteError::Unauthorized(
                message.unwrap_or_else(|| format!("HTTP {}: {}", status.as_u16(), reason)),
            ));
        }
        Err(RemoteError::Api {
            status: status.as_u16(),
            reason,
            message,
        })
    }

    async fn read_rows(response: Response) -> RemoteResult<Vec<Record>> {
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<Value>(&text)? {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(row) => Ok(row),
                    other => Err(RemoteError::Api {
                        status: 200,
                        reason: "OK".to_string(),
                        message: Some(format!("expected a row object, got {}", other)),
                    }),
                })
                .collect(),
            Value::Object(row) => Ok(vec![row]),
            _ => Ok(Vec::new()),
        }
    }

    async fn auth_request(&self, path: &str, email: &str, password: &str) -> RemoteResult<Value> {
        let response = self
            .http_client
            .post(self.auth_url(path))
            .header("apikey", &self.anon_key)
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({
                "email": email,
                "password": password,
            }))
            .send()
            .await?;
        let response = Self::check_response(response, true).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl RemoteClient for SupabaseRestClient {
    async fn execute(&self, query: RemoteQuery, token: Option<&str>) -> RemoteResult<RemoteResponse> {
        let url = self.rest_url(&query.table);
        let params = query_params(&query);
        debug!(table = %query.table, params = params.len(), "Platform query");

        let builder = match &query.action {
            RemoteAction::Select { .. } => self
                .request(Method::GET, &url, token)
                .header("Accept", "application/json"),
            RemoteAction::Count => self
                .request(Method::HEAD, &url, token)
                .header("Prefer", "count=exact"),
            RemoteAction::Insert { rows, upsert } => {
                let prefer = if *upsert {
                    "return=representation,resolution=merge-duplicates"
                } else {
                    "return=representation"
                };
                self.request(Method::POST, &url, token)
                    .header("Prefer", prefer)
                    .json(rows)
            }
            RemoteAction::Update { patch } => self
                .request(Method::PATCH, &url, token)
                .header("Prefer", "return=representation")
                .json(patch),
            RemoteAction::Delete => self
                .request(Method::DELETE, &url, token)
                .header("Prefer", "return=representation"),
        };

        let response = builder.query(&params).send().await?;
        let response = Self::check_response(response, false).await?;

        if query.action == RemoteAction::Count {
            let count = response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_content_range);
            return Ok(RemoteResponse {
                rows: Vec::new(),
                count,
            });
        }

        let rows = Self::read_rows(response).await?;
        debug!(table = %query.table, rows = rows.len(), "Platform query returned");
        Ok(RemoteResponse { rows, count: None })
    }

    async fn rpc(&self, function: &str, params: Value, token: Option<&str>) -> RemoteResult<Value> {
        let url = self.rest_url(&format!("rpc/{}", function));
        let body = if params.is_null() {
            Value::Object(Default::default())
        } else {
            params
        };
        let response = self
            .request(Method::POST, &url, token)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;
        let response = Self::check_response(response, false).await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> RemoteResult<RemoteAuth> {
        let value = self
            .auth_request("token?grant_type=password", email, password)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn sign_up(&self, email: &str, password: &str) -> RemoteResult<RemoteAuth> {
        let value = self.auth_request("signup", email, password).await?;
        if value.get("user").is_some() {
            return Ok(serde_json::from_value(value)?);
        }
        // Confirmation pending: the body is the bare user.
        Ok(RemoteAuth {
            access_token: None,
            refresh_token: None,
            user: value,
        })
    }

    async fn sign_out(&self, token: &str) -> RemoteResult<()> {
        let response = self
            .request(Method::POST, &self.auth_url("logout"), Some(token))
            .send()
            .await?;
        Self::check_response(response, false).await?;
        Ok(())
    }

    async fn get_user(&self, token: &str) -> RemoteResult<Value> {
        let response = self
            .request(Method::GET, &self.auth_url("user"), Some(token))
            .send()
            .await?;
        let response = Self::check_response(response, false).await?;
        Ok(response.json().await?)
    }
}

impl std::fmt::Debug for SupabaseRestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseRestClient")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}
