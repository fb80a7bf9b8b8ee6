//! Process-local [`RemoteClient`] with platform semantics: generated ids and
//! timestamps, SQL `LIKE` patterns, token checks. Backs tests and offline
//! runs of the embedded adapter.

use crate::builder::{RemoteAction, RemoteFilter, RemoteOp, RemoteQuery};
use crate::client::{RemoteAuth, RemoteClient, RemoteResponse};
use crate::error::{RemoteError, RemoteResult};
use async_trait::async_trait;
use daal_core::{
    compare_values, generate_id, stamp_insert, stamp_update, timestamp_now, value_text,
    values_equal, Columns, OrderBy, QueryOptions, Record,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Handler for a registered remote procedure.
pub type RpcHandler = Arc<dyn Fn(Value) -> Value + Send + Sync>;

struct StoredUser {
    password: String,
    user: Value,
}

#[derive(Default)]
struct RemoteState {
    tables: BTreeMap<String, Vec<Record>>,
    users: Vec<StoredUser>,
    /// access token -> user id
    tokens: HashMap<String, String>,
    functions: HashMap<String, RpcHandler>,
    require_auth: bool,
}

#[derive(Default)]
pub struct InMemoryRemoteClient {
    state: Mutex<RemoteState>,
}

impl InMemoryRemoteClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject data requests that carry no valid access token.
    pub fn with_required_auth(self) -> Self {
        self.state.lock().require_auth = true;
        self
    }

    /// Store rows verbatim, bypassing id and timestamp generation.
    pub fn seed(&self, table: &str, rows: Vec<Record>) {
        self.state
            .lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.state
            .lock()
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn register_rpc<F>(&self, function: &str, handler: F)
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.state
            .lock()
            .functions
            .insert(function.to_string(), Arc::new(handler));
    }

    /// Invalidate every issued token, as if they all expired.
    pub fn revoke_tokens(&self) {
        self.state.lock().tokens.clear();
    }

    fn check_token(state: &RemoteState, token: Option<&str>) -> RemoteResult<()> {
        match token {
            Some(token) if !state.tokens.contains_key(token) => {
                Err(RemoteError::Unauthorized("JWT expired".to_string()))
            }
            None if state.require_auth => Err(RemoteError::Unauthorized(
                "missing access token".to_string(),
            )),
            _ => Ok(()),
        }
    }

    fn issue_token(state: &mut RemoteState, user: &Value) -> String {
        let token = format!("mem-{}", generate_id());
        let user_id = user
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        state.tokens.insert(token.clone(), user_id);
        token
    }
}

/// SQL `LIKE`: `%` any run, `_` any one char, `\` escapes the next char.
pub fn like_match(text: &str, pattern: &str, case_insensitive: bool) -> bool {
    enum Token {
        Literal(char),
        One,
        Many,
    }

    let fold = |s: &str| {
        if case_insensitive {
            s.to_lowercase()
        } else {
            s.to_string()
        }
    };
    let text: Vec<char> = fold(text).chars().collect();
    let mut tokens = Vec::new();
    let mut chars = fold(pattern).chars().collect::<Vec<_>>().into_iter();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '\\' => Token::Literal(chars.next().unwrap_or('\\')),
            '%' => Token::Many,
            '_' => Token::One,
            other => Token::Literal(other),
        });
    }

    // matched[j]: tokens[..i] can match text[..j]
    let mut matched = vec![false; text.len() + 1];
    matched[0] = true;
    for token in &tokens {
        let mut next = vec![false; text.len() + 1];
        match token {
            Token::Many => {
                let mut any = false;
                for j in 0..=text.len() {
                    any |= matched[j];
                    next[j] = any;
                }
            }
            Token::One => {
                for j in 1..=text.len() {
                    next[j] = matched[j - 1];
                }
            }
            Token::Literal(c) => {
                for j in 1..=text.len() {
                    next[j] = matched[j - 1] && text[j - 1] == *c;
                }
            }
        }
        matched = next;
    }
    matched[text.len()]
}

fn filter_holds(filter: &RemoteFilter, row: &Record) -> bool {
    let actual = row.get(&filter.column).filter(|v| !v.is_null());
    match (filter.op, &filter.value, actual) {
        (RemoteOp::Is, _, a) | (RemoteOp::Eq, Value::Null, a) => a.is_none(),
        (RemoteOp::Neq, Value::Null, a) => a.is_some(),
        (_, _, None) => false,
        (RemoteOp::Eq, v, Some(a)) => values_equal(a, v),
        (RemoteOp::Neq, v, Some(a)) => !values_equal(a, v),
        (RemoteOp::Gt, v, Some(a)) => compare_values(a, v) == Some(Ordering::Greater),
        (RemoteOp::Gte, v, Some(a)) => {
            matches!(compare_values(a, v), Some(Ordering::Greater | Ordering::Equal))
        }
        (RemoteOp::Lt, v, Some(a)) => compare_values(a, v) == Some(Ordering::Less),
        (RemoteOp::Lte, v, Some(a)) => {
            matches!(compare_values(a, v), Some(Ordering::Less | Ordering::Equal))
        }
        (op @ (RemoteOp::Like | RemoteOp::Ilike), Value::String(p), Some(a)) => value_text(a)
            .is_some_and(|text| like_match(&text, p, op == RemoteOp::Ilike)),
        (RemoteOp::In, Value::Array(items), Some(a)) => {
            items.iter().any(|v| !v.is_null() && values_equal(a, v))
        }
        _ => false,
    }
}

fn row_matches(query: &RemoteQuery, row: &Record) -> bool {
    query.filters.iter().all(|f| filter_holds(f, row))
}

#[async_trait]
impl RemoteClient for InMemoryRemoteClient {
    async fn execute(&self, query: RemoteQuery, token: Option<&str>) -> RemoteResult<RemoteResponse> {
        let mut state = self.state.lock();
        Self::check_token(&state, token)?;
        let table = state.tables.entry(query.table.clone()).or_default();

        let rows = match &query.action {
            RemoteAction::Select { columns } => {
                let options = QueryOptions {
                    select: Columns::parse(columns),
                    order_by: query.order.as_ref().map(|(column, ascending)| OrderBy {
                        column: column.clone(),
                        ascending: *ascending,
                    }),
                    limit: query.limit,
                    offset: query.offset,
                    single: query.maybe_single,
                };
                let filtered = table
                    .iter()
                    .filter(|row| row_matches(&query, row))
                    .cloned()
                    .collect();
                options.apply(filtered)
            }
            RemoteAction::Count => {
                let count = table.iter().filter(|row| row_matches(&query, row)).count();
                return Ok(RemoteResponse {
                    rows: Vec::new(),
                    count: Some(count as u64),
                });
            }
            RemoteAction::Insert { rows, upsert } => {
                let mut written = Vec::with_capacity(rows.len());
                for row in rows {
                    let existing = if *upsert {
                        row.get("id").filter(|id| !id.is_null()).and_then(|id| {
                            table
                                .iter_mut()
                                .find(|r| r.get("id").is_some_and(|v| values_equal(v, id)))
                        })
                    } else {
                        None
                    };
                    match existing {
                        Some(current) => {
                            stamp_update(current, row);
                            written.push(current.clone());
                        }
                        None => {
                            let mut row = row.clone();
                            stamp_insert(&mut row);
                            table.push(row.clone());
                            written.push(row);
                        }
                    }
                }
                written
            }
            RemoteAction::Update { patch } => {
                let mut updated = Vec::new();
                for row in table.iter_mut().filter(|row| row_matches(&query, row)) {
                    stamp_update(row, patch);
                    updated.push(row.clone());
                }
                updated
            }
            RemoteAction::Delete => {
                let (removed, kept): (Vec<Record>, Vec<Record>) =
                    table.drain(..).partition(|row| row_matches(&query, row));
                *table = kept;
                removed
            }
        };
        Ok(RemoteResponse { rows, count: None })
    }

    async fn rpc(&self, function: &str, params: Value, token: Option<&str>) -> RemoteResult<Value> {
        let handler = {
            let state = self.state.lock();
            Self::check_token(&state, token)?;
            state.functions.get(function).cloned()
        };
        match handler {
            Some(handler) => Ok(handler(params)),
            None => Err(RemoteError::Api {
                status: 404,
                reason: "Not Found".to_string(),
                message: Some(format!("Could not find the function {}", function)),
            }),
        }
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> RemoteResult<RemoteAuth> {
        let mut state = self.state.lock();
        let user = state
            .users
            .iter()
            .find(|u| u.user.get("email").and_then(Value::as_str) == Some(email) && u.password == password)
            .map(|u| u.user.clone())
            .ok_or_else(|| RemoteError::Unauthorized("Invalid login credentials".to_string()))?;
        let token = Self::issue_token(&mut state, &user);
        Ok(RemoteAuth {
            access_token: Some(token),
            refresh_token: None,
            user,
        })
    }

    async fn sign_up(&self, email: &str, password: &str) -> RemoteResult<RemoteAuth> {
        let mut state = self.state.lock();
        let taken = state
            .users
            .iter()
            .any(|u| u.user.get("email").and_then(Value::as_str) == Some(email));
        if taken {
            return Err(RemoteError::Api {
                status: 422,
                reason: "Unprocessable Entity".to_string(),
                message: Some("User already registered".to_string()),
            });
        }
        let user = json!({
            "id": generate_id(),
            "email": email,
            "created_at": timestamp_now(),
        });
        state.users.push(StoredUser {
            password: password.to_string(),
            user: user.clone(),
        });
        let token = Self::issue_token(&mut state, &user);
        Ok(RemoteAuth {
            access_token: Some(token),
            refresh_token: None,
            user,
        })
    }

    async fn sign_out(&self, token: &str) -> RemoteResult<()> {
        self.state.lock().tokens.remove(token);
        Ok(())
    }

    async fn get_user(&self, token: &str) -> RemoteResult<Value> {
        let state = self.state.lock();
        let user_id = state
            .tokens
            .get(token)
            .ok_or_else(|| RemoteError::Unauthorized("JWT expired".to_string()))?;
        state
            .users
            .iter()
            .find(|u| u.user.get("id").and_then(Value::as_str) == Some(user_id.as_str()))
            .map(|u| u.user.clone())
            .ok_or_else(|| RemoteError::Unauthorized("user not found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(value: Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_like_match() {
        assert!(like_match("Widget", "%dge%", false));
        assert!(!like_match("Widget", "%DGE%", false));
        assert!(like_match("Widget", "%DGE%", true));
        assert!(like_match("Widget", "W_dget", false));
        assert!(like_match("50% off", "%0\\%%", false));
        assert!(!like_match("500 off", "%0\\%%", false));
        assert!(like_match("", "%", false));
        assert!(!like_match("", "_", false));
    }

    #[tokio::test]
    async fn test_insert_generates_columns_and_select_filters() {
        let client = InMemoryRemoteClient::new();
        let inserted = client
            .execute(
                RemoteQuery::table("widgets").insert(vec![row(json!({"name": "W1"})), row(json!({"name": "W2"}))]),
                None,
            )
            .await
            .unwrap();
        assert_eq!(inserted.rows.len(), 2);
        assert!(inserted.rows[0]["id"].is_string());
        assert!(inserted.rows[0]["created_at"].is_string());

        let selected = client
            .execute(RemoteQuery::table("widgets").select("name").like("name", "%1%"), None)
            .await
            .unwrap();
        assert_eq!(selected.rows, vec![row(json!({"name": "W1"}))]);

        let count = client
            .execute(RemoteQuery::table("widgets").count_exact(), None)
            .await
            .unwrap();
        assert_eq!(count.count, Some(2));
    }

    #[tokio::test]
    async fn test_upsert_merges_by_id() {
        let client = InMemoryRemoteClient::new();
        client.seed("t", vec![row(json!({"id": "a", "v": 1}))]);
        client
            .execute(RemoteQuery::table("t").upsert(vec![row(json!({"id": "a", "v": 2}))]), None)
            .await
            .unwrap();
        let rows = client.rows("t");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["v"], 2);
    }

    #[tokio::test]
    async fn test_revoked_token_is_unauthorized() {
        let client = InMemoryRemoteClient::new().with_required_auth();
        let auth = client.sign_up("a@b.c", "pw").await.unwrap();
        let token = auth.access_token.unwrap();

        assert!(client.execute(RemoteQuery::table("t"), Some(&token)).await.is_ok());
        assert!(matches!(
            client.execute(RemoteQuery::table("t"), None).await,
            Err(RemoteError::Unauthorized(_))
        ));

        client.revoke_tokens();
        assert!(matches!(
            client.execute(RemoteQuery::table("t"), Some(&token)).await,
            Err(RemoteError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_auth_flow() {
        let client = InMemoryRemoteClient::new();
        client.sign_up("a@b.c", "pw").await.unwrap();
        assert!(client.sign_up("a@b.c", "other").await.is_err());
        assert!(matches!(
            client.sign_in_with_password("a@b.c", "wrong").await,
            Err(RemoteError::Unauthorized(_))
        ));

        let auth = client.sign_in_with_password("a@b.c", "pw").await.unwrap();
        let token = auth.access_token.unwrap();
        assert_eq!(client.get_user(&token).await.unwrap()["email"], "a@b.c");
        client.sign_out(&token).await.unwrap();
        assert!(client.get_user(&token).await.is_err());
    }
}
