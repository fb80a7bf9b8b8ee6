//! The remote platform client port.

use crate::builder::RemoteQuery;
use crate::error::RemoteResult;
use async_trait::async_trait;
use daal_core::Record;
use serde::Deserialize;
use serde_json::Value;

/// Rows returned by a query, plus the exact count for count requests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteResponse {
    pub rows: Vec<Record>,
    pub count: Option<u64>,
}

/// Result of a password sign-in or sign-up.
///
/// `access_token` is absent when the platform requires email confirmation
/// before issuing a session.
#[derive(Clone, Deserialize)]
pub struct RemoteAuth {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: Value,
}

impl std::fmt::Debug for RemoteAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteAuth")
            .field("has_access_token", &self.access_token.is_some())
            .field("user", &self.user.get("id"))
            .finish_non_exhaustive()
    }
}

/// Schema-aware platform client: executes built queries, procedures and
/// password auth. `token` is the caller's access token, if signed in.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn execute(&self, query: RemoteQuery, token: Option<&str>) -> RemoteResult<RemoteResponse>;

    async fn rpc(&self, function: &str, params: Value, token: Option<&str>) -> RemoteResult<Value>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> RemoteResult<RemoteAuth>;

    async fn sign_up(&self, email: &str, password: &str) -> RemoteResult<RemoteAuth>;

    async fn sign_out(&self, token: &str) -> RemoteResult<()>;

    async fn get_user(&self, token: &str) -> RemoteResult<Value>;
}
