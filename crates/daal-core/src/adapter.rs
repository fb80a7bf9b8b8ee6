//! The adapter contract.

use crate::{
    Columns, DaalError, DaalResult, FilterSpec, QueryOptions, Record, ResponseEnvelope, Session,
    SessionTracker,
};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

/// Uniform operation set every backend exposes. Never fails: errors come
/// back as `success: false` envelopes.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Adapter identifier, for logs and diagnostics.
    fn name(&self) -> &'static str;

    async fn query(
        &self,
        table: &str,
        filters: &FilterSpec,
        options: &QueryOptions,
    ) -> ResponseEnvelope<Vec<Record>>;

    /// `columns` is `"*"` or a comma-separated list.
    async fn select(
        &self,
        table: &str,
        columns: &str,
        filters: &FilterSpec,
    ) -> ResponseEnvelope<Vec<Record>> {
        self.query(table, filters, &QueryOptions::columns(columns))
            .await
    }

    /// At most one row; success with null data when nothing matches.
    async fn select_one(
        &self,
        table: &str,
        columns: &str,
        filters: &FilterSpec,
    ) -> ResponseEnvelope<Option<Record>>;

    async fn insert(&self, table: &str, data: Record) -> ResponseEnvelope<Record>;

    async fn insert_many(&self, table: &str, data: Vec<Record>) -> ResponseEnvelope<Vec<Record>>;

    /// Returns the rows after the patch was applied.
    async fn update(
        &self,
        table: &str,
        filters: &FilterSpec,
        patch: Record,
    ) -> ResponseEnvelope<Vec<Record>>;

    /// Returns the removed rows.
    async fn delete(&self, table: &str, filters: &FilterSpec) -> ResponseEnvelope<Vec<Record>>;

    /// Insert, or merge into the row with the same `id`.
    async fn upsert(&self, table: &str, data: Record) -> ResponseEnvelope<Record>;

    async fn count(&self, table: &str, filters: &FilterSpec) -> ResponseEnvelope<u64>;

    async fn rpc(&self, name: &str, params: Value) -> ResponseEnvelope<Value>;

    async fn sign_in(&self, email: &str, password: &str) -> ResponseEnvelope<Session>;

    async fn sign_up(&self, email: &str, password: &str) -> ResponseEnvelope<Session>;

    async fn sign_out(&self) -> ResponseEnvelope<()>;

    async fn get_current_user(&self) -> ResponseEnvelope<Option<Value>>;

    async fn is_authenticated(&self) -> ResponseEnvelope<bool>;
}

/// Fallible backend implementation.
///
/// Adapters implement this with plain `?` propagation; the blanket
/// [`BackendAdapter`] impl validates names, normalizes results into
/// envelopes, and drops the session whenever an operation fails with an
/// auth error.
#[async_trait]
pub trait Backend: Send + Sync {
    const NAME: &'static str;

    fn session(&self) -> &SessionTracker;

    async fn try_query(
        &self,
        table: &str,
        filters: &FilterSpec,
        options: &QueryOptions,
    ) -> DaalResult<Vec<Record>>;

    async fn try_select_one(
        &self,
        table: &str,
        columns: &Columns,
        filters: &FilterSpec,
    ) -> DaalResult<Option<Record>> {
        let options = QueryOptions::new().with_select(columns.clone()).single();
        Ok(self
            .try_query(table, filters, &options)
            .await?
            .into_iter()
            .next())
    }

    async fn try_insert_many(&self, table: &str, records: Vec<Record>) -> DaalResult<Vec<Record>>;

    async fn try_insert(&self, table: &str, record: Record) -> DaalResult<Record> {
        self.try_insert_many(table, vec![record])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DaalError::Backend(format!("insert into {} returned no rows", table)))
    }

    async fn try_update(
        &self,
        table: &str,
        filters: &FilterSpec,
        patch: Record,
    ) -> DaalResult<Vec<Record>>;

    async fn try_delete(&self, table: &str, filters: &FilterSpec) -> DaalResult<Vec<Record>>;

    async fn try_upsert(&self, table: &str, record: Record) -> DaalResult<Record>;

    async fn try_count(&self, table: &str, filters: &FilterSpec) -> DaalResult<u64>;

    async fn try_rpc(&self, name: &str, params: Value) -> DaalResult<Value>;

    async fn try_sign_in(&self, email: &str, password: &str) -> DaalResult<Session>;

    async fn try_sign_up(&self, email: &str, password: &str) -> DaalResult<Session>;

    async fn try_sign_out(&self) -> DaalResult<()>;

    async fn try_current_user(&self) -> DaalResult<Option<Value>> {
        Ok(self.session().current().map(|s| s.principal))
    }

    async fn try_is_authenticated(&self) -> DaalResult<bool> {
        Ok(self.session().is_authenticated())
    }
}

/// Check that `name` is a plain (optionally schema-qualified) identifier.
pub fn validate_identifier(kind: &str, name: &str) -> DaalResult<()> {
    let valid_part = |part: &str| {
        let mut chars = part.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() <= 2 && parts.iter().all(|p| valid_part(p)) {
        Ok(())
    } else {
        Err(DaalError::Validation(format!("invalid {} name '{}'", kind, name)))
    }
}

fn validate_filters(filters: &FilterSpec) -> DaalResult<()> {
    filters
        .iter()
        .try_for_each(|(column, _)| validate_identifier("column", column))
}

fn validate_options(options: &QueryOptions) -> DaalResult<()> {
    options.validate()?;
    if let Columns::List(columns) = &options.select {
        for column in columns {
            validate_identifier("column", column)?;
        }
    }
    if let Some(order) = &options.order_by {
        validate_identifier("column", &order.column)?;
    }
    Ok(())
}

fn finish<B: Backend, T>(
    backend: &B,
    op: &'static str,
    token: Option<String>,
    result: DaalResult<T>,
) -> ResponseEnvelope<T> {
    match &result {
        Ok(_) => debug!(adapter = B::NAME, op, "Operation succeeded"),
        Err(e) => {
            warn!(adapter = B::NAME, op, kind = ?e.kind(), error = %e, "Operation failed");
            if e.is_auth_failure() {
                backend.session().invalidate(token.as_deref(), op);
            }
        }
    }
    ResponseEnvelope::from_result(result)
}

#[async_trait]
impl<B: Backend> BackendAdapter for B {
    fn name(&self) -> &'static str {
        B::NAME
    }

    async fn query(
        &self,
        table: &str,
        filters: &FilterSpec,
        options: &QueryOptions,
    ) -> ResponseEnvelope<Vec<Record>> {
        let token = self.session().token();
        let result: DaalResult<_> = async {
            validate_identifier("table", table)?;
            validate_filters(filters)?;
            validate_options(options)?;
            self.try_query(table, filters, options).await
        }
        .await;
        finish(self, "query", token, result)
    }

    async fn select_one(
        &self,
        table: &str,
        columns: &str,
        filters: &FilterSpec,
    ) -> ResponseEnvelope<Option<Record>> {
        let token = self.session().token();
        let result: DaalResult<_> = async {
            let columns = Columns::parse(columns);
            validate_identifier("table", table)?;
            validate_filters(filters)?;
            validate_options(&QueryOptions::new().with_select(columns.clone()))?;
            self.try_select_one(table, &columns, filters).await
        }
        .await;
        finish(self, "select_one", token, result)
    }

    async fn insert(&self, table: &str, data: Record) -> ResponseEnvelope<Record> {
        let token = self.session().token();
        let result: DaalResult<_> = async {
            validate_identifier("table", table)?;
            self.try_insert(table, data).await
        }
        .await;
        finish(self, "insert", token, result)
    }

    async fn insert_many(&self, table: &str, data: Vec<Record>) -> ResponseEnvelope<Vec<Record>> {
        let token = self.session().token();
        let result: DaalResult<_> = async {
            validate_identifier("table", table)?;
            if data.is_empty() {
                return Ok(Vec::new());
            }
            self.try_insert_many(table, data).await
        }
        .await;
        finish(self, "insert_many", token, result)
    }

    async fn update(
        &self,
        table: &str,
        filters: &FilterSpec,
        patch: Record,
    ) -> ResponseEnvelope<Vec<Record>> {
        let token = self.session().token();
        let result: DaalResult<_> = async {
            validate_identifier("table", table)?;
            validate_filters(filters)?;
            if patch.is_empty() {
                return Err(DaalError::Validation(
                    "update requires at least one column to set".to_string(),
                ));
            }
            self.try_update(table, filters, patch).await
        }
        .await;
        finish(self, "update", token, result)
    }

    async fn delete(&self, table: &str, filters: &FilterSpec) -> ResponseEnvelope<Vec<Record>> {
        let token = self.session().token();
        let result: DaalResult<_> = async {
            validate_identifier("table", table)?;
            validate_filters(filters)?;
            self.try_delete(table, filters).await
        }
        .await;
        finish(self, "delete", token, result)
    }

    async fn upsert(&self, table: &str, data: Record) -> ResponseEnvelope<Record> {
        let token = self.session().token();
        let result: DaalResult<_> = async {
            validate_identifier("table", table)?;
            self.try_upsert(table, data).await
        }
        .await;
        finish(self, "upsert", token, result)
    }

    async fn count(&self, table: &str, filters: &FilterSpec) -> ResponseEnvelope<u64> {
        let token = self.session().token();
        let result: DaalResult<_> = async {
            validate_identifier("table", table)?;
            validate_filters(filters)?;
            self.try_count(table, filters).await
        }
        .await;
        finish(self, "count", token, result)
    }

    async fn rpc(&self, name: &str, params: Value) -> ResponseEnvelope<Value> {
        let token = self.session().token();
        let result: DaalResult<_> = async {
            validate_identifier("function", name)?;
            self.try_rpc(name, params).await
        }
        .await;
        finish(self, "rpc", token, result)
    }

    async fn sign_in(&self, email: &str, password: &str) -> ResponseEnvelope<Session> {
        let token = self.session().token();
        let result: DaalResult<_> = async {
            if email.trim().is_empty() || password.is_empty() {
                return Err(DaalError::Validation(
                    "email and password are required".to_string(),
                ));
            }
            self.try_sign_in(email, password).await
        }
        .await;
        finish(self, "sign_in", token, result)
    }

    async fn sign_up(&self, email: &str, password: &str) -> ResponseEnvelope<Session> {
        let token = self.session().token();
        let result: DaalResult<_> = async {
            if email.trim().is_empty() || password.is_empty() {
                return Err(DaalError::Validation(
                    "email and password are required".to_string(),
                ));
            }
            self.try_sign_up(email, password).await
        }
        .await;
        finish(self, "sign_up", token, result)
    }

    async fn sign_out(&self) -> ResponseEnvelope<()> {
        let token = self.session().token();
        let result = self.try_sign_out().await;
        finish(self, "sign_out", token, result)
    }

    async fn get_current_user(&self) -> ResponseEnvelope<Option<Value>> {
        let token = self.session().token();
        let result = self.try_current_user().await;
        finish(self, "get_current_user", token, result)
    }

    async fn is_authenticated(&self) -> ResponseEnvelope<bool> {
        let token = self.session().token();
        let result = self.try_is_authenticated().await;
        finish(self, "is_authenticated", token, result)
    }
}
