//! Statement execution port.

use crate::SqlResult;
use async_trait::async_trait;
use daal_core::Record;
use serde_json::Value;

/// Runs one parameterized statement and returns its rows as records.
///
/// `sql` uses `$1, $2, …` placeholders; `args[i]` binds to `$(i + 1)`.
/// Statements without a result set return no rows.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute(&self, sql: &str, args: &[Value]) -> SqlResult<Vec<Record>>;
}
