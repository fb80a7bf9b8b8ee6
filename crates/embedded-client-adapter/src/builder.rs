//! Chained query builder of the remote platform client.
//!
//! ```ignore
//! let query = RemoteQuery::table("widgets")
//!     .select("id,name")
//!     .gte("qty", 5)
//!     .order("name", true)
//!     .range(0, 10);
//! ```

use daal_core::Record;
use serde_json::Value;

/// What the request does to the table.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteAction {
    Select { columns: String },
    /// Head-only request with an exact-count directive.
    Count,
    Insert { rows: Vec<Record>, upsert: bool },
    Update { patch: Record },
    Delete,
}

/// Filter operators understood by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Ilike,
    In,
    Is,
}

impl RemoteOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteOp::Eq => "eq",
            RemoteOp::Neq => "neq",
            RemoteOp::Gt => "gt",
            RemoteOp::Gte => "gte",
            RemoteOp::Lt => "lt",
            RemoteOp::Lte => "lte",
            RemoteOp::Like => "like",
            RemoteOp::Ilike => "ilike",
            RemoteOp::In => "in",
            RemoteOp::Is => "is",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFilter {
    pub column: String,
    pub op: RemoteOp,
    pub value: Value,
}

/// One request against one table.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteQuery {
    pub table: String,
    pub action: RemoteAction,
    pub filters: Vec<RemoteFilter>,
    /// `(column, ascending)`
    pub order: Option<(String, bool)>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    /// Collapse to at most one row.
    pub maybe_single: bool,
}

impl RemoteQuery {
    /// Start a query on `table`; defaults to selecting every column.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            action: RemoteAction::Select {
                columns: "*".to_string(),
            },
            filters: Vec::new(),
            order: None,
            offset: None,
            limit: None,
            maybe_single: false,
        }
    }

    pub fn select(mut self, columns: impl Into<String>) -> Self {
        self.action = RemoteAction::Select {
            columns: columns.into(),
        };
        self
    }

    pub fn count_exact(mut self) -> Self {
        self.action = RemoteAction::Count;
        self
    }

    pub fn insert(mut self, rows: Vec<Record>) -> Self {
        self.action = RemoteAction::Insert {
            rows,
            upsert: false,
        };
        self
    }

    pub fn upsert(mut self, rows: Vec<Record>) -> Self {
        self.action = RemoteAction::Insert { rows, upsert: true };
        self
    }

    pub fn update(mut self, patch: Record) -> Self {
        self.action = RemoteAction::Update { patch };
        self
    }

    pub fn delete(mut self) -> Self {
        self.action = RemoteAction::Delete;
        self
    }

    pub fn filter(mut self, column: impl Into<String>, op: RemoteOp, value: Value) -> Self {
        self.filters.push(RemoteFilter {
            column: column.into(),
            op,
            value,
        });
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(column, RemoteOp::Eq, value.into())
    }

    pub fn neq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(column, RemoteOp::Neq, value.into())
    }

    pub fn gt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(column, RemoteOp::Gt, value.into())
    }

    pub fn gte(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(column, RemoteOp::Gte, value.into())
    }

    pub fn lt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(column, RemoteOp::Lt, value.into())
    }

    pub fn lte(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(column, RemoteOp::Lte, value.into())
    }

    /// SQL `LIKE` pattern (`%` and `_` are wildcards, `\` escapes).
    pub fn like(self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.filter(column, RemoteOp::Like, Value::String(pattern.into()))
    }

    pub fn ilike(self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.filter(column, RemoteOp::Ilike, Value::String(pattern.into()))
    }

    pub fn in_(self, column: impl Into<String>, values: Vec<Value>) -> Self {
        self.filter(column, RemoteOp::In, Value::Array(values))
    }

    pub fn is_null(self, column: impl Into<String>) -> Self {
        self.filter(column, RemoteOp::Is, Value::Null)
    }

    /// `not.is.null`, expressed as `neq null`.
    pub fn not_null(self, column: impl Into<String>) -> Self {
        self.filter(column, RemoteOp::Neq, Value::Null)
    }

    pub fn order(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some((column.into(), ascending));
        self
    }

    pub fn range(mut self, offset: u64, limit: u64) -> Self {
        self.offset = Some(offset);
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn maybe_single(mut self) -> Self {
        self.maybe_single = true;
        self.limit = Some(1);
        self
    }

    /// Whether the request mutates the table.
    pub fn is_write(&self) -> bool {
        matches!(
            self.action,
            RemoteAction::Insert { .. } | RemoteAction::Update { .. } | RemoteAction::Delete
        )
    }
}

/// Escape `%`, `_` and `\` so `text` matches literally inside a LIKE pattern.
pub fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// LIKE pattern matching `text` anywhere: `%escaped%`.
pub fn contains_pattern(text: &str) -> String {
    format!("%{}%", escape_like(text))
}
