//! Query options: projection, ordering, paging.

use crate::filter::compare_values;
use crate::{DaalError, DaalResult};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::cmp::Ordering;

/// One row: an open column → value mapping.
pub type Record = serde_json::Map<String, Value>;

/// Projection of a select.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Columns {
    #[default]
    All,
    List(Vec<String>),
}

impl Columns {
    /// Parse `"*"`, `""` or a comma-separated column list.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Columns::All;
        }
        let columns: Vec<String> = trimmed
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect();
        if columns.is_empty() || columns.iter().any(|c| c == "*") {
            Columns::All
        } else {
            Columns::List(columns)
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Columns::All)
    }

    /// `*` or `a,b,c`.
    pub fn to_csv(&self) -> String {
        match self {
            Columns::All => "*".to_string(),
            Columns::List(columns) => columns.join(","),
        }
    }

    /// Keep only the projected columns. Columns absent from the record are
    /// skipped rather than filled with null.
    pub fn project(&self, record: Record) -> Record {
        match self {
            Columns::All => record,
            Columns::List(columns) => columns
                .iter()
                .filter_map(|c| record.get(c).map(|v| (c.clone(), v.clone())))
                .collect(),
        }
    }
}

impl Serialize for Columns {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_csv())
    }
}

impl<'de> Deserialize<'de> for Columns {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(Columns::All),
            Value::String(raw) => Ok(Columns::parse(&raw)),
            Value::Array(items) => {
                let names = items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(s) => Ok(s),
                        other => Err(de::Error::custom(format!(
                            "column names must be strings, got {}",
                            other
                        ))),
                    })
                    .collect::<Result<Vec<String>, D::Error>>()?;
                Ok(Columns::parse(&names.join(",")))
            }
            other => Err(de::Error::custom(format!(
                "select must be a string or list, got {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

fn default_ascending() -> bool {
    true
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }
}

/// Options accepted by `query`.
///
/// `single` caps the result at one row; `select_one` is `query` with
/// `single` set, collapsed to the row or null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    pub select: Columns,
    pub order_by: Option<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub single: bool,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options that only carry a projection.
    pub fn columns(raw: &str) -> Self {
        Self {
            select: Columns::parse(raw),
            ..Self::default()
        }
    }

    pub fn with_select(mut self, select: Columns) -> Self {
        self.select = select;
        self
    }

    pub fn with_order(mut self, order: OrderBy) -> Self {
        self.order_by = Some(order);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn single(mut self) -> Self {
        self.single = true;
        self
    }

    /// Row cap after applying `single`.
    pub fn effective_limit(&self) -> Option<u64> {
        if self.single {
            Some(self.limit.map_or(1, |l| l.min(1)))
        } else {
            self.limit
        }
    }

    pub fn validate(&self) -> DaalResult<()> {
        if self.limit == Some(0) {
            return Err(DaalError::Validation(
                "limit must be a positive integer".to_string(),
            ));
        }
        if let Some(order) = &self.order_by {
            if order.column.trim().is_empty() {
                return Err(DaalError::Validation(
                    "order_by requires a column".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Apply ordering, paging and projection to already-filtered rows.
    ///
    /// Nulls sort last in both directions. Across types, numbers and
    /// booleans come before strings, which come before everything else.
    pub fn apply(&self, mut rows: Vec<Record>) -> Vec<Record> {
        if let Some(order) = &self.order_by {
            rows.sort_by(|a, b| {
                compare_for_sort(a.get(&order.column), b.get(&order.column), order.ascending)
            });
        }

        let offset = self.offset.unwrap_or(0) as usize;
        let limit = self.effective_limit().map_or(usize::MAX, |l| l as usize);
        rows.into_iter()
            .skip(offset)
            .take(limit)
            .map(|r| self.select.project(r))
            .collect()
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Bool(_) | Value::Number(_) => 0,
        Value::String(_) => 1,
        _ => 2,
    }
}

fn compare_for_sort(a: Option<&Value>, b: Option<&Value>, ascending: bool) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => {
            let ordering = compare_values(a, b)
                .unwrap_or_else(|| type_rank(a).cmp(&type_rank(b)));
            if ascending {
                ordering
            } else {
                ordering.reverse()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(values: Value) -> Vec<Record> {
        serde_json::from_value(values).unwrap()
    }

    #[test]
    fn test_columns_parse() {
        assert_eq!(Columns::parse("*"), Columns::All);
        assert_eq!(Columns::parse(""), Columns::All);
        assert_eq!(
            Columns::parse(" id, name ,"),
            Columns::List(vec!["id".into(), "name".into()])
        );
        assert_eq!(Columns::parse("id,*"), Columns::All);
    }

    #[test]
    fn test_projection_skips_absent_columns() {
        let record: Record = serde_json::from_value(json!({"id": 1, "name": "a", "x": 2})).unwrap();
        let projected = Columns::parse("id,missing").project(record);
        assert_eq!(Value::Object(projected), json!({"id": 1}));
    }

    #[test]
    fn test_apply_orders_pages_and_projects() {
        let input = rows(json!([
            {"id": 1, "n": 3},
            {"id": 2, "n": null},
            {"id": 3, "n": 1},
            {"id": 4, "n": 2},
        ]));

        let options = QueryOptions::columns("id")
            .with_order(OrderBy::asc("n"))
            .with_offset(1)
            .with_limit(2);
        assert_eq!(
            Value::Array(options.apply(input.clone()).into_iter().map(Value::Object).collect()),
            json!([{"id": 4}, {"id": 1}])
        );

        let desc = QueryOptions::new().with_order(OrderBy::desc("n"));
        let ids: Vec<Value> = desc.apply(input).into_iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!(1), json!(4), json!(3), json!(2)]);
    }

    #[test]
    fn test_single_caps_at_one() {
        let input = rows(json!([{"id": 1}, {"id": 2}]));
        assert_eq!(QueryOptions::new().single().apply(input).len(), 1);
    }

    #[test]
    fn test_validate_rejects_zero_limit() {
        let err = QueryOptions::new().with_limit(0).validate().unwrap_err();
        assert!(matches!(err, DaalError::Validation(_)));
        assert!(QueryOptions::new().with_limit(5).validate().is_ok());
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: QueryOptions =
            serde_json::from_value(json!({"select": ["id", "name"], "limit": 10})).unwrap();
        assert_eq!(options.select, Columns::List(vec!["id".into(), "name".into()]));
        assert_eq!(options.limit, Some(10));
        assert!(!options.single);
    }
}
