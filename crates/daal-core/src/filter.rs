//! Filter vocabulary and the reference `matches` predicate.
//!
//! Wire shape of a filter value (one per column):
//!
//! | wire                 | condition      |
//! |----------------------|----------------|
//! | `"x"`, `5`, `true`   | `Eq`           |
//! | `[1, 2]`             | `In`           |
//! | `null`               | `IsNull`       |
//! | `{"gte": 5}`         | operator form  |
//!
//! Operator objects carry exactly one of
//! `eq|neq|gt|gte|lt|lte|like|ilike|in`; anything else is rejected.

use crate::Record;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// One comparison applied to a single column.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterCondition {
    Eq(Value),
    Neq(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    /// Literal substring containment.
    Like(String),
    /// Case-insensitive literal substring containment.
    Ilike(String),
    In(Vec<Value>),
    IsNull,
}

impl FilterCondition {
    /// Operator keyword as it appears in the wire shape.
    pub fn operator(&self) -> &'static str {
        match self {
            FilterCondition::Eq(_) => "eq",
            FilterCondition::Neq(_) => "neq",
            FilterCondition::Gt(_) => "gt",
            FilterCondition::Gte(_) => "gte",
            FilterCondition::Lt(_) => "lt",
            FilterCondition::Lte(_) => "lte",
            FilterCondition::Like(_) => "like",
            FilterCondition::Ilike(_) => "ilike",
            FilterCondition::In(_) => "in",
            FilterCondition::IsNull => "is",
        }
    }

    /// Parse one filter value from its wire form.
    pub fn from_wire(value: Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(FilterCondition::IsNull),
            Value::Array(values) => Ok(FilterCondition::In(values)),
            Value::Object(map) => Self::from_operator_object(map),
            scalar => Ok(FilterCondition::Eq(scalar)),
        }
    }

    fn from_operator_object(map: Map<String, Value>) -> Result<Self, String> {
        if map.len() != 1 {
            return Err(format!(
                "operator object must have exactly one key, found {}",
                map.len()
            ));
        }
        let Some((op, operand)) = map.into_iter().next() else {
            return Err("empty operator object".to_string());
        };

        let condition = match op.as_str() {
            "eq" if operand.is_null() => FilterCondition::IsNull,
            "eq" => FilterCondition::Eq(operand),
            "neq" => FilterCondition::Neq(operand),
            "gt" => FilterCondition::Gt(operand),
            "gte" => FilterCondition::Gte(operand),
            "lt" => FilterCondition::Lt(operand),
            "lte" => FilterCondition::Lte(operand),
            "like" | "ilike" => {
                let Value::String(pattern) = operand else {
                    return Err(format!("'{}' expects a string pattern", op));
                };
                if op == "like" {
                    FilterCondition::Like(pattern)
                } else {
                    FilterCondition::Ilike(pattern)
                }
            }
            "in" => match operand {
                Value::Array(values) => FilterCondition::In(values),
                _ => return Err("'in' expects a list".to_string()),
            },
            other => return Err(format!("unknown filter operator '{}'", other)),
        };
        Ok(condition)
    }

    /// Explicit wire form (`{"op": operand}`, or `null` for `IsNull`).
    pub fn to_wire(&self) -> Value {
        let operand = match self {
            FilterCondition::IsNull => return Value::Null,
            FilterCondition::Eq(v)
            | FilterCondition::Neq(v)
            | FilterCondition::Gt(v)
            | FilterCondition::Gte(v)
            | FilterCondition::Lt(v)
            | FilterCondition::Lte(v) => v.clone(),
            FilterCondition::Like(p) | FilterCondition::Ilike(p) => Value::String(p.clone()),
            FilterCondition::In(vs) => Value::Array(vs.clone()),
        };
        let mut map = Map::new();
        map.insert(self.operator().to_string(), operand);
        Value::Object(map)
    }

    /// Whether a column value (`None` when the column is absent) satisfies
    /// this condition.
    ///
    /// Null and absent values satisfy only `IsNull` and `Eq(null)`.
    /// `Neq(null)` means "not null". Every other operator is false on them.
    pub fn is_satisfied_by(&self, actual: Option<&Value>) -> bool {
        let actual = actual.filter(|v| !v.is_null());
        match (self, actual) {
            (FilterCondition::IsNull, a) => a.is_none(),
            (FilterCondition::Eq(Value::Null), a) => a.is_none(),
            (FilterCondition::Neq(Value::Null), a) => a.is_some(),
            (_, None) => false,
            (FilterCondition::Eq(v), Some(a)) => values_equal(a, v),
            (FilterCondition::Neq(v), Some(a)) => !values_equal(a, v),
            (FilterCondition::Gt(v), Some(a)) => compare_values(a, v) == Some(Ordering::Greater),
            (FilterCondition::Gte(v), Some(a)) => matches!(
                compare_values(a, v),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            (FilterCondition::Lt(v), Some(a)) => compare_values(a, v) == Some(Ordering::Less),
            (FilterCondition::Lte(v), Some(a)) => matches!(
                compare_values(a, v),
                Some(Ordering::Less | Ordering::Equal)
            ),
            (FilterCondition::Like(p), Some(a)) => {
                value_text(a).is_some_and(|text| text.contains(p.as_str()))
            }
            (FilterCondition::Ilike(p), Some(a)) => value_text(a)
                .is_some_and(|text| text.to_lowercase().contains(&p.to_lowercase())),
            (FilterCondition::In(vs), Some(a)) => {
                vs.iter().any(|v| !v.is_null() && values_equal(a, v))
            }
        }
    }
}

impl Serialize for FilterCondition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FilterCondition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        FilterCondition::from_wire(value).map_err(de::Error::custom)
    }
}

/// Strict equality, with numbers compared by value (`1 == 1.0`).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// Ordered comparison between two values of the same runtime type.
///
/// Numbers compare numerically, strings lexically, booleans `false < true`.
/// Mixed or unordered types yield `None`.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Text used for substring matching: strings as-is, numbers in their JSON
/// rendering. Other types have no text form.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Column → condition mapping, implicitly AND-ed.
///
/// Backed by a `BTreeMap`, so iteration (and therefore generated SQL and
/// query strings) is ordered by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSpec(BTreeMap<String, FilterCondition>);

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the wire form (a JSON object of column → filter value).
    pub fn from_wire(value: Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(Self::new()),
            Value::Object(map) => map
                .into_iter()
                .map(|(column, v)| {
                    FilterCondition::from_wire(v)
                        .map(|c| (column.clone(), c))
                        .map_err(|e| format!("filter on '{}': {}", column, e))
                })
                .collect(),
            other => Err(format!("filters must be an object, got {}", other)),
        }
    }

    pub fn to_wire(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(column, c)| (column.clone(), c.to_wire()))
                .collect(),
        )
    }

    /// Add or replace the condition on `column`.
    pub fn insert(&mut self, column: impl Into<String>, condition: FilterCondition) {
        self.0.insert(column.into(), condition);
    }

    pub fn with(mut self, column: impl Into<String>, condition: FilterCondition) -> Self {
        self.insert(column, condition);
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        if value.is_null() {
            self.with(column, FilterCondition::IsNull)
        } else {
            self.with(column, FilterCondition::Eq(value))
        }
    }

    pub fn neq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(column, FilterCondition::Neq(value.into()))
    }

    pub fn gt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(column, FilterCondition::Gt(value.into()))
    }

    pub fn gte(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(column, FilterCondition::Gte(value.into()))
    }

    pub fn lt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(column, FilterCondition::Lt(value.into()))
    }

    pub fn lte(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(column, FilterCondition::Lte(value.into()))
    }

    pub fn like(self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.with(column, FilterCondition::Like(pattern.into()))
    }

    pub fn ilike(self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.with(column, FilterCondition::Ilike(pattern.into()))
    }

    pub fn in_list<I, V>(self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.with(column, FilterCondition::In(values))
    }

    pub fn is_null(self, column: impl Into<String>) -> Self {
        self.with(column, FilterCondition::IsNull)
    }

    pub fn get(&self, column: &str) -> Option<&FilterCondition> {
        self.0.get(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FilterCondition)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every condition is a plain equality.
    pub fn is_equality_only(&self) -> bool {
        self.0.values().all(|c| matches!(c, FilterCondition::Eq(_)))
    }
}

impl FromIterator<(String, FilterCondition)> for FilterSpec {
    fn from_iter<T: IntoIterator<Item = (String, FilterCondition)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a FilterSpec {
    type Item = (&'a String, &'a FilterCondition);
    type IntoIter = std::collections::btree_map::Iter<'a, String, FilterCondition>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Reference predicate: every condition in `filters` holds for `record`.
pub fn matches(record: &Record, filters: &FilterSpec) -> bool {
    filters
        .iter()
        .all(|(column, condition)| condition.is_satisfied_by(record.get(column)))
}
