//! Parameterized SQL text plus positional arguments.

use daal_core::{
    validate_identifier, Columns, DaalError, DaalResult, FilterCondition, FilterSpec, QueryOptions,
    Record,
};
use serde_json::Value;
use std::collections::BTreeSet;

/// Target SQL flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqlDialect {
    /// `ILIKE`, named procedure arguments (`fn(arg => $1)`).
    #[default]
    Postgres,
    /// Substring matching via `instr`, positional procedure arguments.
    Sqlite,
}

/// One statement: text with `$1, $2, …` placeholders and the values bound
/// to them, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub args: Vec<Value>,
}

fn bind(args: &mut Vec<Value>, value: Value) -> String {
    args.push(value);
    format!("${}", args.len())
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn projection(columns: &Columns) -> String {
    match columns {
        Columns::All => "*".to_string(),
        Columns::List(columns) => columns.join(", "),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlBuilder {
    dialect: SqlDialect,
}

impl SqlBuilder {
    pub fn new(dialect: SqlDialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    fn condition(
        &self,
        column: &str,
        condition: &FilterCondition,
        args: &mut Vec<Value>,
    ) -> String {
        match condition {
            FilterCondition::IsNull | FilterCondition::Eq(Value::Null) => {
                format!("{} IS NULL", column)
            }
            FilterCondition::Neq(Value::Null) => format!("{} IS NOT NULL", column),
            FilterCondition::Eq(v) => format!("{} = {}", column, bind(args, v.clone())),
            FilterCondition::Neq(v) => format!("{} <> {}", column, bind(args, v.clone())),
            FilterCondition::Gt(v) => format!("{} > {}", column, bind(args, v.clone())),
            FilterCondition::Gte(v) => format!("{} >= {}", column, bind(args, v.clone())),
            FilterCondition::Lt(v) => format!("{} < {}", column, bind(args, v.clone())),
            FilterCondition::Lte(v) => format!("{} <= {}", column, bind(args, v.clone())),
            FilterCondition::Like(p) => match self.dialect {
                SqlDialect::Postgres => format!(
                    "{} LIKE {}",
                    column,
                    bind(args, Value::String(escape_like(p)))
                ),
                SqlDialect::Sqlite => format!(
                    "instr({}, {}) > 0",
                    column,
                    bind(args, Value::String(p.clone()))
                ),
            },
            FilterCondition::Ilike(p) => match self.dialect {
                SqlDialect::Postgres => format!(
                    "{} ILIKE {}",
                    column,
                    bind(args, Value::String(escape_like(p)))
                ),
                SqlDialect::Sqlite => format!(
                    "instr(lower({}), lower({})) > 0",
                    column,
                    bind(args, Value::String(p.clone()))
                ),
            },
            FilterCondition::In(values) if values.is_empty() => "1 = 0".to_string(),
            FilterCondition::In(values) => {
                let placeholders: Vec<String> =
                    values.iter().map(|v| bind(args, v.clone())).collect();
                format!("{} IN ({})", column, placeholders.join(", "))
            }
        }
    }

    /// ` WHERE …` (or nothing), numbering placeholders after those already
    /// in `args`.
    fn where_clause(&self, filters: &FilterSpec, args: &mut Vec<Value>) -> String {
        if filters.is_empty() {
            return String::new();
        }
        let conditions: Vec<String> = filters
            .iter()
            .map(|(column, condition)| self.condition(column, condition, args))
            .collect();
        format!(" WHERE {}", conditions.join(" AND "))
    }

    fn require_filters(filters: &FilterSpec, operation: &str) -> DaalResult<()> {
        if filters.is_empty() {
            return Err(DaalError::Validation(format!(
                "{} requires at least one filter",
                operation
            )));
        }
        Ok(())
    }

    fn paging(&self, options: &QueryOptions) -> String {
        let mut sql = String::new();
        if let Some(order) = &options.order_by {
            let direction = if order.ascending { "ASC" } else { "DESC" };
            sql.push_str(&format!(" ORDER BY {} {} NULLS LAST", order.column, direction));
        }
        match (options.effective_limit(), options.offset) {
            (Some(limit), Some(offset)) => {
                sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset))
            }
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(offset)) => match self.dialect {
                SqlDialect::Postgres => sql.push_str(&format!(" OFFSET {}", offset)),
                SqlDialect::Sqlite => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
            },
            (None, None) => {}
        }
        sql
    }

    pub fn select(
        &self,
        table: &str,
        filters: &FilterSpec,
        options: &QueryOptions,
    ) -> DaalResult<SqlStatement> {
        let mut args = Vec::new();
        let mut sql = format!("SELECT {} FROM {}", projection(&options.select), table);
        sql.push_str(&self.where_clause(filters, &mut args));
        sql.push_str(&self.paging(options));
        Ok(SqlStatement { sql, args })
    }

    pub fn select_one(
        &self,
        table: &str,
        columns: &Columns,
        filters: &FilterSpec,
    ) -> DaalResult<SqlStatement> {
        let mut args = Vec::new();
        let mut sql = format!("SELECT {} FROM {}", projection(columns), table);
        sql.push_str(&self.where_clause(filters, &mut args));
        sql.push_str(" LIMIT 1");
        Ok(SqlStatement { sql, args })
    }

    /// Single multi-row insert over the union of the records' columns;
    /// a record lacking a column binds NULL for it.
    pub fn insert(&self, table: &str, records: &[Record]) -> DaalResult<SqlStatement> {
        let columns: BTreeSet<&String> = records.iter().flat_map(|r| r.keys()).collect();
        for column in &columns {
            validate_identifier("column", column)?;
        }

        if columns.is_empty() {
            return match records.len() {
                1 => Ok(SqlStatement {
                    sql: format!("INSERT INTO {} DEFAULT VALUES RETURNING *", table),
                    args: Vec::new(),
                }),
                _ => Err(DaalError::Validation(
                    "multi-row insert requires at least one column".to_string(),
                )),
            };
        }

        let mut args = Vec::new();
        let rows: Vec<String> = records
            .iter()
            .map(|record| {
                let placeholders: Vec<String> = columns
                    .iter()
                    .map(|c| bind(&mut args, record.get(*c).cloned().unwrap_or(Value::Null)))
                    .collect();
                format!("({})", placeholders.join(", "))
            })
            .collect();
        let column_list: Vec<&str> = columns.iter().map(|c| c.as_str()).collect();

        Ok(SqlStatement {
            sql: format!(
                "INSERT INTO {} ({}) VALUES {} RETURNING *",
                table,
                column_list.join(", "),
                rows.join(", ")
            ),
            args,
        })
    }

    /// Insert that merges into the row with the same `id` on conflict.
    /// Without an `id` this is a plain insert.
    pub fn upsert(&self, table: &str, record: &Record) -> DaalResult<SqlStatement> {
        let mut statement = self.insert(table, std::slice::from_ref(record))?;
        if record.get("id").map_or(true, Value::is_null) {
            return Ok(statement);
        }

        let mut assignments: Vec<String> = record
            .keys()
            .filter(|c| c.as_str() != "id")
            .map(|c| format!("{} = excluded.{}", c, c))
            .collect();
        if assignments.is_empty() {
            assignments.push("id = excluded.id".to_string());
        }
        let head = statement.sql.trim_end_matches(" RETURNING *").to_string();
        statement.sql = format!(
            "{} ON CONFLICT (id) DO UPDATE SET {} RETURNING *",
            head,
            assignments.join(", ")
        );
        Ok(statement)
    }

    /// `UPDATE … SET … WHERE … RETURNING *`; WHERE placeholders continue
    /// after the SET placeholders. Rejects an empty filter.
    pub fn update(
        &self,
        table: &str,
        filters: &FilterSpec,
        patch: &Record,
    ) -> DaalResult<SqlStatement> {
        Self::require_filters(filters, "update")?;
        if patch.is_empty() {
            return Err(DaalError::Validation(
                "update requires at least one column to set".to_string(),
            ));
        }

        let mut args = Vec::new();
        let mut assignments = Vec::with_capacity(patch.len());
        for (column, value) in patch {
            validate_identifier("column", column)?;
            assignments.push(format!("{} = {}", column, bind(&mut args, value.clone())));
        }
        let where_clause = self.where_clause(filters, &mut args);
        Ok(SqlStatement {
            sql: format!(
                "UPDATE {} SET {}{} RETURNING *",
                table,
                assignments.join(", "),
                where_clause
            ),
            args,
        })
    }

    /// `DELETE FROM … WHERE … RETURNING *`. Rejects an empty filter.
    pub fn delete(&self, table: &str, filters: &FilterSpec) -> DaalResult<SqlStatement> {
        Self::require_filters(filters, "delete")?;
        let mut args = Vec::new();
        let where_clause = self.where_clause(filters, &mut args);
        Ok(SqlStatement {
            sql: format!("DELETE FROM {}{} RETURNING *", table, where_clause),
            args,
        })
    }

    pub fn count(&self, table: &str, filters: &FilterSpec) -> DaalResult<SqlStatement> {
        let mut args = Vec::new();
        let where_clause = self.where_clause(filters, &mut args);
        Ok(SqlStatement {
            sql: format!("SELECT COUNT(*) FROM {}{}", table, where_clause),
            args,
        })
    }

    /// `SELECT fn(…) AS result`. Object params become named arguments on
    /// Postgres and positional ones (in key order) on SQLite; a list is
    /// always positional; null means no arguments.
    pub fn rpc(&self, function: &str, params: &Value) -> DaalResult<SqlStatement> {
        let mut args = Vec::new();
        let arguments: Vec<String> = match params {
            Value::Null => Vec::new(),
            Value::Object(named) => {
                let mut arguments = Vec::with_capacity(named.len());
                for (name, value) in named {
                    validate_identifier("argument", name)?;
                    let placeholder = bind(&mut args, value.clone());
                    arguments.push(match self.dialect {
                        SqlDialect::Postgres => format!("{} => {}", name, placeholder),
                        SqlDialect::Sqlite => placeholder,
                    });
                }
                arguments
            }
            Value::Array(values) => values.iter().map(|v| bind(&mut args, v.clone())).collect(),
            scalar => vec![bind(&mut args, scalar.clone())],
        };
        Ok(SqlStatement {
            sql: format!("SELECT {}({}) AS result", function, arguments.join(", ")),
            args,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daal_core::OrderBy;
    use serde_json::json;

    fn record(value: Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    fn pg() -> SqlBuilder {
        SqlBuilder::new(SqlDialect::Postgres)
    }

    #[test]
    fn test_multi_row_insert() {
        let statement = pg()
            .insert("t", &[record(json!({"a": 1})), record(json!({"a": 2}))])
            .unwrap();
        assert_eq!(
            statement.sql,
            "INSERT INTO t (a) VALUES ($1), ($2) RETURNING *"
        );
        assert_eq!(statement.args, vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_insert_column_union_binds_null() {
        let statement = pg()
            .insert("t", &[record(json!({"a": 1})), record(json!({"b": "x"}))])
            .unwrap();
        assert_eq!(
            statement.sql,
            "INSERT INTO t (a, b) VALUES ($1, $2), ($3, $4) RETURNING *"
        );
        assert_eq!(
            statement.args,
            vec![json!(1), Value::Null, Value::Null, json!("x")]
        );
    }

    #[test]
    fn test_insert_rejects_bad_column() {
        assert!(pg().insert("t", &[record(json!({"a;drop": 1}))]).is_err());
        assert_eq!(
            pg().insert("t", &[Record::new()]).unwrap().sql,
            "INSERT INTO t DEFAULT VALUES RETURNING *"
        );
    }

    #[test]
    fn test_update_renumbers_where_placeholders() {
        let statement = pg()
            .update(
                "users",
                &FilterSpec::new().eq("id", 5).gte("age", 18),
                &record(json!({"name": "Bob", "role": "admin"})),
            )
            .unwrap();
        assert_eq!(
            statement.sql,
            "UPDATE users SET name = $1, role = $2 WHERE age >= $3 AND id = $4 RETURNING *"
        );
        assert_eq!(
            statement.args,
            vec![json!("Bob"), json!("admin"), json!(18), json!(5)]
        );
    }

    #[test]
    fn test_update_and_delete_require_filters() {
        let update = pg().update("t", &FilterSpec::new(), &record(json!({"a": 1})));
        assert!(matches!(update, Err(DaalError::Validation(_))));
        let delete = pg().delete("t", &FilterSpec::new());
        assert!(matches!(delete, Err(DaalError::Validation(_))));
    }

    #[test]
    fn test_select_with_every_operator() {
        let filters = FilterSpec::new()
            .eq("a", 1)
            .neq("b", "x")
            .lt("c", 3)
            .like("d", "50%")
            .ilike("e", "Bo")
            .in_list("f", [1, 2])
            .in_list("g", Vec::<i64>::new())
            .is_null("h")
            .neq("i", Value::Null);
        let options = QueryOptions::columns("a,b")
            .with_order(OrderBy::desc("a"))
            .with_limit(10)
            .with_offset(5);
        let statement = pg().select("t", &filters, &options).unwrap();
        assert_eq!(
            statement.sql,
            "SELECT a, b FROM t WHERE a = $1 AND b <> $2 AND c < $3 AND d LIKE $4 \
             AND e ILIKE $5 AND f IN ($6, $7) AND 1 = 0 AND h IS NULL AND i IS NOT NULL \
             ORDER BY a DESC NULLS LAST LIMIT 10 OFFSET 5"
        );
        assert_eq!(
            statement.args,
            vec![
                json!(1),
                json!("x"),
                json!(3),
                json!("%50\\%%"),
                json!("%Bo%"),
                json!(1),
                json!(2)
            ]
        );
    }

    #[test]
    fn test_sqlite_substring_matching_and_offset() {
        let builder = SqlBuilder::new(SqlDialect::Sqlite);
        let statement = builder
            .select(
                "t",
                &FilterSpec::new().like("a", "x").ilike("b", "Y"),
                &QueryOptions::new().with_offset(3),
            )
            .unwrap();
        assert_eq!(
            statement.sql,
            "SELECT * FROM t WHERE instr(a, $1) > 0 AND instr(lower(b), lower($2)) > 0 LIMIT -1 OFFSET 3"
        );
        assert_eq!(statement.args, vec![json!("x"), json!("Y")]);
    }

    #[test]
    fn test_select_one_count_delete() {
        let filters = FilterSpec::new().eq("id", 7);
        assert_eq!(
            pg().select_one("t", &Columns::All, &filters).unwrap().sql,
            "SELECT * FROM t WHERE id = $1 LIMIT 1"
        );
        assert_eq!(
            pg().count("t", &FilterSpec::new()).unwrap().sql,
            "SELECT COUNT(*) FROM t"
        );
        assert_eq!(
            pg().delete("t", &filters).unwrap().sql,
            "DELETE FROM t WHERE id = $1 RETURNING *"
        );
    }

    #[test]
    fn test_upsert_on_id_conflict() {
        let statement = pg()
            .upsert("t", &record(json!({"id": 1, "name": "a"})))
            .unwrap();
        assert_eq!(
            statement.sql,
            "INSERT INTO t (id, name) VALUES ($1, $2) ON CONFLICT (id) DO UPDATE SET name = excluded.name RETURNING *"
        );
        let plain = pg().upsert("t", &record(json!({"name": "a"}))).unwrap();
        assert_eq!(plain.sql, "INSERT INTO t (name) VALUES ($1) RETURNING *");
    }

    #[test]
    fn test_rpc_named_and_positional() {
        let params = json!({"user_id": 5, "limit": 10});
        assert_eq!(
            pg().rpc("recent_items", &params).unwrap().sql,
            "SELECT recent_items(limit => $1, user_id => $2) AS result"
        );
        let sqlite = SqlBuilder::new(SqlDialect::Sqlite).rpc("abs", &json!({"x": -3})).unwrap();
        assert_eq!(sqlite.sql, "SELECT abs($1) AS result");
        assert_eq!(sqlite.args, vec![json!(-3)]);
        assert_eq!(pg().rpc("now", &Value::Null).unwrap().sql, "SELECT now() AS result");
    }
}
