//! [`SqlExecutor`] over an embedded SQLite database.
//!
//! Every statement runs on the connection's dedicated thread through
//! `tokio_rusqlite`; callers await without blocking the runtime. `$n`
//! placeholders are rewritten to SQLite's `?n` before preparing.
//!
//! SQLite has no boolean or JSON type. `true`/`false` are stored as `1`/`0`
//! and arrays and objects as JSON text; columns declared `BOOLEAN` or `JSON`
//! decode them back. Blobs read back as base64 strings.
//!
//! Every connection replaces the built-in ASCII-only `lower()` with a
//! Unicode-aware one so case-insensitive matching folds `É` like `E`.

use crate::error::from_tokio_rusqlite;
use crate::{SqlError, SqlExecutor, SqlResult};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use daal_core::Record;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::{Number, Value};
use std::path::Path;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

/// Rewrite `$1` style placeholders to `?1`, leaving quoted text alone.
pub fn rewrite_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                out.push(c);
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    out.push(c);
                }
                '$' if chars.peek().is_some_and(|n| n.is_ascii_digit()) => out.push('?'),
                _ => out.push(c),
            },
        }
    }
    out
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        nested => SqlValue::Text(nested.to_string()),
    }
}

fn from_sql_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(STANDARD.encode(bytes)),
    }
}

/// Decode by declared column type, falling back to the storage class.
fn from_sql_column(value: ValueRef<'_>, decl_type: Option<&str>) -> Value {
    match (decl_type, value) {
        (Some(decl), ValueRef::Integer(i)) if decl.contains("BOOL") => Value::Bool(i != 0),
        (Some(decl), ValueRef::Text(bytes)) if decl.starts_with("JSON") => {
            serde_json::from_slice(bytes).unwrap_or_else(|_| from_sql_value(value))
        }
        _ => from_sql_value(value),
    }
}

fn register_functions(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "lower",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            Ok(match ctx.get_raw(0) {
                ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).to_lowercase()),
                other => SqlValue::from(other),
            })
        },
    )
}

#[derive(Clone)]
pub struct SqliteExecutor {
    conn: Connection,
    path: String,
}

impl SqliteExecutor {
    /// Open (or create) a database file, creating parent directories.
    pub async fn open(path: &Path) -> SqlResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let path_str = path.to_string_lossy().to_string();
        info!(path = %path_str, "Opening SQLite database");

        let conn = Connection::open(path_str.clone())
            .await
            .map_err(|e| SqlError::Connection(e.to_string()))?;
        conn.call(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
            register_functions(conn)?;
            Ok(())
        })
        .await
        .map_err(from_tokio_rusqlite)?;

        Ok(Self {
            conn,
            path: path_str,
        })
    }

    pub async fn open_in_memory() -> SqlResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| SqlError::Connection(e.to_string()))?;
        conn.call(|conn| {
            register_functions(conn)?;
            Ok(())
        })
        .await
        .map_err(from_tokio_rusqlite)?;
        Ok(Self {
            conn,
            path: ":memory:".to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Run several statements without parameters (schema setup).
    pub async fn execute_batch(&self, sql: &str) -> SqlResult<()> {
        let sql = sql.to_string();
        self.conn
            .call(move |conn| {
                conn.execute_batch(&sql)?;
                Ok(())
            })
            .await
            .map_err(from_tokio_rusqlite)
    }
}

#[async_trait]
impl SqlExecutor for SqliteExecutor {
    async fn execute(&self, sql: &str, args: &[Value]) -> SqlResult<Vec<Record>> {
        let sql = rewrite_placeholders(sql);
        let params: Vec<SqlValue> = args.iter().map(to_sql_value).collect();

        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let columns: Vec<(String, Option<String>)> = stmt
                    .columns()
                    .iter()
                    .map(|c| (c.name().to_string(), c.decl_type().map(str::to_ascii_uppercase)))
                    .collect();
                let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;

                let mut records = Vec::new();
                while let Some(row) = rows.next()? {
                    let mut record = Record::new();
                    for (i, (name, decl_type)) in columns.iter().enumerate() {
                        let value = from_sql_column(row.get_ref(i)?, decl_type.as_deref());
                        record.insert(name.clone(), value);
                    }
                    records.push(record);
                }
                Ok(records)
            })
            .await
            .map_err(from_tokio_rusqlite)?;

        debug!(rows = rows.len(), "SQLite statement executed");
        Ok(rows)
    }
}

impl std::fmt::Debug for SqliteExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteExecutor")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_rewrite_placeholders() {
        assert_eq!(
            rewrite_placeholders("SELECT * FROM t WHERE a = $1 AND b IN ($2, $10)"),
            "SELECT * FROM t WHERE a = ?1 AND b IN (?2, ?10)"
        );
        assert_eq!(
            rewrite_placeholders("SELECT '$1', \"$2\", $3"),
            "SELECT '$1', \"$2\", ?3"
        );
        assert_eq!(rewrite_placeholders("SELECT $ FROM t"), "SELECT $ FROM t");
    }

    #[tokio::test]
    async fn test_insert_returning_and_select() {
        let db = SqliteExecutor::open_in_memory().await.unwrap();
        db.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, score REAL, tags TEXT)")
            .await
            .unwrap();

        let inserted = db
            .execute(
                "INSERT INTO t (name, score, tags) VALUES ($1, $2, $3) RETURNING *",
                &[json!("a"), json!(1.5), json!(["x", "y"])],
            )
            .await
            .unwrap();
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0]["id"], json!(1));
        assert_eq!(inserted[0]["tags"], json!("[\"x\",\"y\"]"));

        let rows = db
            .execute("SELECT name, score FROM t WHERE name = $1", &[json!("a")])
            .await
            .unwrap();
        assert_eq!(rows, vec![serde_json::from_value::<Record>(json!({"name": "a", "score": 1.5})).unwrap()]);
    }

    #[tokio::test]
    async fn test_booleans_and_blobs() {
        let db = SqliteExecutor::open_in_memory().await.unwrap();
        let rows = db
            .execute("SELECT $1 AS flag, x'0102' AS raw, NULL AS nothing", &[json!(true)])
            .await
            .unwrap();
        assert_eq!(rows[0]["flag"], json!(1));
        assert_eq!(rows[0]["raw"], json!("AQI="));
        assert_eq!(rows[0]["nothing"], Value::Null);
    }

    #[tokio::test]
    async fn test_declared_booleans_and_json_decode() {
        let db = SqliteExecutor::open_in_memory().await.unwrap();
        db.execute_batch("CREATE TABLE t (flag BOOLEAN, tags JSON, meta jsonb, note TEXT)")
            .await
            .unwrap();

        let rows = db
            .execute(
                "INSERT INTO t (flag, tags, meta, note) VALUES ($1, $2, $3, $4) RETURNING *",
                &[json!(true), json!(["x"]), json!("not json"), json!("[1]")],
            )
            .await
            .unwrap();
        assert_eq!(rows[0]["flag"], json!(true));
        assert_eq!(rows[0]["tags"], json!(["x"]));
        assert_eq!(rows[0]["meta"], json!("not json"));
        assert_eq!(rows[0]["note"], json!("[1]"));

        let rows = db
            .execute("SELECT flag FROM t WHERE flag = $1", &[json!(true)])
            .await
            .unwrap();
        assert_eq!(rows[0]["flag"], json!(true));
    }

    #[tokio::test]
    async fn test_lower_folds_non_ascii() {
        let db = SqliteExecutor::open_in_memory().await.unwrap();
        let rows = db
            .execute(
                "SELECT instr(lower($1), lower($2)) > 0 AS hit, lower(NULL) AS nothing, lower(42) AS n",
                &[json!("ÉCOLE Ünïon"), json!("école ü")],
            )
            .await
            .unwrap();
        assert_eq!(rows[0]["hit"], json!(1));
        assert_eq!(rows[0]["nothing"], Value::Null);
        assert_eq!(rows[0]["n"], json!(42));

        let dir = tempdir().unwrap();
        let on_disk = SqliteExecutor::open(&dir.path().join("daal.db")).await.unwrap();
        let rows = on_disk.execute("SELECT lower('ÄÖ') AS folded", &[]).await.unwrap();
        assert_eq!(rows[0]["folded"], json!("äö"));
    }

    #[tokio::test]
    async fn test_errors_surface_as_sqlite_errors() {
        let db = SqliteExecutor::open_in_memory().await.unwrap();
        let err = db.execute("SELECT * FROM missing", &[]).await.unwrap_err();
        assert!(matches!(err, SqlError::Sqlite(_)));
    }

    #[tokio::test]
    async fn test_open_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("daal.db");
        let db = SqliteExecutor::open(&path).await.unwrap();
        db.execute_batch("CREATE TABLE t (a INTEGER)").await.unwrap();
        assert!(path.exists());
        assert_eq!(db.path(), path.to_string_lossy());
    }
}
