//! SQL adapter error types.

use daal_core::DaalError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SqlError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SqlResult<T> = Result<T, SqlError>;

pub(crate) fn from_tokio_rusqlite(e: tokio_rusqlite::Error) -> SqlError {
    match e {
        tokio_rusqlite::Error::Rusqlite(e) => SqlError::Sqlite(e),
        tokio_rusqlite::Error::Close(_) => SqlError::Connection("Connection closed".to_string()),
        other => SqlError::Connection(other.to_string()),
    }
}

impl From<SqlError> for DaalError {
    fn from(e: SqlError) -> Self {
        DaalError::Backend(e.to_string())
    }
}
