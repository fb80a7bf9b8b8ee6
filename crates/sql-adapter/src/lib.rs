//! Relational backend.
//!
//! Operations compile to parameterized statements ([`SqlBuilder`]) and run
//! through an [`SqlExecutor`]. [`SqliteExecutor`] is the bundled executor;
//! anything that can run `$n`-placeholder SQL and hand back rows can stand
//! in for it.

mod adapter;
mod builder;
mod error;
mod executor;
mod sqlite;

pub use adapter::{SqlAdapter, AUTH_USERS_TABLE, SQLITE_AUTH_SCHEMA};
pub use builder::{SqlBuilder, SqlDialect, SqlStatement};
pub use error::{SqlError, SqlResult};
pub use executor::SqlExecutor;
pub use sqlite::{rewrite_placeholders, SqliteExecutor};
