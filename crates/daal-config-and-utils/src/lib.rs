//! Configuration, filesystem paths, and logging setup for DAAL binaries.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    BackendKind, Config, MockConfig, SqlConnectionConfig, DEFAULT_HTTP_BASE_URL,
    DEFAULT_LOG_LEVEL, DEFAULT_MOCK_LATENCY_MS, DEFAULT_SUPABASE_ANON_KEY, DEFAULT_SUPABASE_URL,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service, normalized_level};
pub use paths::Paths;
