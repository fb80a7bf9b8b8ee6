//! Configuration management.
//!
//! Values resolve in three layers: built-in defaults, then the JSON config
//! file (`~/.daal/config.json`), then `DAAL_*` environment variables.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};
use url::Url;

/// Default base URL for the REST backend.
pub const DEFAULT_HTTP_BASE_URL: &str = "http://localhost:3000/api";

/// Default Supabase URL (can be overridden at compile time via SUPABASE_URL env var).
pub const DEFAULT_SUPABASE_URL: &str = match option_env!("SUPABASE_URL") {
    Some(url) => url,
    None => "https://localhost.supabase.co",
};

/// Default Supabase anon key (can be overridden at compile time via SUPABASE_ANON_KEY env var).
pub const DEFAULT_SUPABASE_ANON_KEY: &str = match option_env!("SUPABASE_ANON_KEY") {
    Some(key) => key,
    None => "anon-key",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default simulated latency for the mock backend.
pub const DEFAULT_MOCK_LATENCY_MS: u64 = 50;

/// Which backend strategy the factory should construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Embedded,
    Http,
    Mock,
    Sql,
}

impl FromStr for BackendKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "embedded" | "supabase" => Ok(Self::Embedded),
            "http" | "rest" => Ok(Self::Http),
            "mock" => Ok(Self::Mock),
            "sql" | "sqlite" | "postgres" => Ok(Self::Sql),
            other => Err(CoreError::Config(format!("unknown backend '{}'", other))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Embedded => "embedded",
            Self::Http => "http",
            Self::Mock => "mock",
            Self::Sql => "sql",
        };
        f.write_str(name)
    }
}

/// Connection parameters for the SQL backend.
///
/// `sqlite_path` selects the bundled SQLite executor; the remaining fields
/// describe a server connection for an externally supplied executor.
#[derive(Clone, Serialize, Deserialize)]
pub struct SqlConnectionConfig {
    #[serde(default = "default_sql_host")]
    pub host: String,
    #[serde(default = "default_sql_port")]
    pub port: u16,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub sqlite_path: Option<PathBuf>,
}

fn default_sql_host() -> String {
    "localhost".to_string()
}

fn default_sql_port() -> u16 {
    5432
}

impl Default for SqlConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_sql_host(),
            port: default_sql_port(),
            database: String::new(),
            user: String::new(),
            password: None,
            sqlite_path: None,
        }
    }
}

impl fmt::Debug for SqlConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("sqlite_path", &self.sqlite_path)
            .finish()
    }
}

/// Settings for the offline mock backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockConfig {
    /// Snapshot file; `None` uses the shared storage file under the base
    /// directory.
    #[serde(default)]
    pub storage_path: Option<PathBuf>,
    #[serde(default = "default_mock_latency_ms")]
    pub latency_ms: u64,
}

fn default_mock_latency_ms() -> u64 {
    DEFAULT_MOCK_LATENCY_MS
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            storage_path: None,
            latency_ms: DEFAULT_MOCK_LATENCY_MS,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Backend strategy to construct.
    #[serde(default = "default_backend")]
    pub backend: BackendKind,
    /// Base URL of the REST backend.
    #[serde(default = "default_http_base_url")]
    pub http_base_url: String,
    /// Supabase project URL for the embedded platform client.
    #[serde(default = "default_supabase_url")]
    pub supabase_url: String,
    /// Supabase anon key (public, safe to expose).
    #[serde(default = "default_supabase_anon_key")]
    pub supabase_anon_key: String,
    #[serde(default)]
    pub sql: SqlConnectionConfig,
    #[serde(default)]
    pub mock: MockConfig,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_backend() -> BackendKind {
    BackendKind::Mock
}

fn default_http_base_url() -> String {
    DEFAULT_HTTP_BASE_URL.to_string()
}

fn default_supabase_url() -> String {
    DEFAULT_SUPABASE_URL.to_string()
}

fn default_supabase_anon_key() -> String {
    DEFAULT_SUPABASE_ANON_KEY.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            backend: default_backend(),
            http_base_url: default_http_base_url(),
            supabase_url: default_supabase_url(),
            supabase_anon_key: default_supabase_anon_key(),
            sql: SqlConnectionConfig::default(),
            mock: MockConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration: file under `paths` if present, then environment.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            debug!(path = %config_path.display(), "No config file, using defaults");
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        info!(backend = %config.backend, log_level = %config.log_level, "Configuration loaded");
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Save configuration to the config file under `paths`.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override fields from `DAAL_*` variables supplied by `lookup`.
    ///
    /// Empty values are ignored so an exported-but-blank variable never
    /// clobbers a file setting.
    pub fn apply_env<F>(&mut self, lookup: F) -> CoreResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(level) = get("DAAL_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(backend) = get("DAAL_BACKEND") {
            self.backend = backend.parse()?;
            debug!(backend = %self.backend, "Backend overridden by DAAL_BACKEND");
        }
        if let Some(url) = get("DAAL_HTTP_BASE_URL") {
            self.http_base_url = url;
        }
        if let Some(url) = get("DAAL_SUPABASE_URL") {
            self.supabase_url = url;
        }
        if let Some(key) = get("DAAL_SUPABASE_ANON_KEY") {
            self.supabase_anon_key = key;
        }
        if let Some(path) = get("DAAL_SQLITE_PATH") {
            self.sql.sqlite_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = get("DAAL_MOCK_LATENCY_MS") {
            self.mock.latency_ms = raw.parse().map_err(|_| {
                CoreError::Config(format!("DAAL_MOCK_LATENCY_MS must be an integer, got '{}'", raw))
            })?;
        }
        Ok(())
    }

    /// The REST base URL, validated.
    pub fn http_base_url(&self) -> CoreResult<Url> {
        Url::parse(&self.http_base_url).map_err(CoreError::from)
    }

    /// The Supabase project URL, validated.
    pub fn supabase_url(&self) -> CoreResult<Url> {
        Url::parse(&self.supabase_url).map_err(CoreError::from)
    }
}
