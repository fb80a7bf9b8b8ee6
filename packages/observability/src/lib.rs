//! # Observability
//!
//! Logging setup shared by every DAAL crate.
//!
//! Library crates never configure logging themselves: they emit events through
//! the standard `tracing` macros and leave sink selection to the binary that
//! embeds them. Binaries call [`init`] or [`init_with_config`] once at startup.
//!
//! Events are written as JSONL to `~/.daal/logs/daal.jsonl` (one object per
//! line, append-only so several processes can share the file) and optionally
//! mirrored to stderr in compact form.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "daal-cli".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! });
//! tracing::info!(adapter = "mock", "adapter ready");
//! ```

mod json_layer;
mod writer;

use std::path::PathBuf;

pub use json_layer::{JsonLayer, LogEntry, REDACTED};
pub use writer::{default_log_path, FileLogWriter, FileWriterFactory};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the emitting service, written into every log line.
    pub service_name: String,

    /// Default filter directive (e.g. "info", "daal_core=debug").
    /// `RUST_LOG` takes precedence when set.
    pub default_level: String,

    /// Custom JSONL path. Defaults to `~/.daal/logs/daal.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit compact human-readable lines on stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize logging with default settings for `service_name`.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize logging with a custom configuration.
///
/// Installing a global subscriber twice is a no-op: the second call keeps the
/// first subscriber. If the log file cannot be opened, events still go to
/// stderr so a broken home directory never silences the process.
pub fn init_with_config(config: LogConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, Layer};

    let log_path = config.log_path.clone().unwrap_or_else(default_log_path);
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_level))
    };

    let (json_layer, open_error) = match FileLogWriter::open(&log_path) {
        Ok(writer) => (
            Some(
                JsonLayer::new(config.service_name.clone(), FileWriterFactory::new(writer))
                    .with_filter(filter()),
            ),
            None,
        ),
        Err(e) => (None, Some(e)),
    };

    let stderr_layer = (config.also_stderr || open_error.is_some()).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(filter())
    });

    let installed = tracing_subscriber::registry()
        .with(json_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if !installed {
        return;
    }

    match open_error {
        None => tracing::debug!(
            service = %config.service_name,
            log_path = %log_path.display(),
            "logging initialized"
        ),
        Some(e) => tracing::warn!(
            log_path = %log_path.display(),
            error = %e,
            "could not open log file, logging to stderr only"
        ),
    }
}

/// Map a textual level onto a `tracing::Level`, defaulting to INFO.
pub fn parse_level(level: &str) -> Level {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

pub use tracing::{debug, error, info, instrument, trace, warn, Level};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "unknown");
        assert_eq!(config.default_level, "info");
        assert!(config.log_path.is_none());
        assert!(!config.also_stderr);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("TRACE"), Level::TRACE);
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level(" Warning "), Level::WARN);
        assert_eq!(parse_level("error"), Level::ERROR);
        assert_eq!(parse_level("verbose"), Level::INFO);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig {
            service_name: "test".into(),
            log_path: Some(dir.path().join("test.jsonl")),
            ..Default::default()
        };
        init_with_config(config.clone());
        init_with_config(config);
    }
}
