//! Logging entry points for DAAL binaries.
//!
//! Thin wrappers over the `observability` crate so binaries never assemble a
//! subscriber themselves.

use observability::LogConfig;
use std::path::PathBuf;

/// Lowercase filter directive for a textual level; unknown names mean `info`.
pub fn normalized_level(level: &str) -> String {
    observability::parse_level(level).as_str().to_ascii_lowercase()
}

/// Initialize logging for the default `daal` service.
///
/// `RUST_LOG` overrides `level` when set.
pub fn init_logging(level: &str, log_path: Option<PathBuf>) {
    init_logging_for_service("daal", level, log_path);
}

/// Initialize logging under a custom service name.
pub fn init_logging_for_service(service_name: &str, level: &str, log_path: Option<PathBuf>) {
    let also_stderr = std::env::var("DAAL_LOG_STDERR")
        .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
        .unwrap_or(false);

    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: normalized_level(level),
        log_path,
        also_stderr,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_level() {
        assert_eq!(normalized_level("DEBUG"), "debug");
        assert_eq!(normalized_level(" Warning "), "warn");
        assert_eq!(normalized_level("trace"), "trace");
        assert_eq!(normalized_level("loud"), "info");
    }
}
