//! Error types for the remote platform client.

use daal_core::DaalError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    /// Network or transport-level failure from reqwest.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The platform answered 401.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The platform answered with another non-success status.
    ///
    /// `message` is the error text extracted from the body, when there was one.
    #[error("Remote error: {status} {reason}")]
    Api {
        status: u16,
        reason: String,
        message: Option<String>,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid base URL or other setup problem.
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

impl From<RemoteError> for DaalError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Http(e) => DaalError::Network(e.to_string()),
            RemoteError::Unauthorized(message) => DaalError::Auth(message),
            RemoteError::Api {
                message: Some(message),
                ..
            } => DaalError::Backend(message),
            RemoteError::Api {
                status,
                reason,
                message: None,
            } => DaalError::http_status(status, &reason),
            RemoteError::Json(e) => DaalError::Backend(format!("invalid response: {}", e)),
            RemoteError::Config(message) => DaalError::Backend(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_without_body_renders_status() {
        let err: DaalError = RemoteError::Api {
            status: 404,
            reason: "Not Found".to_string(),
            message: None,
        }
        .into();
        assert_eq!(err.to_string(), "HTTP 404: Not Found");
    }

    #[test]
    fn test_api_error_prefers_body_message() {
        let err: DaalError = RemoteError::Api {
            status: 409,
            reason: "Conflict".to_string(),
            message: Some("duplicate key value".to_string()),
        }
        .into();
        assert_eq!(err.to_string(), "Backend error: duplicate key value");
    }

    #[test]
    fn test_unauthorized_is_auth() {
        let err: DaalError = RemoteError::Unauthorized("JWT expired".to_string()).into();
        assert!(err.is_auth_failure());
    }
}
