//! DAAL error taxonomy.

use daal_storage::StorageError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error raised inside an adapter before it is normalized into a
/// [`crate::ResponseEnvelope`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DaalError {
    /// The request is malformed or unsafe (e.g. a filterless update).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid credentials, missing/expired token, or an unauthorized response.
    #[error("Auth error: {0}")]
    Auth(String),

    /// A required row does not exist.
    ///
    /// `select_one` never raises this; an empty result is success with null data.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transport failure or a non-2xx status without a usable body.
    /// Rendered verbatim, e.g. `HTTP 404: Not Found`.
    #[error("{0}")]
    Network(String),

    /// The underlying client, driver, or store failed in some other way.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Coarse classification of a [`DaalError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Auth,
    NotFound,
    Network,
    Backend,
}

impl DaalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DaalError::Validation(_) => ErrorKind::Validation,
            DaalError::Auth(_) => ErrorKind::Auth,
            DaalError::NotFound(_) => ErrorKind::NotFound,
            DaalError::Network(_) => ErrorKind::Network,
            DaalError::Backend(_) => ErrorKind::Backend,
        }
    }

    /// True when the current session must be dropped.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, DaalError::Auth(_))
    }

    /// Normalized error for a non-2xx HTTP status that carried no usable body.
    pub fn http_status(status: u16, reason: &str) -> Self {
        let message = format!("HTTP {}: {}", status, reason);
        if status == 401 {
            DaalError::Auth(message)
        } else {
            DaalError::Network(message)
        }
    }
}

impl From<StorageError> for DaalError {
    fn from(e: StorageError) -> Self {
        DaalError::Backend(e.to_string())
    }
}

impl From<serde_json::Error> for DaalError {
    fn from(e: serde_json::Error) -> Self {
        DaalError::Backend(format!("JSON error: {}", e))
    }
}

/// Result type alias using DaalError.
pub type DaalResult<T> = Result<T, DaalError>;
