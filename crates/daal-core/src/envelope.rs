//! The uniform `{ success, data, error }` result wrapper.

use crate::{DaalError, DaalResult};
use serde::{Deserialize, Serialize};

/// Result of every adapter operation.
///
/// Exactly one of `data`/`error` is set: `data` on success (list operations
/// always carry a list, possibly empty), `error` on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope<T> {
    pub success: bool,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ResponseEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Normalize an adapter result. This is the only place errors become text.
    pub fn from_result(result: DaalResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::err(e.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn into_data(self) -> Option<T> {
        self.data
    }

    /// Convert back into a `Result`, classifying failures as backend errors.
    pub fn into_result(self) -> DaalResult<T> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err(DaalError::Backend("successful response without data".into())),
            (false, _) => Err(DaalError::Backend(
                self.error.unwrap_or_else(|| "unknown error".to_string()),
            )),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> ResponseEnvelope<U> {
        ResponseEnvelope {
            success: self.success,
            data: self.data.map(f),
            error: self.error,
        }
    }
}
