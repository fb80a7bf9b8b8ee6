//! Storage Port for DAAL adapters.
//!
//! A small key-value abstraction over string (JSON) blobs with two
//! implementations:
//! - **MemoryStorage**: process-local map, used by unit tests
//! - **FileStorage**: one JSON document on disk, rewritten atomically
//!
//! `SessionStore` layers per-adapter session persistence on top of the port.

mod file;
mod keys;
mod memory;
mod session_store;
mod traits;

pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use session_store::SessionStore;
pub use traits::KeyValueStorage;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backing medium failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored value could not be (de)serialized
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Persisted document exists but is not a key-value object
    #[error("Corrupt storage file {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
