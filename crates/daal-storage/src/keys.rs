//! Storage key constants.

/// Keys under which DAAL persists state in a [`crate::KeyValueStorage`].
pub struct StorageKeys;

impl StorageKeys {
    /// Full table snapshot of the mock backend (JSON object of arrays)
    pub const MOCK_TABLES: &'static str = "daal.mock.tables";

    /// Namespace of the mock backend's current session
    pub const MOCK_SESSION_NAMESPACE: &'static str = "daal.mock";

    /// Namespace of the REST backend's bearer session
    pub const HTTP_SESSION_NAMESPACE: &'static str = "daal.http";

    /// Namespace of the embedded platform client's session
    pub const EMBEDDED_SESSION_NAMESPACE: &'static str = "daal.embedded";

    /// Namespace of the SQL backend's session
    pub const SQL_SESSION_NAMESPACE: &'static str = "daal.sql";

    /// Suffix appended to a namespace for its session record
    pub const SESSION_SUFFIX: &'static str = "session";

    /// Build the session key for `namespace`.
    pub fn session_key(namespace: &str) -> String {
        format!("{}.{}", namespace, Self::SESSION_SUFFIX)
    }
}
