//! Storage error types.
//!
//! Every error variant carries enough context to diagnose the problem
//! without a debugger. Variants are grouped into four coarse kinds (see
//! [`ErrorKind`]) so callers can decide how to react without matching on
//! every backend-specific case.

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backend could not be reached or initialized.
    #[error("failed to connect to {backend} at '{addr}': {reason}")]
    Connection {
        backend: &'static str,
        addr: String,
        reason: String,
    },

    /// The addressed owner or record does not exist.
    #[error("no record found for '{key}'")]
    NotFound { key: String },

    /// A stored entity could not be encoded or decoded.
    #[error("failed to serialize entity '{key}': {reason}")]
    Serialization { key: String, reason: String },

    /// Failed to read a value from storage.
    #[error("failed to read key '{key}': {reason}")]
    Read { key: String, reason: String },

    /// Failed to write a value to storage.
    #[error("failed to write key '{key}': {reason}")]
    Write { key: String, reason: String },

    /// Failed to delete a key from storage.
    #[error("failed to delete key '{key}': {reason}")]
    Delete { key: String, reason: String },

    /// Failed to list keys with the given prefix.
    #[error("failed to list keys with prefix '{prefix}': {reason}")]
    List { prefix: String, reason: String },

    /// Failed to begin or commit a transaction or batch.
    #[error("transaction failed: {reason}")]
    Transaction { reason: String },

    /// A key cannot be encoded losslessly by the active backend.
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },
}

/// Coarse classification of a [`StorageError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Backend unreachable or failed to initialize.
    Connection,
    /// Expected absence of a record.
    NotFound,
    /// Corrupted stored state.
    Serialization,
    /// Any other native-call failure.
    Backend,
}

impl StorageError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } => ErrorKind::Connection,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Serialization { .. } => ErrorKind::Serialization,
            Self::Read { .. }
            | Self::Write { .. }
            | Self::Delete { .. }
            | Self::List { .. }
            | Self::Transaction { .. }
            | Self::InvalidKey { .. } => ErrorKind::Backend,
        }
    }

    /// Whether this error means the record is simply absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_group_variants() {
        let not_found = StorageError::NotFound { key: "p1/version".to_owned() };
        assert_eq!(not_found.kind(), ErrorKind::NotFound);
        assert!(not_found.is_not_found());

        let write = StorageError::Write {
            key: "p1".to_owned(),
            reason: "disk full".to_owned(),
        };
        assert_eq!(write.kind(), ErrorKind::Backend);
        assert!(!write.is_not_found());

        let conn = StorageError::Connection {
            backend: "redis",
            addr: "localhost:6379".to_owned(),
            reason: "refused".to_owned(),
        };
        assert_eq!(conn.kind(), ErrorKind::Connection);
        assert_eq!(
            conn.to_string(),
            "failed to connect to redis at 'localhost:6379': refused"
        );
    }
}
