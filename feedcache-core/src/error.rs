//! Error types for feed operations

use thiserror::Error;

/// Session store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Failed to open session store at {path}: {reason}")]
    OpenFailed { path: String, reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Serialization failed for key {key}: {reason}")]
    SerializationFailed { key: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Failures talking to the backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request to {url} failed: {reason}")]
    RequestFailed { url: String, reason: String },

    #[error("Request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Invalid response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },
}

/// Input rejected before any network call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Too many {field}: selected {selected}, limit is {limit}")]
    LimitExceeded {
        field: String,
        selected: usize,
        limit: usize,
    },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Master error type for all feed client errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FeedError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl FeedError {
    /// Whether this error came from the network rather than local state.
    pub fn is_transport(&self) -> bool {
        matches!(self, FeedError::Transport(_))
    }
}

/// Result type alias for feed operations.
pub type FeedResult<T> = Result<T, FeedError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display_status() {
        let err = TransportError::Status {
            url: "http://localhost:8080/api/posts/all".to_string(),
            status: 503,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("503"));
        assert!(msg.contains("/api/posts/all"));
    }

    #[test]
    fn test_validation_error_display_limit() {
        let err = ValidationError::LimitExceeded {
            field: "genres".to_string(),
            selected: 4,
            limit: 3,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("genres"));
        assert!(msg.contains('4'));
        assert!(msg.contains('3'));
    }

    #[test]
    fn test_storage_error_display_lock_poisoned() {
        let msg = format!("{}", StorageError::LockPoisoned);
        assert!(msg.contains("lock poisoned"));
    }

    #[test]
    fn test_feed_error_from_variants() {
        let storage = FeedError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, FeedError::Storage(_)));
        assert!(!storage.is_transport());

        let transport = FeedError::from(TransportError::RequestFailed {
            url: "x".to_string(),
            reason: "refused".to_string(),
        });
        assert!(transport.is_transport());

        let validation = FeedError::from(ValidationError::RequiredFieldMissing {
            field: "content".to_string(),
        });
        assert!(matches!(validation, FeedError::Validation(_)));
    }
}
