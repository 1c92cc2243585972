//! Error types for the sync engine

use thiserror::Error;

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur while reordering or synchronizing the board
#[derive(Debug, Error)]
pub enum SyncError {
    /// Malformed target, rejected before anything was applied
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// Column not found
    #[error("column not found: {id}")]
    ColumnNotFound { id: String },

    /// Item not found
    #[error("item not found: {id}")]
    ItemNotFound { id: String },

    /// Column has items and cannot be deleted
    #[error("column '{id}' has {count} items and cannot be deleted")]
    ColumnNotEmpty { id: String, count: usize },

    /// Duplicate ID
    #[error("duplicate {entity} ID: {id}")]
    DuplicateId { entity: String, id: String },

    /// Another mutation touching this entity has not settled yet
    #[error("{entity} is still being updated")]
    EntityBusy { entity: String },

    /// A drag session is already active
    #[error("a drag session is already active for {active_id}")]
    DragInProgress { active_id: String },

    /// No drag session is active
    #[error("no active drag session")]
    NoActiveDrag,

    /// Remote write failed with a transient error and retries ran out
    #[error("transient network error: {message}")]
    TransientNetwork { message: String },

    /// Remote write failed with a non-retryable error
    #[error("remote write rejected: {message}")]
    TerminalRemote { message: String },

    /// Internal guard: a computed state broke an ordering invariant
    #[error("invariant violation: {message}")]
    InvariantViolation { message: String },

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl SyncError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an invariant violation error
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Create a duplicate ID error
    pub fn duplicate_id(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::DuplicateId {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork { .. })
    }
}

impl From<figment::Error> for SyncError {
    fn from(error: figment::Error) -> Self {
        Self::Config(Box::new(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::ItemNotFound { id: "abc123".into() };
        assert_eq!(err.to_string(), "item not found: abc123");
    }

    #[test]
    fn test_validation_error() {
        let err = SyncError::validation("foreign project");
        assert!(err.to_string().contains("foreign project"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retryable() {
        assert!(SyncError::TransientNetwork {
            message: "reset".into()
        }
        .is_retryable());
        assert!(!SyncError::TerminalRemote {
            message: "403".into()
        }
        .is_retryable());
        assert!(!SyncError::invariant("dup").is_retryable());
    }
}
