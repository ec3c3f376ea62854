use thiserror::Error;

/// Errors from object and repository stores (used by port definitions in conductor-core).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    /// Optimistic-concurrency precondition failed; re-read and retry.
    #[error("conflict on {key}: expected resource version {expected}, found {actual}")]
    Conflict {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("object already exists: {0}")]
    AlreadyExists(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Conflicts and backend hiccups clear up on a later pass.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict { .. } | StoreError::Backend(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}
