//! Error types for the authorization engine

use thiserror::Error;

/// Authorization engine errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Missing identifiers, malformed entities or caveat payloads
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Entity lookup miss
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Optimistic lock conflict on a versioned entity
    #[error("Concurrent modification of {entity} {id}: expected version {expected}, found {actual}")]
    Concurrency {
        entity: &'static str,
        id: String,
        expected: u64,
        actual: u64,
    },

    /// Traversal guard tripped (cycle or depth ceiling)
    #[error("Cycle or depth ceiling exceeded at role {role_id} (depth {depth})")]
    CycleOrDepthExceeded { role_id: String, depth: usize },

    /// Backing store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Cache backend failure
    #[error("Cache error: {0}")]
    Cache(String),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthzError {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// True for errors a caller may retry after re-reading the entity
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Concurrency { .. })
    }
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
