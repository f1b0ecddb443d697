//! Error types for storage operations.

use pcx_value::{EntityKey, EntityType};
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The addressed row does not exist.
    #[error("row not found: {entity_type}#{key}")]
    RowNotFound {
        /// The entity type addressed.
        entity_type: EntityType,
        /// The key addressed.
        key: EntityKey,
    },

    /// A row with this key already exists.
    #[error("duplicate key: {entity_type}#{key}")]
    DuplicateKey {
        /// The entity type addressed.
        entity_type: EntityType,
        /// The conflicting key.
        key: EntityKey,
    },

    /// The backend failed for a reason of its own.
    #[error("backend error: {0}")]
    Backend(String),

    /// A failure injected by a test backend.
    #[error("injected failure on {op}")]
    Injected {
        /// The operation that was failed.
        op: &'static str,
    },
}

impl StorageError {
    /// Creates a row-not-found error.
    pub fn row_not_found(entity_type: &EntityType, key: EntityKey) -> Self {
        Self::RowNotFound {
            entity_type: entity_type.clone(),
            key,
        }
    }
}
