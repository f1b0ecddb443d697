//! Error types for pcx core.

use pcx_storage::StorageError;
use pcx_value::{EntityType, KeyRef};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in persistence context operations.
///
/// `DuplicateIdentity`, `ContextClosed`, `NotManaged`, and
/// `TransientReference` are programmer errors: they are raised before any
/// storage call is made. Storage failures during a flush surface exactly
/// once, as `FlushFailure`.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error outside of a flush.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A different instance is already bound to this identity.
    #[error("duplicate identity: {key_ref} is already bound to another instance")]
    DuplicateIdentity {
        /// The contested identity.
        key_ref: KeyRef,
    },

    /// The context was closed.
    #[error("persistence context is closed")]
    ContextClosed,

    /// A storage write failed during flush. Remaining writes were not run.
    #[error("flush failed at {entity}: {source}")]
    FlushFailure {
        /// Identity of the first failing entity, e.g. `Member#3`.
        entity: String,
        /// The storage error.
        #[source]
        source: StorageError,
    },

    /// A lazy reference was accessed without an active context.
    #[error("stale reference to {target}: no active persistence context")]
    StaleReference {
        /// The unloaded target.
        target: KeyRef,
    },

    /// The entity is not managed by this context.
    #[error("entity {entity} is not managed by this context")]
    NotManaged {
        /// Identity of the entity, or its type if it has no key.
        entity: String,
    },

    /// The entity no longer exists in storage.
    #[error("entity not found: {key_ref}")]
    EntityNotFound {
        /// The missing identity.
        key_ref: KeyRef,
    },

    /// A reference points at an entity that will not have a key in time.
    #[error("{entity_type}.{field} references an entity that is neither persistent nor saved earlier")]
    TransientReference {
        /// Type of the referencing entity.
        entity_type: EntityType,
        /// Name of the reference.
        field: String,
    },

    /// The caller holds a mutable borrow of an entity the context needs.
    #[error("entity is mutably borrowed elsewhere")]
    EntityBusy,

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a not-managed error.
    pub fn not_managed(entity: impl Into<String>) -> Self {
        Self::NotManaged {
            entity: entity.into(),
        }
    }

    /// Returns `true` for errors raised by a failed storage write in flush.
    #[must_use]
    pub fn is_flush_failure(&self) -> bool {
        matches!(self, Self::FlushFailure { .. })
    }
}
