//! Storage backend trait definition.

use crate::error::StorageResult;
use crate::query::{BulkChange, Predicate, Window};
use pcx_value::{EntityKey, EntityType, Row};

/// The storage collaborator consumed by the persistence context.
///
/// Backends are **row stores**. They assign keys, persist rows, and evaluate
/// predicates. The persistence context owns identity, change tracking, and
/// write ordering; backends never see entity instances.
///
/// # Invariants
///
/// - `insert` returns a key never returned before for that entity type
/// - `read_by_id` returns exactly the row last written under that key, and
///   `read_by_ids` agrees with it key by key
/// - `update` writes only the given fields and leaves the rest untouched
/// - every operation is atomic on its own; there is no multi-operation
///   atomicity at this layer
/// - backends must be `Send + Sync` so independent contexts can share one
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing and ephemeral storage
/// - [`super::RecordingBackend`] - Records writes around another backend
pub trait StorageBackend: Send + Sync {
    /// Inserts a new row and returns the key assigned to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot store the row.
    fn insert(&self, entity_type: &EntityType, row: &Row) -> StorageResult<EntityKey>;

    /// Overwrites the given fields of an existing row.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::RowNotFound`] if no row has this key.
    fn update(&self, entity_type: &EntityType, key: EntityKey, changes: &Row) -> StorageResult<()>;

    /// Deletes a row.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::RowNotFound`] if no row has this key.
    fn delete(&self, entity_type: &EntityType, key: EntityKey) -> StorageResult<()>;

    /// Reads one row by key.
    ///
    /// Returns `Ok(None)` if the row does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error only if the backend itself fails.
    fn read_by_id(&self, entity_type: &EntityType, key: EntityKey) -> StorageResult<Option<Row>>;

    /// Reads the rows stored under `keys` in one call.
    ///
    /// Missing keys are skipped. Rows come back in ascending key order.
    ///
    /// # Errors
    ///
    /// Returns an error only if the backend itself fails.
    fn read_by_ids(
        &self,
        entity_type: &EntityType,
        keys: &[EntityKey],
    ) -> StorageResult<Vec<(EntityKey, Row)>>;

    /// Reads the rows matching `predicate` within `window`.
    ///
    /// Returns the windowed rows together with the total number of matching
    /// rows before the window was applied. Without a sort in the window,
    /// rows come back in ascending key order.
    ///
    /// # Errors
    ///
    /// Returns an error only if the backend itself fails.
    fn read_many(
        &self,
        entity_type: &EntityType,
        predicate: Option<&Predicate>,
        window: &Window,
    ) -> StorageResult<(Vec<(EntityKey, Row)>, u64)>;

    /// Applies `changes` to every row matching `predicate`.
    ///
    /// Returns the number of rows affected.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot apply the changes.
    fn bulk_update(
        &self,
        entity_type: &EntityType,
        predicate: Option<&Predicate>,
        changes: &[(String, BulkChange)],
    ) -> StorageResult<u64>;
}
