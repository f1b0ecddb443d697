//! Recording wrapper for observing and failing writes.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use crate::memory::InMemoryBackend;
use crate::query::{BulkChange, Predicate, Window};
use parking_lot::Mutex;
use pcx_value::{EntityKey, EntityType, Row};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A write that reached the storage backend.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// A row was inserted.
    Insert {
        /// Entity type.
        entity_type: EntityType,
        /// Key assigned by the inner backend.
        key: EntityKey,
        /// Inserted row.
        row: Row,
    },
    /// Fields of a row were overwritten.
    Update {
        /// Entity type.
        entity_type: EntityType,
        /// Updated key.
        key: EntityKey,
        /// Changed fields only.
        changes: Row,
    },
    /// A row was deleted.
    Delete {
        /// Entity type.
        entity_type: EntityType,
        /// Deleted key.
        key: EntityKey,
    },
    /// A bulk update ran.
    BulkUpdate {
        /// Entity type.
        entity_type: EntityType,
        /// Rows affected.
        affected: u64,
    },
}

impl WriteOp {
    /// Returns the entity type written.
    #[must_use]
    pub fn entity_type(&self) -> &EntityType {
        match self {
            WriteOp::Insert { entity_type, .. }
            | WriteOp::Update { entity_type, .. }
            | WriteOp::Delete { entity_type, .. }
            | WriteOp::BulkUpdate { entity_type, .. } => entity_type,
        }
    }

    /// Returns the key written, if the operation addressed one row.
    #[must_use]
    pub fn key(&self) -> Option<EntityKey> {
        match self {
            WriteOp::Insert { key, .. } | WriteOp::Update { key, .. } | WriteOp::Delete { key, .. } => {
                Some(*key)
            }
            WriteOp::BulkUpdate { .. } => None,
        }
    }

    /// Short operation name (`insert`, `update`, `delete`, `bulk_update`).
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            WriteOp::Insert { .. } => "insert",
            WriteOp::Update { .. } => "update",
            WriteOp::Delete { .. } => "delete",
            WriteOp::BulkUpdate { .. } => "bulk_update",
        }
    }
}

/// Wraps a backend, recording every successful write and counting reads.
///
/// A failure can be armed to hit the n-th single-row write (insert, update,
/// or delete) from now on, which is how flush abort behavior is tested.
///
/// # Example
///
/// ```rust
/// use pcx_storage::{RecordingBackend, StorageBackend};
/// use pcx_value::{EntityType, Row};
///
/// let backend = RecordingBackend::in_memory();
/// let ty = EntityType::new("Member");
/// backend.insert(&ty, &Row::new()).unwrap();
///
/// backend.fail_on_write(1);
/// assert!(backend.insert(&ty, &Row::new()).is_err());
/// assert_eq!(backend.ops().len(), 1);
/// ```
#[derive(Debug)]
pub struct RecordingBackend<B = InMemoryBackend> {
    inner: B,
    ops: Mutex<Vec<WriteOp>>,
    reads: AtomicUsize,
    // Remaining single-row writes before the armed failure fires
    fail_countdown: Mutex<Option<usize>>,
}

impl RecordingBackend<InMemoryBackend> {
    /// Records around a fresh [`InMemoryBackend`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(InMemoryBackend::new())
    }
}

impl<B: StorageBackend> RecordingBackend<B> {
    /// Records around `inner`.
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            ops: Mutex::new(Vec::new()),
            reads: AtomicUsize::new(0),
            fail_countdown: Mutex::new(None),
        }
    }

    /// Returns the wrapped backend.
    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// Returns a copy of the recorded writes, oldest first.
    #[must_use]
    pub fn ops(&self) -> Vec<WriteOp> {
        self.ops.lock().clone()
    }

    /// Returns and forgets the recorded writes.
    pub fn take_ops(&self) -> Vec<WriteOp> {
        std::mem::take(&mut *self.ops.lock())
    }

    /// Returns the number of recorded writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.ops.lock().len()
    }

    /// Returns the number of read calls so far. A batched read counts once.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Forgets recorded writes and resets the read counter.
    pub fn reset(&self) {
        self.ops.lock().clear();
        self.reads.store(0, Ordering::SeqCst);
    }

    /// Arms a failure on the `nth` single-row write from now (1-based).
    ///
    /// `nth == 0` disarms.
    pub fn fail_on_write(&self, nth: usize) {
        *self.fail_countdown.lock() = (nth > 0).then_some(nth);
    }

    fn check_failure(&self, op: &'static str) -> StorageResult<()> {
        let mut countdown = self.fail_countdown.lock();
        match countdown.as_mut() {
            Some(1) => {
                *countdown = None;
                Err(StorageError::Injected { op })
            }
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn record(&self, op: WriteOp) {
        self.ops.lock().push(op);
    }
}

impl<B: StorageBackend> StorageBackend for RecordingBackend<B> {
    fn insert(&self, entity_type: &EntityType, row: &Row) -> StorageResult<EntityKey> {
        self.check_failure("insert")?;
        let key = self.inner.insert(entity_type, row)?;
        self.record(WriteOp::Insert {
            entity_type: entity_type.clone(),
            key,
            row: row.clone(),
        });
        Ok(key)
    }

    fn update(&self, entity_type: &EntityType, key: EntityKey, changes: &Row) -> StorageResult<()> {
        self.check_failure("update")?;
        self.inner.update(entity_type, key, changes)?;
        self.record(WriteOp::Update {
            entity_type: entity_type.clone(),
            key,
            changes: changes.clone(),
        });
        Ok(())
    }

    fn delete(&self, entity_type: &EntityType, key: EntityKey) -> StorageResult<()> {
        self.check_failure("delete")?;
        self.inner.delete(entity_type, key)?;
        self.record(WriteOp::Delete {
            entity_type: entity_type.clone(),
            key,
        });
        Ok(())
    }

    fn read_by_id(&self, entity_type: &EntityType, key: EntityKey) -> StorageResult<Option<Row>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_by_id(entity_type, key)
    }

    fn read_by_ids(
        &self,
        entity_type: &EntityType,
        keys: &[EntityKey],
    ) -> StorageResult<Vec<(EntityKey, Row)>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_by_ids(entity_type, keys)
    }

    fn read_many(
        &self,
        entity_type: &EntityType,
        predicate: Option<&Predicate>,
        window: &Window,
    ) -> StorageResult<(Vec<(EntityKey, Row)>, u64)> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_many(entity_type, predicate, window)
    }

    fn bulk_update(
        &self,
        entity_type: &EntityType,
        predicate: Option<&Predicate>,
        changes: &[(String, BulkChange)],
    ) -> StorageResult<u64> {
        let affected = self.inner.bulk_update(entity_type, predicate, changes)?;
        self.record(WriteOp::BulkUpdate {
            entity_type: entity_type.clone(),
            affected,
        });
        Ok(affected)
    }
}
