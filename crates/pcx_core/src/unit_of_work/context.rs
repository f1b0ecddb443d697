//! Persistence context lifecycle and change tracking.

use crate::config::ContextConfig;
use crate::entity::{Entity, EntityHandle};
use crate::error::{CoreError, CoreResult};
use crate::identity::IdentityMap;
use crate::query::PageRequest;
use crate::snapshot::{self, Snapshot, SnapshotStore};
use crate::types::{ContextId, ContextState, FlushSummary};
use pcx_storage::StorageBackend;
use pcx_value::{EntityKey, EntityType, KeyRef, Row};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// An entity scheduled for deletion at the next flush.
#[derive(Clone)]
pub(crate) struct Removal {
    pub(crate) key_ref: KeyRef,
    pub(crate) seq: u64,
    pub(crate) handle: EntityHandle,
    pub(crate) snapshot: Option<Snapshot>,
}

/// A session-scoped identity map plus change tracker.
///
/// A context is bounded by one unit of work: it is opened, used through
/// `&mut self`, and then committed or rolled back. It holds `Rc` handles,
/// so it is neither `Send` nor `Sync` and stays on the thread that opened
/// it.
///
/// Any operation on a closed context fails with
/// [`CoreError::ContextClosed`]. After a failed flush only reads and
/// [`close`](Self::close) remain allowed.
pub struct PersistenceContext {
    pub(crate) id: ContextId,
    pub(crate) config: ContextConfig,
    pub(crate) storage: Arc<dyn StorageBackend>,
    pub(crate) state: ContextState,
    pub(crate) identity: IdentityMap,
    pub(crate) snapshots: SnapshotStore,
    /// Transient entities in save order.
    pub(crate) pending_inserts: Vec<EntityHandle>,
    pub(crate) removals: Vec<Removal>,
    /// Registration sequence of every managed identity.
    pub(crate) order: HashMap<KeyRef, u64>,
    next_seq: u64,
}

impl PersistenceContext {
    pub(crate) fn new(storage: Arc<dyn StorageBackend>, config: ContextConfig) -> Self {
        let id = ContextId::new();
        debug!(context = %id, flush_mode = ?config.flush_mode, "opened persistence context");
        Self {
            id,
            config,
            storage,
            state: ContextState::Open,
            identity: IdentityMap::new(),
            snapshots: SnapshotStore::new(),
            pending_inserts: Vec::new(),
            removals: Vec::new(),
            order: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Returns the context ID.
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Returns the configuration the context was opened with.
    #[must_use]
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Returns `true` once the context has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == ContextState::Closed
    }

    /// First page with the configured default page size.
    #[must_use]
    pub fn default_page(&self) -> PageRequest {
        PageRequest::first(self.config.default_page_size)
    }

    /// Number of persistent entities in the identity map.
    #[must_use]
    pub fn managed_count(&self) -> usize {
        self.identity.len()
    }

    /// Number of transient entities waiting for insert.
    #[must_use]
    pub fn pending_insert_count(&self) -> usize {
        self.pending_inserts.len()
    }

    /// Number of entities scheduled for deletion.
    #[must_use]
    pub fn scheduled_removal_count(&self) -> usize {
        self.removals.len()
    }

    /// Makes an entity managed.
    ///
    /// - A transient entity is queued for insert; its key is assigned at
    ///   flush. Saving it again before the flush is a no-op.
    /// - A persistent entity already bound to this instance is a no-op.
    /// - A persistent entity scheduled for deletion is managed again and
    ///   its deletion is cancelled.
    /// - A persistent entity unknown to the context is attached: its
    ///   storage row becomes the snapshot, so the next flush writes only
    ///   what differs from storage.
    ///
    /// # Errors
    ///
    /// - [`CoreError::DuplicateIdentity`] if another instance is bound to
    ///   the entity's key
    /// - [`CoreError::EntityNotFound`] if an entity being attached no
    ///   longer exists in storage
    /// - [`CoreError::ContextClosed`] / [`CoreError::InvalidOperation`]
    ///   on a closed or failed context
    pub fn save(&mut self, entity: &EntityHandle) -> CoreResult<()> {
        self.ensure_writable()?;
        let (entity_type, key) = {
            let e = entity.read()?;
            (e.entity_type().clone(), e.key())
        };

        let Some(key) = key else {
            if !self.is_pending_insert(entity) {
                trace!(context = %self.id, entity_type = %entity_type, "queued insert");
                self.pending_inserts.push(entity.clone());
                self.touch();
            }
            return Ok(());
        };

        let key_ref = KeyRef::new(&entity_type, key);
        if let Some(bound) = self.identity.get(&key_ref) {
            return if bound.same_instance(entity) {
                Ok(())
            } else {
                Err(CoreError::DuplicateIdentity { key_ref })
            };
        }

        if let Some(pos) = self.removals.iter().position(|r| r.key_ref == key_ref) {
            if !self.removals[pos].handle.same_instance(entity) {
                return Err(CoreError::DuplicateIdentity { key_ref });
            }
            let removal = self.removals.remove(pos);
            self.identity.register(&entity_type, key, entity)?;
            if let Some(snapshot) = removal.snapshot {
                self.snapshots.put(key_ref.clone(), snapshot);
            }
            self.order.insert(key_ref.clone(), removal.seq);
            trace!(context = %self.id, entity = %key_ref, "cancelled scheduled removal");
            self.touch();
            return Ok(());
        }

        let row = self
            .storage
            .read_by_id(&entity_type, key)?
            .ok_or_else(|| CoreError::EntityNotFound {
                key_ref: key_ref.clone(),
            })?;
        self.identity.register(&entity_type, key, entity)?;
        self.snapshots.put(key_ref.clone(), Snapshot::from_row(&row));
        self.record_order(key_ref.clone());
        debug!(context = %self.id, entity = %key_ref, "attached entity");
        self.touch();
        Ok(())
    }

    /// Schedules a managed entity for deletion.
    ///
    /// The entity is evicted from the identity map at once, so lookups
    /// miss; the delete itself is deferred to the next flush. A transient
    /// entity that was only queued for insert is dropped from the queue
    /// and never written.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotManaged`] if this instance is not managed by
    /// the context.
    pub fn remove(&mut self, entity: &EntityHandle) -> CoreResult<()> {
        self.ensure_writable()?;
        let (entity_type, key, label) = {
            let e = entity.read()?;
            (e.entity_type().clone(), e.key(), e.describe())
        };

        let Some(key) = key else {
            let pos = self
                .pending_position(entity)
                .ok_or_else(|| CoreError::not_managed(label))?;
            self.pending_inserts.remove(pos);
            trace!(context = %self.id, entity_type = %entity_type, "dropped queued insert");
            self.touch();
            return Ok(());
        };

        let key_ref = KeyRef::new(&entity_type, key);
        match self.identity.get(&key_ref) {
            Some(bound) if bound.same_instance(entity) => {}
            _ => return Err(CoreError::not_managed(label)),
        }

        self.identity.evict(&entity_type, key);
        let snapshot = self.snapshots.take(&key_ref);
        let seq = match self.order.remove(&key_ref) {
            Some(seq) => seq,
            None => self.bump_seq(),
        };
        trace!(context = %self.id, entity = %key_ref, "scheduled removal");
        self.removals.push(Removal {
            key_ref,
            seq,
            handle: entity.clone(),
            snapshot,
        });
        self.touch();
        Ok(())
    }

    /// Stops tracking one entity without writing it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotManaged`] if this instance is not managed by
    /// the context.
    pub fn detach(&mut self, entity: &EntityHandle) -> CoreResult<()> {
        self.ensure_open()?;
        let (entity_type, key, label) = {
            let e = entity.read()?;
            (e.entity_type().clone(), e.key(), e.describe())
        };

        match key {
            None => {
                let pos = self
                    .pending_position(entity)
                    .ok_or_else(|| CoreError::not_managed(label.clone()))?;
                self.pending_inserts.remove(pos);
            }
            Some(key) => {
                let key_ref = KeyRef::new(&entity_type, key);
                match self.identity.get(&key_ref) {
                    Some(bound) if bound.same_instance(entity) => {}
                    _ => return Err(CoreError::not_managed(label)),
                }
                self.identity.evict(&entity_type, key);
                self.snapshots.take(&key_ref);
                self.order.remove(&key_ref);
            }
        }
        trace!(context = %self.id, entity = %label, "detached");
        Ok(())
    }

    /// Returns `true` if this exact instance is managed or queued for
    /// insert.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EntityBusy`] if the entity is mutably borrowed.
    pub fn contains(&self, entity: &EntityHandle) -> CoreResult<bool> {
        self.ensure_open()?;
        let key_ref = entity.read()?.key_ref();
        Ok(match key_ref {
            Some(key_ref) => self
                .identity
                .get(&key_ref)
                .is_some_and(|bound| bound.same_instance(entity)),
            None => self.is_pending_insert(entity),
        })
    }

    /// Names of the fields of a managed entity that differ from its
    /// snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotManaged`] if the entity is not managed or
    /// was loaded read-only.
    pub fn dirty_fields(&self, entity: &EntityHandle) -> CoreResult<BTreeSet<String>> {
        self.ensure_open()?;
        let e = entity.read()?;
        let snapshot = e
            .key_ref()
            .filter(|key_ref| {
                self.identity
                    .get(key_ref)
                    .is_some_and(|bound| bound.same_instance(entity))
            })
            .and_then(|key_ref| self.snapshots.get(&key_ref))
            .ok_or_else(|| CoreError::not_managed(e.describe()))?;
        snapshot::diff(&e, snapshot)
    }

    /// Returns `true` if a flush would write anything.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EntityBusy`] if a managed entity is mutably
    /// borrowed.
    pub fn has_pending_changes(&self) -> CoreResult<bool> {
        self.ensure_open()?;
        if !self.pending_inserts.is_empty() || !self.removals.is_empty() {
            return Ok(true);
        }
        for (key_ref, snapshot) in self.tracked() {
            if let Some(handle) = self.identity.get(key_ref) {
                if snapshot::is_dirty(&*handle.read()?, snapshot)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Discards every managed entity, snapshot, queued insert and scheduled
    /// removal without writing anything.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ContextClosed`] / [`CoreError::InvalidOperation`]
    /// on a closed or failed context.
    pub fn clear(&mut self) -> CoreResult<()> {
        self.ensure_writable()?;
        debug!(
            context = %self.id,
            managed = self.identity.len(),
            pending_inserts = self.pending_inserts.len(),
            removals = self.removals.len(),
            "cleared persistence context"
        );
        self.discard();
        Ok(())
    }

    /// Closes the context, discarding all tracking state. Idempotent.
    ///
    /// Entities handed out by the context stay usable as detached values;
    /// their unloaded references can no longer be resolved.
    pub fn close(&mut self) {
        if self.state == ContextState::Closed {
            return;
        }
        self.discard();
        self.state = ContextState::Closed;
        debug!(context = %self.id, "closed persistence context");
    }

    /// Flushes, then closes.
    ///
    /// On a flush error the context is left open in the failed state so
    /// the caller can inspect it before closing.
    ///
    /// # Errors
    ///
    /// Returns any error from [`flush`](Self::flush).
    pub fn commit(&mut self) -> CoreResult<FlushSummary> {
        let summary = self.flush()?;
        self.close();
        Ok(summary)
    }

    /// Closes without flushing.
    pub fn rollback(&mut self) {
        if self.state != ContextState::Closed {
            debug!(
                context = %self.id,
                pending_inserts = self.pending_inserts.len(),
                removals = self.removals.len(),
                "rolled back persistence context"
            );
        }
        self.close();
    }

    // ---- internals shared with flush and query ----

    pub(crate) fn ensure_open(&self) -> CoreResult<()> {
        if self.state == ContextState::Closed {
            Err(CoreError::ContextClosed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn ensure_writable(&self) -> CoreResult<()> {
        self.ensure_open()?;
        if self.state == ContextState::Failed {
            return Err(CoreError::invalid_operation(
                "a previous flush failed; close the persistence context",
            ));
        }
        Ok(())
    }

    /// Moves a flushed context back to open after a mutation.
    pub(crate) fn touch(&mut self) {
        if self.state == ContextState::Flushed {
            self.state = ContextState::Open;
        }
    }

    pub(crate) fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    pub(crate) fn record_order(&mut self, key_ref: KeyRef) {
        let seq = self.bump_seq();
        self.order.insert(key_ref, seq);
    }

    pub(crate) fn is_scheduled_for_removal(&self, key_ref: &KeyRef) -> bool {
        self.removals.iter().any(|r| &r.key_ref == key_ref)
    }

    /// Managed identities that carry a snapshot, in registration order.
    pub(crate) fn tracked(&self) -> Vec<(&KeyRef, &Snapshot)> {
        let mut tracked: Vec<_> = self
            .order
            .iter()
            .filter_map(|(key_ref, seq)| {
                self.snapshots
                    .get(key_ref)
                    .map(|snapshot| (*seq, key_ref, snapshot))
            })
            .collect();
        tracked.sort_by_key(|(seq, _, _)| *seq);
        tracked
            .into_iter()
            .map(|(_, key_ref, snapshot)| (key_ref, snapshot))
            .collect()
    }

    /// Routes a storage row through the identity map.
    ///
    /// An instance already managed for the key wins and the row is
    /// discarded. Otherwise a new instance is registered, with a snapshot
    /// unless `read_only`.
    pub(crate) fn manage_row(
        &mut self,
        entity_type: &EntityType,
        key: EntityKey,
        row: Row,
        read_only: bool,
    ) -> CoreResult<EntityHandle> {
        if let Some(existing) = self.identity.lookup(entity_type, key) {
            trace!(context = %self.id, entity_type = %entity_type, key = %key, "identity map hit");
            return Ok(existing);
        }
        let key_ref = KeyRef::new(entity_type, key);
        let snapshot = (!read_only).then(|| Snapshot::from_row(&row));
        let handle = EntityHandle::new(Entity::from_row(entity_type.clone(), key, row));
        self.identity.register(entity_type, key, &handle)?;
        if let Some(snapshot) = snapshot {
            self.snapshots.put(key_ref.clone(), snapshot);
        }
        trace!(context = %self.id, entity = %key_ref, read_only, "loaded entity");
        self.record_order(key_ref);
        Ok(handle)
    }

    fn is_pending_insert(&self, entity: &EntityHandle) -> bool {
        self.pending_position(entity).is_some()
    }

    fn pending_position(&self, entity: &EntityHandle) -> Option<usize> {
        self.pending_inserts
            .iter()
            .position(|pending| pending.same_instance(entity))
    }

    fn discard(&mut self) {
        self.identity.clear();
        self.snapshots.clear();
        self.pending_inserts.clear();
        self.removals.clear();
        self.order.clear();
    }
}

impl fmt::Debug for PersistenceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceContext")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("managed", &self.identity.len())
            .field("pending_inserts", &self.pending_inserts.len())
            .field("removals", &self.removals.len())
            .finish_non_exhaustive()
    }
}
