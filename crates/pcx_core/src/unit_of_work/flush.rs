//! Flush coordination.

use super::PersistenceContext;
use crate::config::FlushMode;
use crate::entity::{EntityHandle, Lazy};
use crate::error::{CoreError, CoreResult};
use crate::snapshot::{capture, diff};
use crate::types::{ContextState, FlushSummary};
use pcx_value::{KeyRef, Row};
use tracing::{debug, trace, warn};

impl PersistenceContext {
    /// Writes buffered changes to storage.
    ///
    /// References are validated before any write: every loaded reference
    /// of an entity about to be written must point at an entity that
    /// already has a key or is queued for insert ahead of it.
    ///
    /// Writes are then emitted as inserts (save order), updates of changed
    /// fields only (registration order), and deletes (reverse registration
    /// order). Inserted entities receive their keys and become managed.
    /// Flushing again without a mutation in between writes nothing.
    ///
    /// # Errors
    ///
    /// - [`CoreError::TransientReference`] if a reference cannot be written;
    ///   nothing has been written
    /// - [`CoreError::FlushFailure`] naming the first entity whose write
    ///   failed; earlier writes are not undone and the context is left in
    ///   [`ContextState::Failed`]
    pub fn flush(&mut self) -> CoreResult<FlushSummary> {
        self.ensure_writable()?;
        self.validate_references()?;

        self.state = ContextState::Flushing;
        let mut summary = FlushSummary::default();
        match self.emit_writes(&mut summary) {
            Ok(()) => {
                self.state = ContextState::Flushed;
                debug!(
                    context = %self.id,
                    inserted = summary.inserted,
                    updated = summary.updated,
                    deleted = summary.deleted,
                    "flushed"
                );
                Ok(summary)
            }
            Err(err) => {
                self.state = ContextState::Failed;
                warn!(
                    context = %self.id,
                    written = summary.total(),
                    error = %err,
                    "flush failed"
                );
                Err(err)
            }
        }
    }

    /// Flushes if the context flushes automatically and has something to
    /// write. A failed context is left alone so reads keep working.
    pub(crate) fn auto_flush(&mut self) -> CoreResult<()> {
        if self.config.flush_mode != FlushMode::Auto
            || self.state == ContextState::Failed
        {
            return Ok(());
        }
        if self.has_pending_changes()? {
            trace!(context = %self.id, "auto flush before query");
            self.flush()?;
        }
        Ok(())
    }

    fn validate_references(&self) -> CoreResult<()> {
        for (position, handle) in self.pending_inserts.iter().enumerate() {
            self.check_refs(handle, position)?;
        }
        for (key_ref, _) in self.tracked() {
            if let Some(handle) = self.identity.get(key_ref) {
                self.check_refs(&handle, self.pending_inserts.len())?;
            }
        }
        Ok(())
    }

    /// Each loaded target without a key must be queued for insert before
    /// `position`.
    fn check_refs(&self, handle: &EntityHandle, position: usize) -> CoreResult<()> {
        let entity = handle.read()?;
        for (name, lazy) in entity.refs() {
            let Lazy::Loaded(target) = lazy else {
                continue;
            };
            if lazy.target()?.is_some() {
                continue;
            }
            let queued_earlier = self.pending_inserts[..position]
                .iter()
                .any(|pending| pending.same_instance(target));
            if !queued_earlier {
                return Err(CoreError::TransientReference {
                    entity_type: entity.entity_type().clone(),
                    field: name.clone(),
                });
            }
        }
        Ok(())
    }

    fn emit_writes(&mut self, summary: &mut FlushSummary) -> CoreResult<()> {
        self.emit_inserts(summary)?;
        self.emit_updates(summary)?;
        self.emit_deletes(summary)
    }

    fn emit_inserts(&mut self, summary: &mut FlushSummary) -> CoreResult<()> {
        let inserts = std::mem::take(&mut self.pending_inserts);
        for (idx, handle) in inserts.iter().enumerate() {
            // Built now so references to earlier inserts carry their keys
            let (entity_type, row) = {
                let entity = handle.read()?;
                (entity.entity_type().clone(), entity.to_row()?)
            };
            let key = match self.storage.insert(&entity_type, &row) {
                Ok(key) => key,
                Err(source) => {
                    self.pending_inserts = inserts[idx..].to_vec();
                    return Err(CoreError::FlushFailure {
                        entity: handle.read()?.describe(),
                        source,
                    });
                }
            };

            handle.write()?.assign_key(key);
            let key_ref = KeyRef::new(&entity_type, key);
            self.identity.register(&entity_type, key, handle)?;
            let snapshot = capture(&*handle.read()?)?;
            self.snapshots.put(key_ref.clone(), snapshot);
            self.record_order(key_ref.clone());
            trace!(context = %self.id, entity = %key_ref, "inserted");
            summary.inserted += 1;
        }
        Ok(())
    }

    fn emit_updates(&mut self, summary: &mut FlushSummary) -> CoreResult<()> {
        let candidates: Vec<KeyRef> = self
            .tracked()
            .into_iter()
            .map(|(key_ref, _)| key_ref.clone())
            .collect();

        for key_ref in candidates {
            let (Some(handle), Some(snapshot)) =
                (self.identity.get(&key_ref), self.snapshots.get(&key_ref))
            else {
                continue;
            };

            let (changes, fresh) = {
                let entity = handle.read()?;
                let changed = diff(&entity, snapshot)?;
                if changed.is_empty() {
                    continue;
                }
                let changes = changed
                    .into_iter()
                    .map(|name| {
                        let value = entity.column(&name)?;
                        Ok((name, value))
                    })
                    .collect::<CoreResult<Row>>()?;
                (changes, capture(&entity)?)
            };

            if let Err(source) = self
                .storage
                .update(&key_ref.entity_type, key_ref.key, &changes)
            {
                return Err(CoreError::FlushFailure {
                    entity: key_ref.to_string(),
                    source,
                });
            }
            trace!(
                context = %self.id,
                entity = %key_ref,
                fields = changes.len(),
                "updated"
            );
            self.snapshots.put(key_ref, fresh);
            summary.updated += 1;
        }
        Ok(())
    }

    fn emit_deletes(&mut self, summary: &mut FlushSummary) -> CoreResult<()> {
        let mut removals = std::mem::take(&mut self.removals);
        removals.sort_by(|a, b| b.seq.cmp(&a.seq));

        for (idx, removal) in removals.iter().enumerate() {
            let key_ref = &removal.key_ref;
            if let Err(source) = self.storage.delete(&key_ref.entity_type, key_ref.key) {
                self.removals = removals[idx..].to_vec();
                return Err(CoreError::FlushFailure {
                    entity: key_ref.to_string(),
                    source,
                });
            }
            trace!(context = %self.id, entity = %key_ref, "deleted");
            summary.deleted += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ContextConfig;
    use crate::entity::{Entity, EntityHandle};
    use crate::error::CoreError;
    use crate::types::ContextState;
    use crate::unit_of_work::PersistenceContext;
    use pcx_storage::{RecordingBackend, StorageBackend, StorageError, WriteOp};
    use pcx_value::{EntityKey, EntityType, Row, Value};
    use std::sync::Arc;

    fn open() -> (Arc<RecordingBackend>, PersistenceContext) {
        let storage = Arc::new(RecordingBackend::in_memory());
        let ctx = PersistenceContext::new(storage.clone(), ContextConfig::default());
        (storage, ctx)
    }

    fn member(name: &str, age: i64) -> EntityHandle {
        EntityHandle::new(Entity::new("Member").with("username", name).with("age", age))
    }

    #[test]
    fn inserts_assign_keys_and_manage() {
        let (storage, mut ctx) = open();
        let m = member("m1", 10);
        ctx.save(&m).unwrap();
        assert!(m.key().is_none());

        let summary = ctx.flush().unwrap();
        assert_eq!(summary.inserted, 1);
        let key = m.key().unwrap();
        assert!(ctx.find_by_id("Member", key).unwrap().unwrap().same_instance(&m));
        assert_eq!(ctx.state(), ContextState::Flushed);
        assert_eq!(storage.read_count(), 0);
    }

    #[test]
    fn second_flush_writes_nothing() {
        let (storage, mut ctx) = open();
        ctx.save(&member("m1", 10)).unwrap();
        ctx.flush().unwrap();
        storage.reset();

        assert!(ctx.flush().unwrap().is_empty());
        assert_eq!(storage.write_count(), 0);
    }

    #[test]
    fn update_names_only_changed_field() {
        let (storage, mut ctx) = open();
        let m = member("m1", 10);
        ctx.save(&m).unwrap();
        ctx.flush().unwrap();
        storage.reset();

        m.set("age", 11);
        let summary = ctx.flush().unwrap();
        assert_eq!(summary.updated, 1);

        let ops = storage.ops();
        assert_eq!(ops.len(), 1);
        match &ops[0] {
            WriteOp::Update { changes, .. } => {
                assert_eq!(changes.len(), 1);
                assert_eq!(changes["age"], Value::Integer(11));
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn unset_field_is_written_as_null() {
        let (storage, mut ctx) = open();
        let m = member("m1", 10);
        ctx.save(&m).unwrap();
        ctx.flush().unwrap();
        storage.reset();

        m.borrow_mut().unset("age");
        ctx.flush().unwrap();
        match &storage.ops()[0] {
            WriteOp::Update { changes, .. } => assert_eq!(changes["age"], Value::Null),
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn parent_saved_first_gives_child_its_key() {
        let (storage, mut ctx) = open();
        let team = EntityHandle::new(Entity::new("Team").with("name", "teamA"));
        let m = EntityHandle::new(Entity::new("Member").with_ref("team", &team));
        ctx.save(&team).unwrap();
        ctx.save(&m).unwrap();
        ctx.flush().unwrap();

        let team_key = team.key().unwrap();
        match &storage.ops()[1] {
            WriteOp::Insert { row, .. } => {
                assert_eq!(row["team"], Value::Ref(team.key_ref().unwrap()));
                assert_eq!(row["team"].as_ref_key().unwrap().key, team_key);
            }
            other => panic!("expected insert, got {other:?}"),
        }
    }

    #[test]
    fn child_saved_before_parent_is_rejected_before_writing() {
        let (storage, mut ctx) = open();
        let team = EntityHandle::new(Entity::new("Team"));
        let m = EntityHandle::new(Entity::new("Member").with_ref("team", &team));
        ctx.save(&m).unwrap();
        ctx.save(&team).unwrap();

        let err = ctx.flush().unwrap_err();
        assert!(matches!(err, CoreError::TransientReference { ref field, .. } if field == "team"));
        assert_eq!(storage.write_count(), 0);
        assert_eq!(ctx.state(), ContextState::Open);
    }

    #[test]
    fn unsaved_reference_target_is_rejected() {
        let (storage, mut ctx) = open();
        let m = member("m1", 10);
        ctx.save(&m).unwrap();
        ctx.flush().unwrap();
        storage.reset();

        let team = EntityHandle::new(Entity::new("Team"));
        m.set_ref("team", &team);
        assert!(matches!(
            ctx.flush(),
            Err(CoreError::TransientReference { .. })
        ));
        assert_eq!(storage.write_count(), 0);
    }

    #[test]
    fn deletes_run_in_reverse_registration_order() {
        let (storage, mut ctx) = open();
        let members: Vec<_> = (0..3).map(|i| member(&format!("m{i}"), i)).collect();
        for m in &members {
            ctx.save(m).unwrap();
        }
        ctx.flush().unwrap();
        let keys: Vec<EntityKey> = members.iter().map(|m| m.key().unwrap()).collect();
        storage.reset();

        for m in &members {
            ctx.remove(m).unwrap();
        }
        assert_eq!(ctx.flush().unwrap().deleted, 3);

        let deleted: Vec<EntityKey> = storage.ops().iter().filter_map(WriteOp::key).collect();
        assert_eq!(deleted, vec![keys[2], keys[1], keys[0]]);
    }

    #[test]
    fn failed_write_aborts_and_names_entity() {
        let (storage, mut ctx) = open();
        let members: Vec<_> = (0..3).map(|i| member(&format!("m{i}"), i)).collect();
        for m in &members {
            ctx.save(m).unwrap();
        }
        storage.fail_on_write(2);

        let err = ctx.flush().unwrap_err();
        assert!(err.is_flush_failure());
        assert!(err.to_string().contains("Member#<transient>"));
        assert_eq!(storage.write_count(), 1);
        assert_eq!(ctx.state(), ContextState::Failed);

        // Failed is terminal for writes; reads and close still work
        assert!(matches!(ctx.flush(), Err(CoreError::InvalidOperation { .. })));
        assert!(matches!(
            ctx.save(&member("x", 1)),
            Err(CoreError::InvalidOperation { .. })
        ));
        let first = members[0].key().unwrap();
        assert!(ctx.find_by_id("Member", first).unwrap().is_some());
        ctx.close();
        assert!(ctx.is_closed());
    }

    #[test]
    fn failed_update_names_keyed_entity() {
        let (storage, mut ctx) = open();
        let m = member("m1", 10);
        ctx.save(&m).unwrap();
        ctx.flush().unwrap();

        // Row vanishes behind the context's back
        storage
            .inner()
            .delete(&EntityType::new("Member"), m.key().unwrap())
            .unwrap();
        m.set("age", 11);

        let err = ctx.flush().unwrap_err();
        match err {
            CoreError::FlushFailure { entity, source } => {
                assert_eq!(entity, m.key_ref().unwrap().to_string());
                assert!(matches!(source, StorageError::RowNotFound { .. }));
            }
            other => panic!("expected flush failure, got {other:?}"),
        }
    }

    #[test]
    fn read_only_entities_are_never_written() {
        let (storage, mut ctx) = open();
        let mut row = Row::new();
        row.insert("username".into(), Value::from("m1"));
        storage.inner().insert(&EntityType::new("Member"), &row).unwrap();

        let found = ctx.find_all_read_only("Member", None).unwrap();
        found[0].set("username", "changed");
        assert!(ctx.flush().unwrap().is_empty());
        assert_eq!(storage.write_count(), 0);
    }

    #[test]
    fn mutation_after_flush_reopens() {
        let (_, mut ctx) = open();
        ctx.save(&member("m1", 10)).unwrap();
        ctx.flush().unwrap();
        assert_eq!(ctx.state(), ContextState::Flushed);
        ctx.save(&member("m2", 20)).unwrap();
        assert_eq!(ctx.state(), ContextState::Open);
    }
}
