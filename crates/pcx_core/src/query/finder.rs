//! Finder operations on the persistence context.

use super::page::{Page, PageRequest, Slice};
use super::projection::Projection;
use crate::entity::{Entity, EntityHandle, Lazy};
use crate::error::{CoreError, CoreResult};
use crate::unit_of_work::PersistenceContext;
use pcx_storage::{BulkChange, Predicate, Sort, Window};
use pcx_value::{EntityKey, EntityType, KeyRef, Row, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

impl PersistenceContext {
    /// Finds an entity by key.
    ///
    /// An identity map hit returns the managed instance without touching
    /// storage. A key scheduled for deletion misses. Otherwise the row is
    /// read, registered and snapshotted.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ContextClosed`] on a closed context, or a
    /// storage error.
    pub fn find_by_id(
        &mut self,
        entity_type: impl Into<EntityType>,
        key: EntityKey,
    ) -> CoreResult<Option<EntityHandle>> {
        self.ensure_open()?;
        let entity_type = entity_type.into();
        let key_ref = KeyRef::new(&entity_type, key);
        if self.is_scheduled_for_removal(&key_ref) {
            return Ok(None);
        }
        if let Some(found) = self.identity.get(&key_ref) {
            trace!(context = %self.id, entity = %key_ref, "identity map hit");
            return Ok(Some(found));
        }
        match self.storage.read_by_id(&entity_type, key)? {
            Some(row) => self.manage_row(&entity_type, key, row, false).map(Some),
            None => Ok(None),
        }
    }

    /// Finds every entity matching `predicate`, in key order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ContextClosed`] on a closed context, an error
    /// from the automatic flush, or a storage error.
    pub fn find_all(
        &mut self,
        entity_type: impl Into<EntityType>,
        predicate: Option<&Predicate>,
    ) -> CoreResult<Vec<EntityHandle>> {
        self.find_all_in(&entity_type.into(), predicate, &Window::all(), false)
    }

    /// Finds every entity matching `predicate`, sorted.
    ///
    /// # Errors
    ///
    /// Same as [`find_all`](Self::find_all).
    pub fn find_all_sorted(
        &mut self,
        entity_type: impl Into<EntityType>,
        predicate: Option<&Predicate>,
        sort: Sort,
    ) -> CoreResult<Vec<EntityHandle>> {
        let window = Window::all().sorted(Some(sort));
        self.find_all_in(&entity_type.into(), predicate, &window, false)
    }

    /// Finds every entity matching `predicate` without snapshotting it.
    ///
    /// The entities are registered, so identity still holds, but edits to
    /// them are never flushed.
    ///
    /// # Errors
    ///
    /// Same as [`find_all`](Self::find_all).
    pub fn find_all_read_only(
        &mut self,
        entity_type: impl Into<EntityType>,
        predicate: Option<&Predicate>,
    ) -> CoreResult<Vec<EntityHandle>> {
        self.find_all_in(&entity_type.into(), predicate, &Window::all(), true)
    }

    /// Finds every entity matching `predicate` with the references named
    /// in `fetch` already loaded.
    ///
    /// Targets not yet managed are read with one batched storage call per
    /// target type, so the references cost one extra read instead of one
    /// per entity. A target that no longer exists leaves its reference
    /// unloaded.
    ///
    /// # Errors
    ///
    /// Same as [`find_all`](Self::find_all).
    pub fn find_all_fetching(
        &mut self,
        entity_type: impl Into<EntityType>,
        predicate: Option<&Predicate>,
        fetch: &[&str],
    ) -> CoreResult<Vec<EntityHandle>> {
        let entity_type = entity_type.into();
        let found = self.find_all_in(&entity_type, predicate, &Window::all(), false)?;

        let mut missing: BTreeMap<EntityType, BTreeSet<EntityKey>> = BTreeMap::new();
        for entity in &found {
            let e = entity.read()?;
            for name in fetch {
                if let Some(Lazy::Unloaded(target)) = e.reference(name) {
                    if self.identity.get(target).is_none()
                        && !self.is_scheduled_for_removal(target)
                    {
                        missing
                            .entry(target.entity_type.clone())
                            .or_default()
                            .insert(target.key);
                    }
                }
            }
        }
        for (target_type, keys) in missing {
            let keys: Vec<EntityKey> = keys.into_iter().collect();
            let rows = self.storage.read_by_ids(&target_type, &keys)?;
            let loaded = self.manage_rows(&target_type, rows, false)?;
            debug!(
                context = %self.id,
                entity_type = %target_type,
                requested = keys.len(),
                loaded = loaded.len(),
                "fetched references"
            );
        }

        for entity in &found {
            let mut e = entity.write()?;
            for name in fetch {
                let target = match e.reference(name) {
                    Some(Lazy::Unloaded(target)) => self.identity.get(target),
                    _ => None,
                };
                if let Some(target) = target {
                    e.load_ref(name, target);
                }
            }
        }
        trace!(context = %self.id, entity_type = %entity_type, fetched = ?fetch, "loaded with references");
        Ok(found)
    }

    /// Finds one page of entities matching `predicate`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the page size is zero or
    /// above the configured maximum, plus the errors of
    /// [`find_all`](Self::find_all).
    pub fn find_page(
        &mut self,
        entity_type: impl Into<EntityType>,
        predicate: Option<&Predicate>,
        request: &PageRequest,
    ) -> CoreResult<Page<EntityHandle>> {
        self.ensure_open()?;
        request.validate(self.config.max_page_size)?;
        let entity_type = entity_type.into();
        self.auto_flush()?;
        let (content, total) = self.load(&entity_type, predicate, &request.window(), false)?;
        debug!(
            context = %self.id,
            entity_type = %entity_type,
            offset = request.offset(),
            limit = request.limit(),
            total,
            "loaded page"
        );
        Ok(Page::new(content, request, total))
    }

    /// Finds one page of entities without counting the total.
    ///
    /// # Errors
    ///
    /// Same as [`find_page`](Self::find_page).
    pub fn find_slice(
        &mut self,
        entity_type: impl Into<EntityType>,
        predicate: Option<&Predicate>,
        request: &PageRequest,
    ) -> CoreResult<Slice<EntityHandle>> {
        self.ensure_open()?;
        request.validate(self.config.max_page_size)?;
        let entity_type = entity_type.into();
        self.auto_flush()?;

        // One row past the page tells whether another page follows
        let limit = request.limit();
        let window = Window::new(request.offset(), limit.saturating_add(1))
            .sorted(request.sort().cloned());
        let (rows, _) = self.storage.read_many(&entity_type, predicate, &window)?;
        let has_next = rows.len() as u64 > limit;
        let content = self.manage_rows(&entity_type, rows.into_iter().take(limit as usize), false)?;
        Ok(Slice::new(content, request, has_next))
    }

    /// Counts the entities matching `predicate`.
    ///
    /// # Errors
    ///
    /// Same as [`find_all`](Self::find_all).
    pub fn count(
        &mut self,
        entity_type: impl Into<EntityType>,
        predicate: Option<&Predicate>,
    ) -> CoreResult<u64> {
        let entity_type = entity_type.into();
        self.ensure_open()?;
        self.auto_flush()?;
        let (_, total) = self
            .storage
            .read_many(&entity_type, predicate, &Window::new(0, 0))?;
        Ok(total)
    }

    /// Finds every entity matching `predicate` and projects it.
    ///
    /// Rows already managed are projected from the managed instance; other
    /// rows are projected without being registered.
    ///
    /// # Errors
    ///
    /// Same as [`find_all`](Self::find_all), plus projection errors.
    pub fn find_all_as<P: Projection>(
        &mut self,
        entity_type: impl Into<EntityType>,
        predicate: Option<&Predicate>,
    ) -> CoreResult<Vec<P>> {
        let entity_type = entity_type.into();
        self.ensure_open()?;
        self.auto_flush()?;
        let (rows, _) = self
            .storage
            .read_many(&entity_type, predicate, &Window::all())?;
        self.project_rows(&entity_type, rows)
    }

    /// Finds one page of projections.
    ///
    /// # Errors
    ///
    /// Same as [`find_page`](Self::find_page), plus projection errors.
    pub fn find_page_as<P: Projection>(
        &mut self,
        entity_type: impl Into<EntityType>,
        predicate: Option<&Predicate>,
        request: &PageRequest,
    ) -> CoreResult<Page<P>> {
        self.ensure_open()?;
        request.validate(self.config.max_page_size)?;
        let entity_type = entity_type.into();
        self.auto_flush()?;
        let (rows, total) = self
            .storage
            .read_many(&entity_type, predicate, &request.window())?;
        let content = self.project_rows(&entity_type, rows)?;
        Ok(Page::new(content, request, total))
    }

    /// Resolves a reference of `entity` through this context.
    ///
    /// An unloaded reference is loaded through the identity map and
    /// upgraded in place, so the next access needs no context. Returns
    /// `None` if `entity` has no reference by that name.
    ///
    /// # Errors
    ///
    /// - [`CoreError::StaleReference`] if the reference is unloaded and the
    ///   context is closed
    /// - [`CoreError::EntityNotFound`] if the target no longer exists
    pub fn resolve(
        &mut self,
        entity: &EntityHandle,
        reference: &str,
    ) -> CoreResult<Option<EntityHandle>> {
        let lazy = entity.read()?.reference(reference).cloned();
        let target = match lazy {
            None => {
                self.ensure_open()?;
                return Ok(None);
            }
            Some(Lazy::Loaded(handle)) => {
                self.ensure_open()?;
                return Ok(Some(handle));
            }
            Some(Lazy::Unloaded(target)) => target,
        };
        if self.is_closed() {
            return Err(CoreError::StaleReference { target });
        }

        let loaded = self
            .find_by_id(target.entity_type.clone(), target.key)?
            .ok_or_else(|| CoreError::EntityNotFound {
                key_ref: target.clone(),
            })?;
        entity.write()?.load_ref(reference, loaded.clone());
        trace!(context = %self.id, target = %target, reference, "resolved reference");
        Ok(Some(loaded))
    }

    /// Finds the `child_type` entities whose `reference` points at
    /// `parent`.
    ///
    /// When `parent` is the managed instance for its key, the children's
    /// references to it are loaded with that instance.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotManaged`] if `parent` has no key, plus the
    /// errors of [`find_all`](Self::find_all).
    pub fn children(
        &mut self,
        parent: &EntityHandle,
        child_type: impl Into<EntityType>,
        reference: &str,
    ) -> CoreResult<Vec<EntityHandle>> {
        let child_type = child_type.into();
        self.ensure_open()?;
        self.auto_flush()?;

        let (parent_ref, label) = {
            let p = parent.read()?;
            (p.key_ref(), p.describe())
        };
        let parent_ref = parent_ref.ok_or_else(|| CoreError::not_managed(label))?;
        let predicate = Predicate::field(reference).eq(Value::Ref(parent_ref.clone()));
        let (children, _) = self.load(&child_type, Some(&predicate), &Window::all(), false)?;

        let managed = self
            .identity
            .get(&parent_ref)
            .filter(|bound| bound.same_instance(parent));
        if let Some(parent) = managed {
            for child in &children {
                let mut c = child.write()?;
                let unloaded = matches!(
                    c.reference(reference),
                    Some(Lazy::Unloaded(target)) if *target == parent_ref
                );
                if unloaded {
                    c.load_ref(reference, parent.clone());
                }
            }
        }
        Ok(children)
    }

    /// Applies `changes` in storage to every row matching `predicate`.
    ///
    /// The update bypasses the context: managed instances keep their old
    /// values until [`clear`](Self::clear) and the next load.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ContextClosed`] / [`CoreError::InvalidOperation`]
    /// on a closed or failed context, or a storage error.
    pub fn bulk_update(
        &mut self,
        entity_type: impl Into<EntityType>,
        predicate: Option<&Predicate>,
        changes: &[(String, BulkChange)],
    ) -> CoreResult<u64> {
        let entity_type = entity_type.into();
        self.ensure_writable()?;
        self.auto_flush()?;
        let affected = self.storage.bulk_update(&entity_type, predicate, changes)?;
        debug!(
            context = %self.id,
            entity_type = %entity_type,
            affected,
            "bulk update bypassed the context"
        );
        Ok(affected)
    }

    fn find_all_in(
        &mut self,
        entity_type: &EntityType,
        predicate: Option<&Predicate>,
        window: &Window,
        read_only: bool,
    ) -> CoreResult<Vec<EntityHandle>> {
        self.ensure_open()?;
        self.auto_flush()?;
        let (found, _) = self.load(entity_type, predicate, window, read_only)?;
        Ok(found)
    }

    fn load(
        &mut self,
        entity_type: &EntityType,
        predicate: Option<&Predicate>,
        window: &Window,
        read_only: bool,
    ) -> CoreResult<(Vec<EntityHandle>, u64)> {
        let (rows, total) = self.storage.read_many(entity_type, predicate, window)?;
        let found = self.manage_rows(entity_type, rows, read_only)?;
        Ok((found, total))
    }

    fn manage_rows(
        &mut self,
        entity_type: &EntityType,
        rows: impl IntoIterator<Item = (EntityKey, Row)>,
        read_only: bool,
    ) -> CoreResult<Vec<EntityHandle>> {
        let mut found = Vec::new();
        for (key, row) in rows {
            if self.is_scheduled_for_removal(&KeyRef::new(entity_type, key)) {
                continue;
            }
            found.push(self.manage_row(entity_type, key, row, read_only)?);
        }
        Ok(found)
    }

    fn project_rows<P: Projection>(
        &self,
        entity_type: &EntityType,
        rows: Vec<(EntityKey, Row)>,
    ) -> CoreResult<Vec<P>> {
        let mut projected = Vec::with_capacity(rows.len());
        for (key, row) in rows {
            let key_ref = KeyRef::new(entity_type, key);
            if self.is_scheduled_for_removal(&key_ref) {
                continue;
            }
            let view = match self.identity.get(&key_ref) {
                Some(managed) => {
                    let entity = managed.read()?;
                    P::project(&entity)?
                }
                None => P::project(&Entity::from_row(entity_type.clone(), key, row))?,
            };
            projected.push(view);
        }
        Ok(projected)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{ContextConfig, FlushMode};
    use crate::entity::{Entity, EntityHandle};
    use crate::error::CoreError;
    use crate::query::{PageRequest, Projection};
    use crate::unit_of_work::ContextFactory;
    use crate::CoreResult;
    use pcx_storage::{BulkChange, Predicate, RecordingBackend, Sort, StorageBackend};
    use pcx_value::{EntityKey, EntityType, KeyRef, Row, Value};
    use std::sync::Arc;

    fn factory(mode: FlushMode) -> (Arc<RecordingBackend>, ContextFactory) {
        let storage = Arc::new(RecordingBackend::in_memory());
        let factory =
            ContextFactory::with_config(storage.clone(), ContextConfig::new().flush_mode(mode));
        (storage, factory)
    }

    fn seed_members(storage: &RecordingBackend, ages: &[i64]) {
        let ty = EntityType::new("Member");
        for (i, age) in ages.iter().enumerate() {
            let mut row = Row::new();
            row.insert("username".into(), Value::from(format!("member{i}")));
            row.insert("age".into(), Value::Integer(*age));
            storage.inner().insert(&ty, &row).unwrap();
        }
    }

    #[test]
    fn find_by_id_hits_identity_map() {
        let (storage, factory) = factory(FlushMode::Auto);
        seed_members(&storage, &[10]);
        let mut ctx = factory.open();
        let key = storage.inner().rows(&EntityType::new("Member"))[0].0;

        let a = ctx.find_by_id("Member", key).unwrap().unwrap();
        let b = ctx.find_by_id("Member", key).unwrap().unwrap();
        assert!(a.same_instance(&b));
        assert_eq!(storage.read_count(), 1);
    }

    #[test]
    fn find_all_sees_buffered_saves_in_auto_mode() {
        let (_, factory) = factory(FlushMode::Auto);
        let mut ctx = factory.open();
        let young = EntityHandle::new(Entity::new("Member").with("age", 10));
        let old = EntityHandle::new(Entity::new("Member").with("age", 20));
        ctx.save(&young).unwrap();
        ctx.save(&old).unwrap();

        let found = ctx
            .find_all("Member", Some(&Predicate::field("age").gt(15)))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].same_instance(&old));
    }

    #[test]
    fn commit_mode_hides_buffered_saves() {
        let (_, factory) = factory(FlushMode::Commit);
        let mut ctx = factory.open();
        ctx.save(&EntityHandle::new(Entity::new("Member").with("age", 20)))
            .unwrap();
        assert!(ctx.find_all("Member", None).unwrap().is_empty());
        assert_eq!(ctx.count("Member", None).unwrap(), 0);
    }

    #[test]
    fn first_write_wins_on_reload() {
        let (storage, factory) = factory(FlushMode::Commit);
        seed_members(&storage, &[10]);
        let mut ctx = factory.open();
        let m = ctx.find_all("Member", None).unwrap().remove(0);
        m.set("age", 99);

        let again = ctx.find_all("Member", None).unwrap().remove(0);
        assert!(again.same_instance(&m));
        assert_eq!(again.get("age"), Some(Value::Integer(99)));
    }

    #[test]
    fn paging_five_rows() {
        let (storage, factory) = factory(FlushMode::Auto);
        seed_members(&storage, &[1, 2, 3, 4, 5]);
        let mut ctx = factory.open();

        let first = ctx
            .find_page("Member", None, &PageRequest::new(0, 3))
            .unwrap();
        assert_eq!(first.len(), 3);
        assert!(first.has_next());
        assert_eq!(first.total_pages(), 2);

        let second = ctx
            .find_page("Member", None, &PageRequest::new(3, 3))
            .unwrap();
        assert_eq!(second.len(), 2);
        assert!(!second.has_next());
    }

    #[test]
    fn sorted_page_breaks_ties_by_key() {
        let (storage, factory) = factory(FlushMode::Auto);
        seed_members(&storage, &[30, 10, 30, 20]);
        let mut ctx = factory.open();

        let page = ctx
            .find_page(
                "Member",
                None,
                &PageRequest::first(3).with_sort(Sort::desc("age")),
            )
            .unwrap();
        let names: Vec<_> = page
            .content()
            .iter()
            .map(|m| m.get("username").unwrap())
            .collect();
        assert_eq!(
            names,
            vec![
                Value::from("member0"),
                Value::from("member2"),
                Value::from("member3"),
            ]
        );
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let (_, factory) = factory(FlushMode::Auto);
        let mut ctx = factory.open();
        let err = ctx
            .find_page("Member", None, &PageRequest::new(0, 0))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
    }

    #[test]
    fn slice_reads_one_extra_row() {
        let (storage, factory) = factory(FlushMode::Auto);
        seed_members(&storage, &[1, 2, 3, 4, 5]);
        let mut ctx = factory.open();

        let slice = ctx
            .find_slice("Member", None, &PageRequest::of(1, 2))
            .unwrap();
        assert_eq!(slice.content().len(), 2);
        assert!(slice.has_next());

        let last = ctx
            .find_slice("Member", None, &PageRequest::of(2, 2))
            .unwrap();
        assert_eq!(last.content().len(), 1);
        assert!(!last.has_next());
    }

    #[test]
    fn count_applies_predicate() {
        let (storage, factory) = factory(FlushMode::Auto);
        seed_members(&storage, &[10, 20, 30]);
        let mut ctx = factory.open();
        let pred = Predicate::field("age").ge(20);
        assert_eq!(ctx.count("Member", Some(&pred)).unwrap(), 2);
        assert_eq!(ctx.managed_count(), 0);
    }

    #[test]
    fn resolve_loads_through_identity_map() {
        let (storage, factory) = factory(FlushMode::Auto);
        let team_key = storage
            .inner()
            .insert(&EntityType::new("Team"), &Row::new())
            .unwrap();
        let mut ctx = factory.open();
        let team = ctx.find_by_id("Team", team_key).unwrap().unwrap();

        let m = EntityHandle::new(Entity::new("Member").with_ref("team", &team));
        ctx.save(&m).unwrap();
        ctx.flush().unwrap();
        ctx.clear().unwrap();

        let m = ctx.find_by_id("Member", m.key().unwrap()).unwrap().unwrap();
        let lazy = m.borrow().reference("team").cloned().unwrap();
        assert!(matches!(lazy.get(), Err(CoreError::StaleReference { .. })));

        let team = ctx.resolve(&m, "team").unwrap().unwrap();
        assert!(team.same_instance(&ctx.find_by_id("Team", team_key).unwrap().unwrap()));
        assert!(m.borrow().reference("team").unwrap().is_loaded());
    }

    #[test]
    fn resolve_on_closed_context_is_stale() {
        let (storage, factory) = factory(FlushMode::Auto);
        let team_key = storage
            .inner()
            .insert(&EntityType::new("Team"), &Row::new())
            .unwrap();
        let mut ctx = factory.open();
        let m = EntityHandle::new(Entity::new("Member").with(
            "team",
            pcx_value::KeyRef::new("Team", team_key),
        ));
        ctx.close();
        assert!(matches!(
            ctx.resolve(&m, "team"),
            Err(CoreError::StaleReference { .. })
        ));
    }

    #[test]
    fn children_link_back_to_parent() {
        let (_, factory) = factory(FlushMode::Auto);
        let mut ctx = factory.open();
        let team = EntityHandle::new(Entity::new("Team").with("name", "teamA"));
        ctx.save(&team).unwrap();
        for name in ["m1", "m2"] {
            let m = EntityHandle::new(
                Entity::new("Member").with("username", name).with_ref("team", &team),
            );
            ctx.save(&m).unwrap();
        }
        ctx.flush().unwrap();
        ctx.clear().unwrap();

        let team = ctx.find_by_id("Team", team.key().unwrap()).unwrap().unwrap();
        let members = ctx.children(&team, "Member", "team").unwrap();
        assert_eq!(members.len(), 2);
        for m in &members {
            let linked = m.borrow().reference("team").unwrap().get().unwrap();
            assert!(linked.same_instance(&team));
        }
    }

    fn seed_teams(storage: &RecordingBackend, teams: usize, per_team: usize) -> Vec<EntityKey> {
        let mut team_keys = Vec::new();
        for t in 0..teams {
            let mut team = Row::new();
            team.insert("name".into(), Value::from(format!("team{t}")));
            let team_key = storage.inner().insert(&EntityType::new("Team"), &team).unwrap();
            for m in 0..per_team {
                let mut row = Row::new();
                row.insert("username".into(), Value::from(format!("member{t}{m}")));
                row.insert("team".into(), Value::Ref(KeyRef::new("Team", team_key)));
                storage.inner().insert(&EntityType::new("Member"), &row).unwrap();
            }
            team_keys.push(team_key);
        }
        team_keys
    }

    #[test]
    fn fetching_loads_references_in_one_read() {
        let (storage, factory) = factory(FlushMode::Auto);
        let team_keys = seed_teams(&storage, 2, 3);
        let mut ctx = factory.open();
        storage.reset();

        let members = ctx.find_all_fetching("Member", None, &["team"]).unwrap();
        assert_eq!(members.len(), 6);
        assert_eq!(storage.read_count(), 2);

        for m in &members {
            assert!(m.borrow().reference("team").unwrap().is_loaded());
        }
        let first = ctx.find_by_id("Team", team_keys[0]).unwrap().unwrap();
        let linked = members[0].borrow().reference("team").unwrap().get().unwrap();
        assert!(linked.same_instance(&first));
        assert_eq!(storage.read_count(), 2);
    }

    #[test]
    fn fetching_skips_managed_targets() {
        let (storage, factory) = factory(FlushMode::Auto);
        let team_keys = seed_teams(&storage, 1, 2);
        let mut ctx = factory.open();
        let team = ctx.find_by_id("Team", team_keys[0]).unwrap().unwrap();
        storage.reset();

        let members = ctx.find_all_fetching("Member", None, &["team"]).unwrap();
        assert_eq!(storage.read_count(), 1);
        for m in &members {
            let linked = m.borrow().reference("team").unwrap().get().unwrap();
            assert!(linked.same_instance(&team));
        }
    }

    #[test]
    fn fetching_leaves_missing_targets_unloaded() {
        let (storage, factory) = factory(FlushMode::Auto);
        let mut row = Row::new();
        row.insert("team".into(), Value::Ref(KeyRef::new("Team", EntityKey::new(999))));
        storage.inner().insert(&EntityType::new("Member"), &row).unwrap();
        let mut ctx = factory.open();

        let members = ctx.find_all_fetching("Member", None, &["team"]).unwrap();
        assert!(!members[0].borrow().reference("team").unwrap().is_loaded());
        assert!(matches!(
            ctx.resolve(&members[0], "team"),
            Err(CoreError::EntityNotFound { .. })
        ));
    }

    #[test]
    fn bulk_update_leaves_managed_instances_stale() {
        let (storage, factory) = factory(FlushMode::Auto);
        seed_members(&storage, &[10, 20, 30]);
        let mut ctx = factory.open();
        let members = ctx.find_all("Member", None).unwrap();

        let affected = ctx
            .bulk_update(
                "Member",
                Some(&Predicate::field("age").ge(20)),
                &[("age".to_string(), BulkChange::Increment(1))],
            )
            .unwrap();
        assert_eq!(affected, 2);
        assert_eq!(members[2].get("age"), Some(Value::Integer(30)));

        ctx.clear().unwrap();
        let fresh = ctx.find_all("Member", None).unwrap();
        assert_eq!(fresh[2].get("age"), Some(Value::Integer(31)));
    }

    struct Username(String);

    impl Projection for Username {
        fn project(entity: &Entity) -> CoreResult<Self> {
            entity
                .get("username")
                .and_then(Value::as_text)
                .map(|s| Username(s.to_string()))
                .ok_or_else(|| CoreError::invalid_operation("no username"))
        }
    }

    #[test]
    fn projections_do_not_register() {
        let (storage, factory) = factory(FlushMode::Auto);
        seed_members(&storage, &[10, 20]);
        let mut ctx = factory.open();

        let names: Vec<String> = ctx
            .find_all_as::<Username>("Member", None)
            .unwrap()
            .into_iter()
            .map(|u| u.0)
            .collect();
        assert_eq!(names, ["member0", "member1"]);
        assert_eq!(ctx.managed_count(), 0);

        let page = ctx
            .find_page_as::<Username>("Member", None, &PageRequest::first(1))
            .unwrap();
        assert_eq!(page.total_elements(), 2);
        assert!(page.has_next());
    }
}
