//! Snapshot store for dirty checking.
//!
//! A snapshot is a copy of an entity's scalar fields plus the identities
//! its references point at. References are never copied by value, so a
//! snapshot never drags in the graph behind an entity.

use crate::entity::Entity;
use crate::error::CoreResult;
use pcx_value::{KeyRef, Row, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Field values of an entity at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Snapshot {
    fields: BTreeMap<String, Value>,
    refs: BTreeMap<String, Option<KeyRef>>,
}

impl Snapshot {
    /// Snapshot of a row as storage holds it.
    #[must_use]
    pub fn from_row(row: &Row) -> Self {
        let mut snapshot = Self::default();
        for (name, value) in row {
            match value {
                Value::Ref(target) => {
                    snapshot.refs.insert(name.clone(), Some(target.clone()));
                }
                other => {
                    snapshot.fields.insert(name.clone(), other.clone());
                }
            }
        }
        snapshot
    }

    /// Captured scalar fields.
    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Captured reference targets; `None` for a target without a key.
    #[must_use]
    pub fn refs(&self) -> &BTreeMap<String, Option<KeyRef>> {
        &self.refs
    }
}

/// Captures the current state of an entity.
///
/// # Errors
///
/// Returns [`crate::CoreError::EntityBusy`] if a referenced entity is
/// mutably borrowed.
pub fn capture(entity: &Entity) -> CoreResult<Snapshot> {
    let refs = entity
        .refs()
        .iter()
        .map(|(name, lazy)| Ok((name.clone(), lazy.target()?)))
        .collect::<CoreResult<_>>()?;
    Ok(Snapshot {
        fields: entity.fields().clone(),
        refs,
    })
}

/// Names of the fields and references whose value differs from the
/// snapshot. A name present on only one side counts as changed.
///
/// Floats compare bit-exact.
///
/// # Errors
///
/// Returns [`crate::CoreError::EntityBusy`] if a referenced entity is
/// mutably borrowed.
pub fn diff(entity: &Entity, snapshot: &Snapshot) -> CoreResult<BTreeSet<String>> {
    let current = capture(entity)?;
    let mut changed = BTreeSet::new();
    collect_changes(&current.fields, &snapshot.fields, &mut changed);
    collect_changes(&current.refs, &snapshot.refs, &mut changed);
    Ok(changed)
}

/// Returns `true` iff [`diff`] is non-empty.
///
/// # Errors
///
/// Same as [`diff`].
pub fn is_dirty(entity: &Entity, snapshot: &Snapshot) -> CoreResult<bool> {
    Ok(!diff(entity, snapshot)?.is_empty())
}

fn collect_changes<V: PartialEq>(
    current: &BTreeMap<String, V>,
    previous: &BTreeMap<String, V>,
    changed: &mut BTreeSet<String>,
) {
    for name in current.keys().chain(previous.keys()) {
        if current.get(name) != previous.get(name) {
            changed.insert(name.clone());
        }
    }
}

/// Snapshots of managed entities, keyed by identity.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshots: HashMap<KeyRef, Snapshot>,
}

impl SnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the latest snapshot for an identity.
    pub fn put(&mut self, key_ref: KeyRef, snapshot: Snapshot) {
        self.snapshots.insert(key_ref, snapshot);
    }

    /// Returns the latest snapshot for an identity.
    #[must_use]
    pub fn get(&self, key_ref: &KeyRef) -> Option<&Snapshot> {
        self.snapshots.get(key_ref)
    }

    /// Removes and returns the snapshot for an identity.
    pub fn take(&mut self, key_ref: &KeyRef) -> Option<Snapshot> {
        self.snapshots.remove(key_ref)
    }

    /// Returns the number of snapshots held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Returns `true` if no snapshot is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Drops every snapshot.
    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityHandle;
    use pcx_value::{EntityKey, EntityType};
    use proptest::prelude::*;

    fn member() -> Entity {
        Entity::new("Member").with("username", "AAA").with("age", 10)
    }

    #[test]
    fn fresh_snapshot_is_clean() {
        let e = member();
        let snap = capture(&e).unwrap();
        assert!(diff(&e, &snap).unwrap().is_empty());
        assert!(!is_dirty(&e, &snap).unwrap());
    }

    #[test]
    fn changed_field_is_reported_alone() {
        let mut e = member();
        let snap = capture(&e).unwrap();
        e.set("age", 11);
        let changed: Vec<_> = diff(&e, &snap).unwrap().into_iter().collect();
        assert_eq!(changed, ["age"]);
    }

    #[test]
    fn setting_equal_value_is_not_a_change() {
        let mut e = member();
        let snap = capture(&e).unwrap();
        e.set("username", "AAA");
        assert!(!is_dirty(&e, &snap).unwrap());
    }

    #[test]
    fn added_and_removed_fields_are_changes() {
        let mut e = member();
        let snap = capture(&e).unwrap();
        e.set("nickname", "a");
        e.unset("age");
        let changed: Vec<_> = diff(&e, &snap).unwrap().into_iter().collect();
        assert_eq!(changed, ["age", "nickname"]);
    }

    #[test]
    fn floats_compare_bit_exact() {
        let mut e = Entity::new("Item").with("price", 0.0);
        let snap = capture(&e).unwrap();
        e.set("price", -0.0);
        assert!(is_dirty(&e, &snap).unwrap());
    }

    #[test]
    fn references_captured_by_key_only() {
        let team = EntityHandle::new(Entity::from_row(
            EntityType::new("Team"),
            EntityKey::new(1),
            Row::new(),
        ));
        let mut e = member().with_ref("team", &team);
        let snap = capture(&e).unwrap();
        assert_eq!(
            snap.refs()["team"],
            Some(KeyRef::new("Team", EntityKey::new(1)))
        );

        // Editing the parent does not dirty the child
        team.set("name", "teamB");
        assert!(!is_dirty(&e, &snap).unwrap());

        let other = EntityHandle::new(Entity::from_row(
            EntityType::new("Team"),
            EntityKey::new(2),
            Row::new(),
        ));
        e.set_ref("team", &other);
        let changed: Vec<_> = diff(&e, &snap).unwrap().into_iter().collect();
        assert_eq!(changed, ["team"]);
    }

    #[test]
    fn loading_an_unloaded_reference_is_not_a_change() {
        let target = KeyRef::new("Team", EntityKey::new(1));
        let mut e = member().with("team", target.clone());
        let snap = capture(&e).unwrap();
        let team = EntityHandle::new(Entity::from_row(
            EntityType::new("Team"),
            EntityKey::new(1),
            Row::new(),
        ));
        e.load_ref("team", team);
        assert!(!is_dirty(&e, &snap).unwrap());
    }

    #[test]
    fn from_row_matches_capture_of_loaded_entity() {
        let mut row = Row::new();
        row.insert("age".into(), Value::from(10));
        row.insert(
            "team".into(),
            Value::Ref(KeyRef::new("Team", EntityKey::new(1))),
        );
        let e = Entity::from_row(EntityType::new("Member"), EntityKey::new(2), row.clone());
        assert_eq!(Snapshot::from_row(&row), capture(&e).unwrap());
    }

    #[test]
    fn store_put_get_take() {
        let mut store = SnapshotStore::new();
        let key = KeyRef::new("Member", EntityKey::new(1));
        store.put(key.clone(), capture(&member()).unwrap());
        assert_eq!(store.len(), 1);
        assert!(store.get(&key).is_some());
        assert!(store.take(&key).is_some());
        assert!(store.is_empty());
    }

    proptest! {
        #[test]
        fn diff_names_exactly_the_overwritten_field(
            ages in prop::collection::vec(any::<i64>(), 1..8),
            idx in any::<prop::sample::Index>(),
            replacement in any::<i64>(),
        ) {
            let mut e = Entity::new("Row");
            for (i, age) in ages.iter().enumerate() {
                e.set(format!("f{i}"), *age);
            }
            let snap = capture(&e).unwrap();
            let target = idx.index(ages.len());
            e.set(format!("f{target}"), replacement);

            let changed = diff(&e, &snap).unwrap();
            if replacement == ages[target] {
                prop_assert!(changed.is_empty());
            } else {
                prop_assert_eq!(changed.len(), 1);
                let field = format!("f{target}");
                prop_assert!(changed.contains(&field));
            }
        }
    }
}
