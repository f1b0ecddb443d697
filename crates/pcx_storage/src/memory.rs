//! In-memory storage backend for testing.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use crate::query::{BulkChange, Predicate, Window};
use parking_lot::RwLock;
use pcx_value::{EntityKey, EntityType, Row};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

type Table = BTreeMap<EntityKey, Row>;

/// An in-memory storage backend.
///
/// This backend stores all rows in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Demonstrations that don't need persistence
///
/// Keys come from one backend-wide sequence starting at 1, so keys are
/// never reused, even across entity types.
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared by several persistence
/// contexts at once.
///
/// # Example
///
/// ```rust
/// use pcx_storage::{InMemoryBackend, StorageBackend};
/// use pcx_value::{EntityType, Row};
///
/// let backend = InMemoryBackend::new();
/// let team = EntityType::new("Team");
/// let key = backend.insert(&team, &Row::new()).unwrap();
/// assert_eq!(key.as_u64(), 1);
/// assert_eq!(backend.row_count(&team), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    tables: RwLock<HashMap<EntityType, Table>>,
    last_key: AtomicU64,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of rows stored for an entity type.
    #[must_use]
    pub fn row_count(&self, entity_type: &EntityType) -> usize {
        self.tables.read().get(entity_type).map_or(0, BTreeMap::len)
    }

    /// Returns a copy of every row of an entity type, in key order.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn rows(&self, entity_type: &EntityType) -> Vec<(EntityKey, Row)> {
        self.tables
            .read()
            .get(entity_type)
            .map(|table| table.iter().map(|(k, r)| (*k, r.clone())).collect())
            .unwrap_or_default()
    }

    /// Removes every row. The key sequence is not reset.
    pub fn clear(&self) {
        self.tables.write().clear();
    }
}

impl StorageBackend for InMemoryBackend {
    fn insert(&self, entity_type: &EntityType, row: &Row) -> StorageResult<EntityKey> {
        let key = EntityKey::new(self.last_key.fetch_add(1, Ordering::SeqCst) + 1);
        let mut tables = self.tables.write();
        let table = tables.entry(entity_type.clone()).or_default();
        if table.contains_key(&key) {
            return Err(StorageError::DuplicateKey {
                entity_type: entity_type.clone(),
                key,
            });
        }
        table.insert(key, row.clone());
        Ok(key)
    }

    fn update(&self, entity_type: &EntityType, key: EntityKey, changes: &Row) -> StorageResult<()> {
        let mut tables = self.tables.write();
        let row = tables
            .get_mut(entity_type)
            .and_then(|table| table.get_mut(&key))
            .ok_or_else(|| StorageError::row_not_found(entity_type, key))?;
        for (field, value) in changes {
            row.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    fn delete(&self, entity_type: &EntityType, key: EntityKey) -> StorageResult<()> {
        self.tables
            .write()
            .get_mut(entity_type)
            .and_then(|table| table.remove(&key))
            .map(|_| ())
            .ok_or_else(|| StorageError::row_not_found(entity_type, key))
    }

    fn read_by_id(&self, entity_type: &EntityType, key: EntityKey) -> StorageResult<Option<Row>> {
        Ok(self
            .tables
            .read()
            .get(entity_type)
            .and_then(|table| table.get(&key))
            .cloned())
    }

    fn read_by_ids(
        &self,
        entity_type: &EntityType,
        keys: &[EntityKey],
    ) -> StorageResult<Vec<(EntityKey, Row)>> {
        let tables = self.tables.read();
        let Some(table) = tables.get(entity_type) else {
            return Ok(Vec::new());
        };
        let wanted: BTreeSet<&EntityKey> = keys.iter().collect();
        Ok(wanted
            .into_iter()
            .filter_map(|key| table.get(key).map(|row| (*key, row.clone())))
            .collect())
    }

    fn read_many(
        &self,
        entity_type: &EntityType,
        predicate: Option<&Predicate>,
        window: &Window,
    ) -> StorageResult<(Vec<(EntityKey, Row)>, u64)> {
        let tables = self.tables.read();
        let Some(table) = tables.get(entity_type) else {
            return Ok((Vec::new(), 0));
        };

        let mut matching: Vec<(&EntityKey, &Row)> = table
            .iter()
            .filter(|(_, row)| predicate.map_or(true, |p| p.matches(row)))
            .collect();
        let total = matching.len() as u64;

        // Stable sort keeps key order among equal sort values
        if let Some(sort) = &window.sort {
            matching.sort_by(|(_, a), (_, b)| sort.compare_rows(a, b));
        }

        let offset = usize::try_from(window.offset).unwrap_or(usize::MAX);
        let limit = window
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        let rows = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(key, row)| (*key, row.clone()))
            .collect();

        Ok((rows, total))
    }

    fn bulk_update(
        &self,
        entity_type: &EntityType,
        predicate: Option<&Predicate>,
        changes: &[(String, BulkChange)],
    ) -> StorageResult<u64> {
        let mut tables = self.tables.write();
        let Some(table) = tables.get_mut(entity_type) else {
            return Ok(0);
        };

        let mut affected = 0;
        for row in table.values_mut() {
            if !predicate.map_or(true, |p| p.matches(row)) {
                continue;
            }
            for (field, change) in changes {
                if let Some(value) = change.apply(row.get(field)) {
                    row.insert(field.clone(), value);
                }
            }
            affected += 1;
        }
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Sort;
    use pcx_value::Value;

    fn member(username: &str, age: i64) -> Row {
        let mut row = Row::new();
        row.insert("username".into(), Value::from(username));
        row.insert("age".into(), Value::from(age));
        row
    }

    fn seeded(count: i64) -> (InMemoryBackend, EntityType) {
        let backend = InMemoryBackend::new();
        let ty = EntityType::new("Member");
        for i in 1..=count {
            backend
                .insert(&ty, &member(&format!("member{i}"), 10))
                .unwrap();
        }
        (backend, ty)
    }

    #[test]
    fn memory_new_is_empty() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.row_count(&EntityType::new("Member")), 0);
    }

    #[test]
    fn memory_insert_assigns_increasing_keys() {
        let backend = InMemoryBackend::new();
        let member = EntityType::new("Member");
        let team = EntityType::new("Team");

        let k1 = backend.insert(&member, &Row::new()).unwrap();
        let k2 = backend.insert(&team, &Row::new()).unwrap();
        let k3 = backend.insert(&member, &Row::new()).unwrap();

        assert_eq!(k1, EntityKey::new(1));
        assert_eq!(k2, EntityKey::new(2));
        assert_eq!(k3, EntityKey::new(3));
    }

    #[test]
    fn memory_read_by_id() {
        let (backend, ty) = seeded(2);
        let row = backend.read_by_id(&ty, EntityKey::new(2)).unwrap().unwrap();
        assert_eq!(row["username"], Value::from("member2"));
        assert!(backend.read_by_id(&ty, EntityKey::new(9)).unwrap().is_none());
        assert!(backend
            .read_by_id(&EntityType::new("Team"), EntityKey::new(1))
            .unwrap()
            .is_none());
    }

    #[test]
    fn memory_update_touches_only_given_fields() {
        let (backend, ty) = seeded(1);
        let mut changes = Row::new();
        changes.insert("age".into(), Value::from(11));
        backend.update(&ty, EntityKey::new(1), &changes).unwrap();

        let row = backend.read_by_id(&ty, EntityKey::new(1)).unwrap().unwrap();
        assert_eq!(row["age"], Value::from(11));
        assert_eq!(row["username"], Value::from("member1"));
    }

    #[test]
    fn memory_update_missing_row_fails() {
        let (backend, ty) = seeded(1);
        let result = backend.update(&ty, EntityKey::new(5), &Row::new());
        assert!(matches!(result, Err(StorageError::RowNotFound { .. })));
    }

    #[test]
    fn memory_delete() {
        let (backend, ty) = seeded(2);
        backend.delete(&ty, EntityKey::new(1)).unwrap();
        assert_eq!(backend.row_count(&ty), 1);

        let again = backend.delete(&ty, EntityKey::new(1));
        assert!(matches!(again, Err(StorageError::RowNotFound { .. })));
    }

    #[test]
    fn memory_read_by_ids_skips_missing() {
        let (backend, ty) = seeded(3);
        let keys = [EntityKey::new(3), EntityKey::new(9), EntityKey::new(1), EntityKey::new(3)];
        let rows = backend.read_by_ids(&ty, &keys).unwrap();
        let found: Vec<_> = rows.iter().map(|(k, _)| *k).collect();
        assert_eq!(found, [EntityKey::new(1), EntityKey::new(3)]);
        assert_eq!(rows[1].1["username"], Value::from("member3"));
        assert!(backend
            .read_by_ids(&EntityType::new("Team"), &keys)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn memory_read_many_windows() {
        let (backend, ty) = seeded(5);

        let (rows, total) = backend.read_many(&ty, None, &Window::new(0, 3)).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(total, 5);

        let (rows, total) = backend.read_many(&ty, None, &Window::new(3, 3)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(total, 5);

        let (rows, _) = backend.read_many(&ty, None, &Window::new(10, 3)).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn memory_read_many_sorted() {
        let (backend, ty) = seeded(5);
        let window = Window::new(0, 3).sorted(Some(Sort::desc("username")));
        let (rows, _) = backend.read_many(&ty, None, &window).unwrap();
        let names: Vec<_> = rows
            .iter()
            .map(|(_, r)| r["username"].as_text().unwrap().to_string())
            .collect();
        assert_eq!(names, ["member5", "member4", "member3"]);
    }

    #[test]
    fn memory_sorted_pages_with_nan() {
        let backend = InMemoryBackend::new();
        let ty = EntityType::new("Item");
        for i in 0..30 {
            let mut row = Row::new();
            let price = if i % 3 == 0 { f64::NAN } else { f64::from(30 - i) };
            row.insert("price".into(), Value::Float(price));
            backend.insert(&ty, &row).unwrap();
        }

        let mut prices = Vec::new();
        for page in 0..3 {
            let window = Window::new(page * 10, 10).sorted(Some(Sort::asc("price")));
            let (rows, total) = backend.read_many(&ty, None, &window).unwrap();
            assert_eq!(total, 30);
            prices.extend(rows.iter().map(|(_, r)| match r["price"] {
                Value::Float(p) => p,
                _ => unreachable!(),
            }));
        }
        let finite: Vec<f64> = prices.iter().copied().take(20).collect();
        assert!(finite.windows(2).all(|w| w[0] < w[1]));
        assert!(prices[20..].iter().all(|p| p.is_nan()));
    }

    #[test]
    fn memory_read_many_filtered() {
        let backend = InMemoryBackend::new();
        let ty = EntityType::new("Member");
        backend.insert(&ty, &member("AAA", 10)).unwrap();
        backend.insert(&ty, &member("AAA", 20)).unwrap();

        let p = Predicate::field("age").gt(15);
        let (rows, total) = backend.read_many(&ty, Some(&p), &Window::all()).unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].1["age"], Value::from(20));
    }

    #[test]
    fn memory_bulk_update() {
        let backend = InMemoryBackend::new();
        let ty = EntityType::new("Member");
        for (i, age) in [10, 19, 20, 21, 33].into_iter().enumerate() {
            backend
                .insert(&ty, &member(&format!("member{}", i + 1), age))
                .unwrap();
        }

        let affected = backend
            .bulk_update(
                &ty,
                Some(&Predicate::field("age").ge(20)),
                &[("age".to_string(), BulkChange::Increment(1))],
            )
            .unwrap();
        assert_eq!(affected, 3);

        let row = backend.read_by_id(&ty, EntityKey::new(5)).unwrap().unwrap();
        assert_eq!(row["age"], Value::from(34));
        let row = backend.read_by_id(&ty, EntityKey::new(2)).unwrap().unwrap();
        assert_eq!(row["age"], Value::from(19));
    }

    #[test]
    fn memory_is_shareable_across_threads() {
        let backend = std::sync::Arc::new(InMemoryBackend::new());
        let ty = EntityType::new("Member");
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let backend = std::sync::Arc::clone(&backend);
                let ty = ty.clone();
                std::thread::spawn(move || backend.insert(&ty, &Row::new()).unwrap())
            })
            .collect();
        let mut keys: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 4);
    }
}
