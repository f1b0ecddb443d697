//! Cross-crate integration checks.
//!
//! Each check drives a persistence context against a recording backend
//! and asserts one observable guarantee. They are exercised by this
//! module's tests and can be reused against other backends.

use crate::fixtures::{member, TestContext, MEMBER};
use pcx_core::{CoreError, PageRequest, PersistenceContext, Predicate, Value};
use pcx_storage::{RecordingBackend, WriteOp};

/// Identity map guarantees.
pub mod identity {
    use super::*;

    /// A saved entity is found under its key as the same instance.
    pub fn check_saved_then_found(ctx: &mut PersistenceContext) {
        let m = member("identity", 30);
        ctx.save(&m).expect("Failed to save");
        ctx.flush().expect("Failed to flush");

        let key = m.key().expect("Flush should assign a key");
        let found = ctx
            .find_by_id(MEMBER, key)
            .expect("Failed to find")
            .expect("Entity should exist");
        assert!(found.same_instance(&m), "Lookup should return the saved instance");
    }

    /// Two lookups return one instance and read storage once.
    pub fn check_single_read(harness: &TestContext) {
        let key = harness.seed_members(&[40])[0];
        let mut ctx = harness.open();
        harness.storage.reset();

        let a = ctx.find_by_id(MEMBER, key).expect("Failed to find");
        let b = ctx.find_by_id(MEMBER, key).expect("Failed to find");
        let (a, b) = (a.expect("Entity should exist"), b.expect("Entity should exist"));
        assert!(a.same_instance(&b));
        assert_eq!(harness.storage.read_count(), 1, "Second lookup should hit the identity map");
    }

    /// After a flushed removal the key misses and storage no longer has it.
    pub fn check_removed_is_gone(harness: &TestContext) {
        let key = harness.seed_members(&[50])[0];
        let mut ctx = harness.open();
        let m = ctx
            .find_by_id(MEMBER, key)
            .expect("Failed to find")
            .expect("Entity should exist");

        ctx.remove(&m).expect("Failed to remove");
        ctx.flush().expect("Failed to flush");
        assert!(!ctx.contains(&m).expect("Context should be open"));

        harness.storage.reset();
        let again = ctx.find_by_id(MEMBER, key).expect("Failed to find");
        assert!(again.is_none());
        assert_eq!(harness.storage.read_count(), 1, "Miss should re-read storage");
    }
}

/// Flush guarantees.
pub mod flush {
    use super::*;

    /// Flushing with nothing to write emits nothing, twice.
    pub fn check_idle_flushes(ctx: &mut PersistenceContext, storage: &RecordingBackend) {
        storage.reset();
        assert!(ctx.flush().expect("Failed to flush").is_empty());
        assert!(ctx.flush().expect("Failed to flush").is_empty());
        assert_eq!(storage.write_count(), 0);
    }

    /// Changing one field emits one update naming only that field.
    pub fn check_single_field_update(ctx: &mut PersistenceContext, storage: &RecordingBackend) {
        let m = member("dirty", 10);
        ctx.save(&m).expect("Failed to save");
        ctx.flush().expect("Failed to flush");
        storage.reset();

        m.set("age", 11);
        ctx.flush().expect("Failed to flush");
        let ops = storage.ops();
        assert_eq!(ops.len(), 1);
        match &ops[0] {
            WriteOp::Update { changes, .. } => {
                assert_eq!(changes.keys().collect::<Vec<_>>(), ["age"]);
                assert_eq!(changes["age"], Value::Integer(11));
            }
            other => panic!("Expected an update, got {other:?}"),
        }
    }

    /// Inserts follow save order; deletes run in reverse.
    pub fn check_write_order(ctx: &mut PersistenceContext, storage: &RecordingBackend) {
        storage.reset();
        let members: Vec<_> = (0..4).map(|i| member(&format!("order{i}"), i)).collect();
        for m in &members {
            ctx.save(m).expect("Failed to save");
        }
        ctx.flush().expect("Failed to flush");

        let inserted: Vec<_> = storage
            .take_ops()
            .into_iter()
            .map(|op| match op {
                WriteOp::Insert { row, .. } => row["username"].clone(),
                other => panic!("Expected an insert, got {other:?}"),
            })
            .collect();
        let expected: Vec<_> = (0..4).map(|i| Value::from(format!("order{i}"))).collect();
        assert_eq!(inserted, expected);

        for m in &members {
            ctx.remove(m).expect("Failed to remove");
        }
        ctx.flush().expect("Failed to flush");
        let deleted: Vec<_> = storage.ops().iter().filter_map(WriteOp::key).collect();
        let mut expected: Vec<_> = members.iter().filter_map(|m| m.key()).collect();
        expected.reverse();
        assert_eq!(deleted, expected);
    }

    /// A failing write stops the flush and names the entity.
    pub fn check_failure_aborts(ctx: &mut PersistenceContext, storage: &RecordingBackend) {
        storage.reset();
        for i in 0..3 {
            ctx.save(&member(&format!("fail{i}"), i)).expect("Failed to save");
        }
        storage.fail_on_write(2);

        let err = ctx.flush().expect_err("Flush should fail");
        match &err {
            CoreError::FlushFailure { entity, .. } => assert!(entity.starts_with(MEMBER)),
            other => panic!("Expected a flush failure, got {other:?}"),
        }
        assert_eq!(storage.write_count(), 1, "Writes after the failure should not run");
    }
}

/// Query and paging guarantees.
pub mod paging {
    use super::*;

    /// Five rows paged by three: two pages, the second holding two rows.
    pub fn check_five_rows_by_three(harness: &TestContext) {
        harness.seed_members(&[1, 2, 3, 4, 5]);
        let mut ctx = harness.open();

        let first = ctx
            .find_page(MEMBER, None, &PageRequest::new(0, 3))
            .expect("Failed to page");
        assert_eq!(first.len(), 3);
        assert!(first.has_next());
        assert_eq!(first.total_pages(), 2);

        let second = ctx
            .find_page(MEMBER, None, &PageRequest::new(3, 3))
            .expect("Failed to page");
        assert_eq!(second.len(), 2);
        assert!(!second.has_next());
    }

    /// Buffered saves are visible to predicate queries.
    pub fn check_predicate_sees_buffered(ctx: &mut PersistenceContext) {
        let young = member("young", 10);
        let old = member("old", 20);
        ctx.save(&young).expect("Failed to save");
        ctx.save(&old).expect("Failed to save");

        let found = ctx
            .find_all(MEMBER, Some(&Predicate::field("age").gt(15)))
            .expect("Failed to query");
        assert_eq!(found.len(), 1);
        assert!(found[0].same_instance(&old));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::{
        age_predicate_strategy, ages_strategy, page_request_strategy, row_strategy,
        PropTestConfig,
    };
    use pcx_core::{Entity, EntityHandle, Row};
    use proptest::prelude::*;

    #[test]
    fn test_saved_then_found() {
        let harness = TestContext::new();
        identity::check_saved_then_found(&mut harness.open());
    }

    #[test]
    fn test_single_read() {
        identity::check_single_read(&TestContext::new());
    }

    #[test]
    fn test_removed_is_gone() {
        identity::check_removed_is_gone(&TestContext::new());
    }

    #[test]
    fn test_idle_flushes() {
        let harness = TestContext::new();
        flush::check_idle_flushes(&mut harness.open(), &harness.storage);
    }

    #[test]
    fn test_single_field_update() {
        let harness = TestContext::new();
        flush::check_single_field_update(&mut harness.open(), &harness.storage);
    }

    #[test]
    fn test_write_order() {
        let harness = TestContext::new();
        flush::check_write_order(&mut harness.open(), &harness.storage);
    }

    #[test]
    fn test_failure_aborts() {
        let harness = TestContext::new();
        flush::check_failure_aborts(&mut harness.open(), &harness.storage);
    }

    #[test]
    fn test_five_rows_by_three() {
        paging::check_five_rows_by_three(&TestContext::new());
    }

    #[test]
    fn test_predicate_sees_buffered() {
        let harness = TestContext::new();
        paging::check_predicate_sees_buffered(&mut harness.open());
    }

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn page_matches_window_arithmetic(
            ages in ages_strategy(30),
            request in page_request_strategy(),
        ) {
            let harness = TestContext::new();
            harness.seed_members(&ages);
            let mut ctx = harness.open();

            let page = ctx.find_page(MEMBER, None, &request).unwrap();
            let total = ages.len() as u64;
            let expected_len = total.saturating_sub(request.offset()).min(request.limit());
            prop_assert_eq!(page.len() as u64, expected_len);
            prop_assert_eq!(page.total_elements(), total);
            prop_assert_eq!(page.has_next(), request.offset() + request.limit() < total);
            prop_assert_eq!(page.total_pages(), total.div_ceil(request.limit()));
        }

        #[test]
        fn pages_tile_the_result(ages in ages_strategy(30), size in 1u64..7) {
            let harness = TestContext::new();
            harness.seed_members(&ages);
            let mut ctx = harness.open();

            let all = ctx.find_all(MEMBER, None).unwrap();
            let mut request = PageRequest::first(size);
            let mut paged = Vec::new();
            loop {
                let page = ctx.find_page(MEMBER, None, &request).unwrap();
                let has_next = page.has_next();
                paged.extend(page.into_content());
                if !has_next {
                    break;
                }
                request = request.next();
            }
            prop_assert_eq!(paged.len(), all.len());
            for (a, b) in paged.iter().zip(&all) {
                prop_assert!(a.same_instance(b));
            }
        }

        #[test]
        fn storage_predicate_agrees_with_row_filter(
            ages in ages_strategy(20),
            pred in age_predicate_strategy(),
        ) {
            let harness = TestContext::new();
            harness.seed_members(&ages);
            let mut ctx = harness.open();

            let expected = ages
                .iter()
                .filter(|age| {
                    let mut row = Row::new();
                    row.insert("age".into(), Value::Integer(**age));
                    pred.matches(&row)
                })
                .count() as u64;
            prop_assert_eq!(ctx.count(MEMBER, Some(&pred)).unwrap(), expected);
            prop_assert_eq!(ctx.find_all(MEMBER, Some(&pred)).unwrap().len() as u64, expected);
        }

        #[test]
        fn flush_after_flush_writes_nothing(rows in prop::collection::vec(row_strategy(), 0..6)) {
            let harness = TestContext::new();
            let mut ctx = harness.open();
            for row in &rows {
                let mut entity = Entity::new("Record");
                for (name, value) in row {
                    entity.set(name.clone(), value.clone());
                }
                ctx.save(&EntityHandle::new(entity)).unwrap();
            }
            let first = ctx.flush().unwrap();
            prop_assert_eq!(first.inserted, rows.len());

            harness.storage.reset();
            prop_assert!(ctx.flush().unwrap().is_empty());
            prop_assert_eq!(harness.storage.write_count(), 0);
        }

        #[test]
        fn reloaded_row_is_clean(row in row_strategy()) {
            let harness = TestContext::new();
            let key = harness.seed("Record", &row);
            let mut ctx = harness.open();
            let entity = ctx.find_by_id("Record", key).unwrap().unwrap();
            prop_assert!(ctx.dirty_fields(&entity).unwrap().is_empty());
        }
    }
}
