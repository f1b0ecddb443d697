//! Property-based test generators using proptest.
//!
//! Provides strategies for generating rows, member ages, predicates and
//! page requests.

use pcx_core::{PageRequest, Predicate, Row, Sort, Value};
use proptest::prelude::*;

/// Strategy for generating field names.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,11}").expect("Invalid regex")
}

/// Strategy for generating scalar values (never references).
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        any::<f64>().prop_map(Value::Float),
        prop::string::string_regex("[a-zA-Z0-9 ]{0,16}")
            .expect("Invalid regex")
            .prop_map(Value::Text),
    ]
}

/// Strategy for generating rows of scalar fields.
pub fn row_strategy() -> impl Strategy<Value = Row> {
    prop::collection::btree_map(field_name_strategy(), scalar_value_strategy(), 0..8)
}

/// Strategy for generating member ages.
pub fn ages_strategy(max_members: usize) -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(0i64..100, 0..=max_members)
}

/// Strategy for generating predicates over the `age` field.
pub fn age_predicate_strategy() -> impl Strategy<Value = Predicate> {
    let leaf = (0i64..100, 0u8..6).prop_map(|(age, op)| {
        let field = Predicate::field("age");
        match op {
            0 => field.eq(age),
            1 => field.ne(age),
            2 => field.lt(age),
            3 => field.le(age),
            4 => field.gt(age),
            _ => field.ge(age),
        }
    });
    leaf.prop_recursive(3, 8, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a.and(b)),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a.or(b)),
            inner.prop_map(|p| !p),
        ]
    })
}

/// Strategy for generating page requests, sorted by age or unsorted.
pub fn page_request_strategy() -> impl Strategy<Value = PageRequest> {
    (0u64..20, 1u64..10, 0u8..3).prop_map(|(offset, limit, sort)| {
        let request = PageRequest::new(offset, limit);
        match sort {
            0 => request,
            1 => request.with_sort(Sort::asc("age")),
            _ => request.with_sort(Sort::desc("age")),
        }
    })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to generate.
    pub cases: u32,
    /// Maximum shrinking iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn field_name_is_valid(name in field_name_strategy()) {
            let first = name.chars().next();
            prop_assert!(first.is_some_and(|c| c.is_ascii_lowercase()));
        }

        #[test]
        fn scalar_values_are_never_refs(value in scalar_value_strategy()) {
            prop_assert!(value.as_ref_key().is_none());
        }

        #[test]
        fn page_requests_have_positive_limit(request in page_request_strategy()) {
            prop_assert!(request.limit() > 0);
        }

        #[test]
        fn negation_flips_match(pred in age_predicate_strategy(), age in 0i64..100) {
            let mut row = Row::new();
            row.insert("age".into(), Value::Integer(age));
            prop_assert_ne!(pred.matches(&row), (!pred.clone()).matches(&row));
        }
    }
}
