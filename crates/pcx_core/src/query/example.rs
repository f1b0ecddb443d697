//! Query by example.

use crate::entity::Entity;
use crate::error::CoreResult;
use pcx_storage::Predicate;
use pcx_value::Value;

/// Builds a predicate from a probe entity.
pub trait FromExample: Sized {
    /// Matches rows equal to every non-null field and keyed reference of
    /// `probe`, except the names in `ignored`.
    ///
    /// A probe with nothing to match yields a predicate that matches every
    /// row.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::EntityBusy`] if a referenced entity is
    /// mutably borrowed.
    fn from_example(probe: &Entity, ignored: &[&str]) -> CoreResult<Self>;
}

impl FromExample for Predicate {
    fn from_example(probe: &Entity, ignored: &[&str]) -> CoreResult<Self> {
        let mut clauses = Vec::new();
        for (name, value) in probe.fields() {
            if value.is_null() || ignored.contains(&name.as_str()) {
                continue;
            }
            clauses.push(Predicate::field(name.as_str()).eq(value.clone()));
        }
        for (name, lazy) in probe.refs() {
            if ignored.contains(&name.as_str()) {
                continue;
            }
            if let Some(target) = lazy.target()? {
                clauses.push(Predicate::field(name.as_str()).eq(Value::Ref(target)));
            }
        }
        Ok(Predicate::all(clauses))
    }
}
