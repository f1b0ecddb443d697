//! Entity identity map.

use crate::entity::EntityHandle;
use crate::error::{CoreError, CoreResult};
use pcx_value::{EntityKey, EntityType, KeyRef};
use std::collections::HashMap;

/// Maps each (entity type, key) to the single instance managed for it.
///
/// Within one map, two lookups of the same identity return the same
/// instance. Pure in-memory structure; no I/O.
#[derive(Debug, Default)]
pub struct IdentityMap {
    entries: HashMap<KeyRef, EntityHandle>,
}

impl IdentityMap {
    /// Creates an empty identity map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds an identity to an instance.
    ///
    /// Binding the instance already bound is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateIdentity`] if a different instance is
    /// already bound to this identity.
    pub fn register(
        &mut self,
        entity_type: &EntityType,
        key: EntityKey,
        instance: &EntityHandle,
    ) -> CoreResult<()> {
        let key_ref = KeyRef::new(entity_type, key);
        match self.entries.get(&key_ref) {
            Some(bound) if bound.same_instance(instance) => Ok(()),
            Some(_) => Err(CoreError::DuplicateIdentity { key_ref }),
            None => {
                self.entries.insert(key_ref, instance.clone());
                Ok(())
            }
        }
    }

    /// Returns the instance bound to an identity.
    #[must_use]
    pub fn lookup(&self, entity_type: &EntityType, key: EntityKey) -> Option<EntityHandle> {
        self.get(&KeyRef::new(entity_type, key))
    }

    /// Returns the instance bound to an identity.
    #[must_use]
    pub fn get(&self, key_ref: &KeyRef) -> Option<EntityHandle> {
        self.entries.get(key_ref).cloned()
    }

    /// Removes a binding, returning the instance that was bound.
    pub fn evict(&mut self, entity_type: &EntityType, key: EntityKey) -> Option<EntityHandle> {
        self.entries.remove(&KeyRef::new(entity_type, key))
    }

    /// Returns `true` if this exact instance is bound to some identity.
    #[must_use]
    pub fn contains_instance(&self, instance: &EntityHandle) -> bool {
        self.entries.values().any(|bound| bound.same_instance(instance))
    }

    /// Returns the number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every binding.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
