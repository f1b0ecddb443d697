//! Shared entity handle.

use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use pcx_value::{EntityKey, EntityType, KeyRef, Value};
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

/// A shared, single-threaded handle to an entity.
///
/// Clones of a handle point at the same instance. The identity map
/// compares handles with [`EntityHandle::same_instance`], never by field
/// values: two structurally equal entities are still two instances.
///
/// Handles are `!Send`, which keeps a persistence context and everything
/// it manages on one thread.
#[derive(Clone)]
pub struct EntityHandle(Rc<RefCell<Entity>>);

impl EntityHandle {
    /// Wraps an entity in a new handle.
    #[must_use]
    pub fn new(entity: Entity) -> Self {
        Self(Rc::new(RefCell::new(entity)))
    }

    /// Returns `true` if both handles point at the same instance.
    #[must_use]
    pub fn same_instance(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Immutably borrows the entity.
    ///
    /// # Panics
    ///
    /// Panics if the entity is currently mutably borrowed.
    #[must_use]
    pub fn borrow(&self) -> Ref<'_, Entity> {
        self.0.borrow()
    }

    /// Mutably borrows the entity.
    ///
    /// # Panics
    ///
    /// Panics if the entity is currently borrowed.
    #[must_use]
    pub fn borrow_mut(&self) -> RefMut<'_, Entity> {
        self.0.borrow_mut()
    }

    pub(crate) fn read(&self) -> CoreResult<Ref<'_, Entity>> {
        self.0.try_borrow().map_err(|_| CoreError::EntityBusy)
    }

    pub(crate) fn write(&self) -> CoreResult<RefMut<'_, Entity>> {
        self.0.try_borrow_mut().map_err(|_| CoreError::EntityBusy)
    }

    /// Returns the entity type.
    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        self.borrow().entity_type().clone()
    }

    /// Returns the key, if storage has assigned one.
    #[must_use]
    pub fn key(&self) -> Option<EntityKey> {
        self.borrow().key()
    }

    /// Returns the identity, if storage has assigned a key.
    #[must_use]
    pub fn key_ref(&self) -> Option<KeyRef> {
        self.borrow().key_ref()
    }

    /// Returns a copy of a scalar field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.borrow().get(name).cloned()
    }

    /// Sets a scalar field.
    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.borrow_mut().set(name, value);
    }

    /// Points a reference at another entity.
    pub fn set_ref(&self, name: impl Into<String>, target: &EntityHandle) {
        self.borrow_mut().set_ref(name, target);
    }
}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(entity) => f.write_str(&entity.describe()),
            Err(_) => f.write_str("<borrowed>"),
        }
    }
}
