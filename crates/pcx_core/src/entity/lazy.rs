//! Lazy references.

use crate::entity::EntityHandle;
use crate::error::{CoreError, CoreResult};
use pcx_value::KeyRef;
use std::fmt;

/// A reference to another entity that may not be loaded yet.
///
/// Loaded entities stay `Unloaded` until resolved through an active
/// context with [`crate::PersistenceContext::resolve`]. Without a context
/// there is nothing to load from, so [`Lazy::get`] on an unloaded reference
/// fails with [`CoreError::StaleReference`].
#[derive(Clone)]
pub enum Lazy {
    /// Only the target's identity is known.
    Unloaded(KeyRef),
    /// The target instance is at hand.
    Loaded(EntityHandle),
}

impl Lazy {
    /// Returns `true` if the target instance is at hand.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self, Lazy::Loaded(_))
    }

    /// Returns the loaded target.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StaleReference`] if the reference is unloaded.
    pub fn get(&self) -> CoreResult<EntityHandle> {
        match self {
            Lazy::Loaded(handle) => Ok(handle.clone()),
            Lazy::Unloaded(target) => Err(CoreError::StaleReference {
                target: target.clone(),
            }),
        }
    }

    /// Returns the target's identity, `None` if it has no key yet.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EntityBusy`] if the target is mutably borrowed.
    pub fn target(&self) -> CoreResult<Option<KeyRef>> {
        match self {
            Lazy::Unloaded(target) => Ok(Some(target.clone())),
            Lazy::Loaded(handle) => Ok(handle.read()?.key_ref()),
        }
    }
}

impl fmt::Debug for Lazy {
    // Never walk into the target; references may form cycles.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lazy::Unloaded(target) => write!(f, "Unloaded({target})"),
            Lazy::Loaded(handle) => write!(f, "Loaded({handle:?})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use pcx_value::EntityKey;

    #[test]
    fn unloaded_get_is_stale() {
        let lazy = Lazy::Unloaded(KeyRef::new("Team", EntityKey::new(1)));
        assert!(!lazy.is_loaded());
        assert!(matches!(lazy.get(), Err(CoreError::StaleReference { .. })));
    }

    #[test]
    fn loaded_get_returns_same_instance() {
        let team = EntityHandle::new(Entity::new("Team"));
        let lazy = Lazy::Loaded(team.clone());
        assert!(lazy.get().unwrap().same_instance(&team));
        assert_eq!(lazy.target().unwrap(), None);
    }

    #[test]
    fn target_of_busy_handle() {
        let team = EntityHandle::new(Entity::new("Team"));
        let lazy = Lazy::Loaded(team.clone());
        let _guard = team.borrow_mut();
        assert!(matches!(lazy.target(), Err(CoreError::EntityBusy)));
    }
}
