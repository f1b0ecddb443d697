//! Entity identity types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of an entity type, e.g. `Member` or `Team`.
///
/// Entity types partition both the identity map and storage: the same key
/// under two types names two unrelated entities.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(String);

impl EntityType {
    /// Creates an entity type from a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the type name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityType({})", self.0)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for EntityType {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&EntityType> for EntityType {
    fn from(ty: &EntityType) -> Self {
        ty.clone()
    }
}

/// Primary key assigned by storage.
///
/// Keys are unique per entity type, immutable once assigned, and never
/// reused by the in-memory backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(pub u64);

impl EntityKey {
    /// Creates a key from its raw value.
    #[must_use]
    pub const fn new(key: u64) -> Self {
        Self(key)
    }

    /// Returns the raw key value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityKey {
    fn from(key: u64) -> Self {
        Self(key)
    }
}

/// Identity of a persistent entity: its type and key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeyRef {
    /// The entity type.
    pub entity_type: EntityType,
    /// The primary key.
    pub key: EntityKey,
}

impl KeyRef {
    /// Creates a key reference.
    #[must_use]
    pub fn new(entity_type: impl Into<EntityType>, key: EntityKey) -> Self {
        Self {
            entity_type: entity_type.into(),
            key,
        }
    }
}

impl fmt::Display for KeyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity_type, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn key_ordering() {
        assert!(EntityKey::new(1) < EntityKey::new(2));
    }

    #[test]
    fn key_ref_display() {
        let r = KeyRef::new("Member", EntityKey::new(7));
        assert_eq!(format!("{r}"), "Member#7");
    }

    #[test]
    fn same_key_different_type_is_distinct() {
        let mut set = HashSet::new();
        set.insert(KeyRef::new("Member", EntityKey::new(1)));
        set.insert(KeyRef::new("Team", EntityKey::new(1)));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn entity_type_serializes_as_string() {
        let json = serde_json::to_string(&EntityType::new("Team")).unwrap();
        assert_eq!(json, "\"Team\"");
    }
}
