//! Entity record.

use crate::entity::{EntityHandle, Lazy};
use crate::error::{CoreError, CoreResult};
use pcx_value::{EntityKey, EntityType, KeyRef, Row, Value};
use std::collections::BTreeMap;
use std::fmt;

/// A mutable record with a type, an optional key, scalar fields, and
/// references to other entities.
///
/// The key is `None` until storage assigns one at flush. It cannot be set
/// by callers.
///
/// A reference field and a scalar field never share a name: setting one
/// replaces the other.
#[derive(Clone)]
pub struct Entity {
    entity_type: EntityType,
    key: Option<EntityKey>,
    fields: BTreeMap<String, Value>,
    refs: BTreeMap<String, Lazy>,
}

impl Entity {
    /// Creates a transient entity with no fields.
    pub fn new(entity_type: impl Into<EntityType>) -> Self {
        Self {
            entity_type: entity_type.into(),
            key: None,
            fields: BTreeMap::new(),
            refs: BTreeMap::new(),
        }
    }

    /// Sets a field, builder style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a reference, builder style.
    #[must_use]
    pub fn with_ref(mut self, name: impl Into<String>, target: &EntityHandle) -> Self {
        self.set_ref(name, target);
        self
    }

    /// Returns the entity type.
    #[must_use]
    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    /// Returns the key, if storage has assigned one.
    #[must_use]
    pub fn key(&self) -> Option<EntityKey> {
        self.key
    }

    /// Returns the identity, if storage has assigned a key.
    #[must_use]
    pub fn key_ref(&self) -> Option<KeyRef> {
        self.key.map(|key| KeyRef::new(&self.entity_type, key))
    }

    /// Returns a scalar field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Sets a scalar field.
    ///
    /// A [`Value::Ref`] is stored as an unloaded reference instead.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        match value.into() {
            Value::Ref(target) => {
                self.fields.remove(&name);
                self.refs.insert(name, Lazy::Unloaded(target));
            }
            value => {
                self.refs.remove(&name);
                self.fields.insert(name, value);
            }
        }
    }

    /// Points a reference at another entity.
    pub fn set_ref(&mut self, name: impl Into<String>, target: &EntityHandle) {
        let name = name.into();
        self.fields.remove(&name);
        self.refs.insert(name, Lazy::Loaded(target.clone()));
    }

    /// Removes a field or reference. Flushing writes it as null.
    pub fn unset(&mut self, name: &str) {
        self.fields.remove(name);
        self.refs.remove(name);
    }

    /// Returns a reference by name.
    #[must_use]
    pub fn reference(&self, name: &str) -> Option<&Lazy> {
        self.refs.get(name)
    }

    /// Returns all scalar fields.
    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Returns all references.
    #[must_use]
    pub fn refs(&self) -> &BTreeMap<String, Lazy> {
        &self.refs
    }

    pub(crate) fn assign_key(&mut self, key: EntityKey) {
        self.key = Some(key);
    }

    pub(crate) fn load_ref(&mut self, name: &str, target: EntityHandle) {
        if let Some(slot) = self.refs.get_mut(name) {
            *slot = Lazy::Loaded(target);
        }
    }

    /// Builds a persistent entity from a storage row.
    pub(crate) fn from_row(entity_type: EntityType, key: EntityKey, row: Row) -> Self {
        let mut entity = Self::new(entity_type);
        entity.key = Some(key);
        for (name, value) in row {
            entity.set(name, value);
        }
        entity
    }

    /// Converts to a storage row. References are written by key.
    pub(crate) fn to_row(&self) -> CoreResult<Row> {
        let mut row = self.fields.clone();
        for name in self.refs.keys() {
            row.insert(name.clone(), self.ref_value(name)?);
        }
        Ok(row)
    }

    /// The storage value of one field or reference; missing is null.
    pub(crate) fn column(&self, name: &str) -> CoreResult<Value> {
        if self.refs.contains_key(name) {
            return self.ref_value(name);
        }
        Ok(self.fields.get(name).cloned().unwrap_or(Value::Null))
    }

    fn ref_value(&self, name: &str) -> CoreResult<Value> {
        let target = match self.refs.get(name) {
            Some(lazy) => lazy.target()?,
            None => return Ok(Value::Null),
        };
        target
            .map(Value::Ref)
            .ok_or_else(|| CoreError::TransientReference {
                entity_type: self.entity_type.clone(),
                field: name.to_string(),
            })
    }

    /// `Member#3`, or `Member#<transient>` before a key is assigned.
    pub(crate) fn describe(&self) -> String {
        match self.key {
            Some(key) => format!("{}#{}", self.entity_type, key),
            None => format!("{}#<transient>", self.entity_type),
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("entity_type", &self.entity_type)
            .field("key", &self.key)
            .field("fields", &self.fields)
            .field("refs", &self.refs)
            .finish()
    }
}
