//! Demo data shared by the commands.
//!
//! Every command runs against a fresh in-memory store seeded with members
//! and teams, so runs are independent of each other.

use pcx_core::{
    ContextFactory, CoreError, CoreResult, Entity, EntityKey, EntityType, KeyRef,
    PersistenceContext, Projection, Row, Value,
};
use pcx_storage::{RecordingBackend, StorageBackend};
use serde::Serialize;
use std::sync::Arc;

pub const MEMBER: &str = "Member";
pub const TEAM: &str = "Team";

/// A recording in-memory store and the factory opening contexts over it.
pub struct Demo {
    pub storage: Arc<RecordingBackend>,
    factory: ContextFactory,
}

impl Demo {
    pub fn new() -> Self {
        let storage = Arc::new(RecordingBackend::in_memory());
        let factory = ContextFactory::new(storage.clone());
        Self { storage, factory }
    }

    pub fn open(&self) -> PersistenceContext {
        self.factory.open()
    }

    /// Seeds one member per age, named `member0`, `member1`, ...
    pub fn seed_members(&self, ages: &[i64]) -> CoreResult<Vec<EntityKey>> {
        ages.iter()
            .enumerate()
            .map(|(i, age)| self.seed(MEMBER, member_row(&format!("member{i}"), *age, None)))
            .collect()
    }

    /// Seeds a team and `size` members belonging to it.
    pub fn seed_team(&self, name: &str, size: usize) -> CoreResult<(EntityKey, Vec<EntityKey>)> {
        let mut team = Row::new();
        team.insert("name".into(), Value::from(name));
        let team_key = self.seed(TEAM, team)?;
        let members = (0..size)
            .map(|i| {
                let row = member_row(&format!("{name}-member{i}"), 20, Some(team_key));
                self.seed(MEMBER, row)
            })
            .collect::<CoreResult<_>>()?;
        Ok((team_key, members))
    }

    // Seeding goes around the write log so the commands only see their own writes.
    fn seed(&self, entity_type: &str, row: Row) -> CoreResult<EntityKey> {
        Ok(self
            .storage
            .inner()
            .insert(&EntityType::new(entity_type), &row)?)
    }
}

fn member_row(username: &str, age: i64, team: Option<EntityKey>) -> Row {
    let mut row = Row::new();
    row.insert("username".into(), Value::from(username));
    row.insert("age".into(), Value::Integer(age));
    if let Some(team) = team {
        row.insert("team".into(), Value::Ref(KeyRef::new(TEAM, team)));
    }
    row
}

/// A member as the commands print it.
#[derive(Debug, Serialize)]
pub struct MemberView {
    pub id: Option<u64>,
    pub username: String,
    pub age: Option<i64>,
}

impl Projection for MemberView {
    fn project(entity: &Entity) -> CoreResult<Self> {
        let username = entity
            .get("username")
            .and_then(Value::as_text)
            .ok_or_else(|| CoreError::invalid_operation("member without username"))?
            .to_string();
        Ok(Self {
            id: entity.key().map(EntityKey::as_u64),
            username,
            age: entity.get("age").and_then(Value::as_integer),
        })
    }
}
