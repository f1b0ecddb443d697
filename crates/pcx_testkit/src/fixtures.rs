//! Test fixtures and context helpers.
//!
//! Provides the Member/Team domain used across the tests, DTO projections
//! of it, and a harness that opens contexts over a recording backend.

use pcx_core::{
    ContextConfig, ContextFactory, CoreError, CoreResult, Entity, EntityHandle, EntityKey,
    EntityType, KeyRef, PersistenceContext, Projection, Row, Value,
};
use pcx_storage::{RecordingBackend, StorageBackend};
use serde::Serialize;
use std::sync::Arc;

/// Entity type of members.
pub const MEMBER: &str = "Member";
/// Entity type of teams.
pub const TEAM: &str = "Team";

/// A context factory over a recording in-memory backend.
pub struct TestContext {
    /// The shared storage.
    pub storage: Arc<RecordingBackend>,
    /// Factory opening contexts over `storage`.
    pub factory: ContextFactory,
}

impl TestContext {
    /// Creates a harness with the default configuration.
    pub fn new() -> Self {
        Self::with_config(ContextConfig::default())
    }

    /// Creates a harness with a custom configuration.
    pub fn with_config(config: ContextConfig) -> Self {
        let storage = Arc::new(RecordingBackend::in_memory());
        let factory = ContextFactory::with_config(storage.clone(), config);
        Self { storage, factory }
    }

    /// Opens a new context.
    pub fn open(&self) -> PersistenceContext {
        self.factory.open()
    }

    /// Writes a row straight into storage, bypassing any context and the
    /// write log.
    pub fn seed(&self, entity_type: &str, row: &Row) -> EntityKey {
        self.storage
            .inner()
            .insert(&EntityType::new(entity_type), row)
            .expect("Failed to seed row")
    }

    /// Seeds one member per age, named `member0`, `member1`, ...
    pub fn seed_members(&self, ages: &[i64]) -> Vec<EntityKey> {
        ages.iter()
            .enumerate()
            .map(|(i, age)| self.seed(MEMBER, &member_row(&format!("member{i}"), *age, None)))
            .collect()
    }

    /// Seeds a team and `size` members belonging to it.
    pub fn seed_team(&self, name: &str, size: usize) -> (EntityKey, Vec<EntityKey>) {
        let mut team = Row::new();
        team.insert("name".into(), Value::from(name));
        let team_key = self.seed(TEAM, &team);
        let members = (0..size)
            .map(|i| {
                let row = member_row(&format!("{name}-member{i}"), 20, Some(team_key));
                self.seed(MEMBER, &row)
            })
            .collect();
        (team_key, members)
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a test with a fresh context and the storage behind it.
///
/// # Example
///
/// ```rust
/// use pcx_testkit::{member, with_context};
///
/// with_context(|ctx, storage| {
///     ctx.save(&member("m1", 10)).unwrap();
///     assert_eq!(storage.write_count(), 0);
/// });
/// ```
pub fn with_context<F, R>(f: F) -> R
where
    F: FnOnce(&mut PersistenceContext, &RecordingBackend) -> R,
{
    let harness = TestContext::new();
    let mut ctx = harness.open();
    f(&mut ctx, &harness.storage)
}

/// A storage row for a member.
pub fn member_row(username: &str, age: i64, team: Option<EntityKey>) -> Row {
    let mut row = Row::new();
    row.insert("username".into(), Value::from(username));
    row.insert("age".into(), Value::Integer(age));
    if let Some(team) = team {
        row.insert("team".into(), Value::Ref(KeyRef::new(TEAM, team)));
    }
    row
}

/// A transient member.
pub fn member(username: &str, age: i64) -> EntityHandle {
    EntityHandle::new(
        Entity::new(MEMBER)
            .with("username", username)
            .with("age", age),
    )
}

/// A transient member of `team`.
pub fn member_of(username: &str, age: i64, team: &EntityHandle) -> EntityHandle {
    EntityHandle::new(
        Entity::new(MEMBER)
            .with("username", username)
            .with("age", age)
            .with_ref("team", team),
    )
}

/// A transient team.
pub fn team(name: &str) -> EntityHandle {
    EntityHandle::new(Entity::new(TEAM).with("name", name))
}

/// Member view handed out of a unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberDto {
    /// Member key.
    pub id: Option<u64>,
    /// Login name.
    pub username: String,
    /// Age, if known.
    pub age: Option<i64>,
    /// Key of the member's team.
    pub team_id: Option<u64>,
}

impl Projection for MemberDto {
    fn project(entity: &Entity) -> CoreResult<Self> {
        let username = entity
            .get("username")
            .and_then(Value::as_text)
            .ok_or_else(|| CoreError::invalid_operation("member without username"))?
            .to_string();
        let team_id = match entity.reference("team") {
            Some(lazy) => lazy.target()?.map(|target| target.key.as_u64()),
            None => None,
        };
        Ok(Self {
            id: entity.key().map(EntityKey::as_u64),
            username,
            age: entity.get("age").and_then(Value::as_integer),
            team_id,
        })
    }
}

/// Team view handed out of a unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamDto {
    /// Team key.
    pub id: Option<u64>,
    /// Team name.
    pub name: String,
}

impl Projection for TeamDto {
    fn project(entity: &Entity) -> CoreResult<Self> {
        let name = entity
            .get("name")
            .and_then(Value::as_text)
            .ok_or_else(|| CoreError::invalid_operation("team without name"))?
            .to_string();
        Ok(Self {
            id: entity.key().map(EntityKey::as_u64),
            name,
        })
    }
}
