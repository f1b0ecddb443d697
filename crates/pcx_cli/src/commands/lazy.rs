//! Lazy reference command implementation.

use pcx_core::{CoreError, CoreResult, EntityHandle, EntityKey, KeyRef, Lazy, PersistenceContext};
use crate::demo::{Demo, MEMBER, TEAM};
use serde::Serialize;
use tracing::info;

/// What happened to a member's team reference.
#[derive(Debug, Serialize)]
pub struct LazyReport {
    /// Username of the loaded member.
    pub member: Option<String>,
    /// Whether the team was loaded along with the member.
    pub loaded_with_member: bool,
    /// Whether the team was loaded after resolving.
    pub loaded_after_resolve: bool,
    /// Resolved team name.
    pub team: Option<String>,
    /// Whether the resolved team is the instance a lookup by key returns.
    pub same_instance_as_lookup: bool,
    /// Members found through the team.
    pub team_members: usize,
    /// Error from resolving a reference after close.
    pub after_close: Option<String>,
}

/// Runs the lazy command.
pub fn run(members: usize, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let report = build(members)?;
    super::emit(&report, format, print_text_output)
}

fn build(members: usize) -> CoreResult<LazyReport> {
    let demo = Demo::new();
    let (team_key, member_keys) = demo.seed_team("teamA", members.max(1))?;
    info!(team = %team_key, members = member_keys.len(), "seeded team");

    let mut ctx = demo.open();
    let member = find(&mut ctx, MEMBER, member_keys[0])?;
    let loaded_with_member = is_team_loaded(&member);

    let team = ctx.resolve(&member, "team")?;
    let loaded_after_resolve = is_team_loaded(&member);
    let team_name = team
        .as_ref()
        .and_then(|t| t.get("name"))
        .and_then(|v| v.as_text().map(str::to_string));

    let lookup = find(&mut ctx, TEAM, team_key)?;
    let same_instance_as_lookup = team.as_ref().is_some_and(|t| t.same_instance(&lookup));
    let team_members = ctx.children(&lookup, MEMBER, "team")?.len();

    // A second context that closes before its reference is resolved.
    let after_close = match member_keys.get(1) {
        Some(key) => {
            let mut other_ctx = demo.open();
            let other = find(&mut other_ctx, MEMBER, *key)?;
            other_ctx.close();
            other_ctx.resolve(&other, "team").err().map(|e| e.to_string())
        }
        None => None,
    };
    ctx.close();

    Ok(LazyReport {
        member: member.get("username").and_then(|v| v.as_text().map(str::to_string)),
        loaded_with_member,
        loaded_after_resolve,
        team: team_name,
        same_instance_as_lookup,
        team_members,
        after_close,
    })
}

fn find(
    ctx: &mut PersistenceContext,
    entity_type: &str,
    key: EntityKey,
) -> CoreResult<EntityHandle> {
    ctx.find_by_id(entity_type, key)?
        .ok_or_else(|| CoreError::EntityNotFound {
            key_ref: KeyRef::new(entity_type, key),
        })
}

fn is_team_loaded(member: &EntityHandle) -> bool {
    member.borrow().reference("team").is_some_and(Lazy::is_loaded)
}

fn print_text_output(report: &LazyReport) {
    println!("Lazy Reference");
    println!("==============");
    if let Some(member) = &report.member {
        println!("Member:               {member}");
    }
    println!("Loaded with member:   {}", report.loaded_with_member);
    println!("Loaded after resolve: {}", report.loaded_after_resolve);
    if let Some(team) = &report.team {
        println!("Team:                 {team}");
    }
    println!("Same as lookup:       {}", report.same_instance_as_lookup);
    println!("Team members:         {}", report.team_members);
    if let Some(err) = &report.after_close {
        println!();
        println!("After close: {err}");
    }
}
