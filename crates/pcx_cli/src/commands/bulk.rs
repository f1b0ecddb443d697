//! Bulk update command implementation.

use pcx_core::{BulkChange, CoreResult, EntityHandle, Predicate};
use crate::demo::{Demo, MEMBER};
use serde::Serialize;
use tracing::info;

/// Ages seen before and after a bulk update.
#[derive(Debug, Serialize)]
pub struct BulkReport {
    /// Rows the update touched.
    pub affected: u64,
    /// Ages held by the context before the update.
    pub before: Vec<Option<i64>>,
    /// Ages the same instances hold right after the update.
    pub stale: Vec<Option<i64>>,
    /// Ages reloaded after clearing the context.
    pub fresh: Vec<Option<i64>>,
}

/// Runs the bulk command.
pub fn run(
    members: usize,
    min_age: i64,
    increment: i64,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = build(members, min_age, increment)?;
    super::emit(&report, format, print_text_output)
}

fn build(members: usize, min_age: i64, increment: i64) -> CoreResult<BulkReport> {
    let demo = Demo::new();
    let ages: Vec<i64> = (1..=members as i64).map(|i| i * 10).collect();
    demo.seed_members(&ages)?;

    let mut ctx = demo.open();
    let loaded = ctx.find_all(MEMBER, None)?;
    let before = ages_of(&loaded);

    let predicate = Predicate::field("age").ge(min_age);
    let affected = ctx.bulk_update(
        MEMBER,
        Some(&predicate),
        &[("age".to_string(), BulkChange::Increment(increment))],
    )?;
    info!(affected, min_age, increment, "bulk update ran");
    let stale = ages_of(&loaded);

    ctx.clear()?;
    let fresh = ages_of(&ctx.find_all(MEMBER, None)?);
    ctx.commit()?;

    Ok(BulkReport {
        affected,
        before,
        stale,
        fresh,
    })
}

fn ages_of(members: &[EntityHandle]) -> Vec<Option<i64>> {
    members
        .iter()
        .map(|m| m.get("age").and_then(|age| age.as_integer()))
        .collect()
}

fn print_text_output(report: &BulkReport) {
    println!("Bulk Update");
    println!("===========");
    println!("Rows affected: {}", report.affected);
    println!();
    println!("{:<8} {:<8} {:<8}", "Before", "Stale", "Fresh");
    let rows = report.before.iter().zip(&report.stale).zip(&report.fresh);
    for ((before, stale), fresh) in rows {
        println!("{:<8} {:<8} {:<8}", show(*before), show(*stale), show(*fresh));
    }
}

fn show(age: Option<i64>) -> String {
    age.map_or_else(|| "-".to_string(), |age| age.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_stays_stale_until_cleared() {
        let report = build(5, 20, 1).unwrap();
        assert_eq!(report.affected, 4);
        assert_eq!(report.stale, report.before);
        assert_eq!(
            report.fresh,
            [Some(10), Some(21), Some(31), Some(41), Some(51)]
        );
    }

    #[test]
    fn nothing_matches_above_the_oldest() {
        let report = build(3, 100, 5).unwrap();
        assert_eq!(report.affected, 0);
        assert_eq!(report.fresh, report.before);
    }
}
