//! Dirty checking command implementation.

use pcx_core::{CoreError, CoreResult, KeyRef};
use crate::demo::{Demo, MEMBER};
use pcx_storage::WriteOp;
use serde::Serialize;
use tracing::info;

/// Dirty fields of an edited member and the writes its flush emitted.
#[derive(Debug, Serialize)]
pub struct DirtyReport {
    /// Fields changed since load, before the flush.
    pub dirty_before_flush: Vec<String>,
    /// Fields still changed after the flush.
    pub dirty_after_flush: Vec<String>,
    /// Rows updated by the flush.
    pub updated: usize,
    /// Writes that reached storage.
    pub writes: Vec<String>,
    /// Writes emitted by a second flush.
    pub second_flush_writes: usize,
}

/// Runs the dirty command.
pub fn run(age: i64, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let report = build(age)?;
    super::emit(&report, format, print_text_output)
}

fn build(age: i64) -> CoreResult<DirtyReport> {
    let demo = Demo::new();
    let key = demo.seed_members(&[20])?[0];

    let mut ctx = demo.open();
    let member = ctx
        .find_by_id(MEMBER, key)?
        .ok_or_else(|| CoreError::EntityNotFound {
            key_ref: KeyRef::new(MEMBER, key),
        })?;
    member.set("age", age);

    let dirty_before_flush = ctx.dirty_fields(&member)?.into_iter().collect();
    let summary = ctx.flush()?;
    let dirty_after_flush = ctx.dirty_fields(&member)?.into_iter().collect();
    let writes = demo.storage.take_ops().iter().map(describe_op).collect();
    let second_flush_writes = ctx.flush()?.total();
    ctx.commit()?;
    info!(updated = summary.updated, "flushed edited member");

    Ok(DirtyReport {
        dirty_before_flush,
        dirty_after_flush,
        updated: summary.updated,
        writes,
        second_flush_writes,
    })
}

fn describe_op(op: &WriteOp) -> String {
    match op {
        WriteOp::Insert { entity_type, key, row } => {
            let fields: Vec<_> = row.keys().map(String::as_str).collect();
            format!("insert {entity_type}#{key} [{}]", fields.join(", "))
        }
        WriteOp::Update {
            entity_type,
            key,
            changes,
        } => {
            let fields: Vec<_> = changes.keys().map(String::as_str).collect();
            format!("update {entity_type}#{key} [{}]", fields.join(", "))
        }
        WriteOp::Delete { entity_type, key } => format!("delete {entity_type}#{key}"),
        WriteOp::BulkUpdate {
            entity_type,
            affected,
        } => format!("bulk_update {entity_type} ({affected} rows)"),
    }
}

fn print_text_output(report: &DirtyReport) {
    println!("Dirty Checking");
    println!("==============");
    println!("Dirty before flush: {:?}", report.dirty_before_flush);
    println!("Dirty after flush:  {:?}", report.dirty_after_flush);
    println!("Rows updated:       {}", report.updated);
    println!();
    println!("Writes:");
    for write in &report.writes {
        println!("  {write}");
    }
    println!("Second flush writes: {}", report.second_flush_writes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn changed_age_is_the_only_write() {
        let report = build(21).unwrap();
        assert_eq!(report.dirty_before_flush, ["age"]);
        assert!(report.dirty_after_flush.is_empty());
        assert_eq!(report.updated, 1);
        assert_eq!(report.writes, ["update Member#1 [age]"]);
        assert_eq!(report.second_flush_writes, 0);
    }

    #[test]
    fn unchanged_age_writes_nothing() {
        let report = build(20).unwrap();
        assert!(report.dirty_before_flush.is_empty());
        assert_eq!(report.updated, 0);
        assert!(report.writes.is_empty());
    }
}
