//! CLI command implementations.
//!
//! Every command builds its own in-memory storage, seeds it, and replays
//! one scenario through a persistence context.

pub mod bulk;
pub mod dirty;
pub mod lazy;
pub mod paging;

use serde::Serialize;

/// Prints a report as pretty JSON or through its text renderer.
pub(crate) fn emit<T: Serialize>(
    report: &T,
    format: &str,
    text: impl FnOnce(&T),
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(report)?),
        _ => text(report),
    }
    Ok(())
}
