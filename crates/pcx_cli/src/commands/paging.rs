//! Paging command implementation.

use pcx_core::{CoreResult, PageRequest, Sort};
use crate::demo::{Demo, MemberView, MEMBER};
use serde::Serialize;
use tracing::info;

/// One page of members.
#[derive(Debug, Serialize)]
pub struct PagingReport {
    /// Zero-based page number.
    pub number: u64,
    /// Page size.
    pub size: u64,
    /// Members across all pages.
    pub total_elements: u64,
    /// Number of pages.
    pub total_pages: u64,
    /// Whether a later page exists.
    pub has_next: bool,
    /// Members on this page.
    pub content: Vec<MemberView>,
}

/// Runs the paging command.
pub fn run(
    members: usize,
    size: u64,
    page: u64,
    desc: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = build(members, size, page, desc)?;
    super::emit(&report, format, print_text_output)
}

fn build(members: usize, size: u64, page: u64, desc: bool) -> CoreResult<PagingReport> {
    let demo = Demo::new();
    let ages: Vec<i64> = (1..=members as i64).map(|i| i * 10).collect();
    demo.seed_members(&ages)?;
    info!(members, size, page, "seeded members");

    let mut request = PageRequest::of(page, size);
    if desc {
        request = request.with_sort(Sort::desc("age"));
    }

    let mut ctx = demo.open();
    let found = ctx.find_page_as::<MemberView>(MEMBER, None, &request)?;
    ctx.rollback();

    Ok(PagingReport {
        number: found.number(),
        size: found.size(),
        total_elements: found.total_elements(),
        total_pages: found.total_pages(),
        has_next: found.has_next(),
        content: found.into_content(),
    })
}

fn print_text_output(report: &PagingReport) {
    println!("Page {} of {}", report.number + 1, report.total_pages.max(1));
    println!("=============");
    for m in &report.content {
        let id = m.id.map_or_else(|| "-".to_string(), |id| id.to_string());
        let age = m.age.map_or_else(|| "-".to_string(), |age| age.to_string());
        println!("  #{id:<4} {:<12} age {age}", m.username);
    }
    println!();
    println!("Total members: {}", report.total_elements);
    println!("Has next:      {}", report.has_next);
}
