//! Stress helpers for pcx.
//!
//! Contexts are single-threaded, but any number of them may share one
//! storage backend. These helpers run many units of work at once to check
//! that keys stay unique and no write is lost.

use crate::fixtures::{member, MEMBER};
use pcx_core::{ContextFactory, EntityKey, EntityType};
use std::collections::HashSet;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Units of work committed.
    pub committed: usize,
    /// Units of work that failed.
    pub failed: usize,
    /// Keys assigned to inserted entities.
    pub keys: Vec<EntityKey>,
    /// Total duration.
    pub duration: Duration,
}

impl StressTestResult {
    /// Returns `true` if no key was assigned twice.
    #[must_use]
    pub fn keys_unique(&self) -> bool {
        let distinct: HashSet<_> = self.keys.iter().collect();
        distinct.len() == self.keys.len()
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Committed: {}", self.committed);
        println!("Failed: {}", self.failed);
        println!("Keys: {}", self.keys.len());
        println!("Duration: {:?}", self.duration);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent threads.
    pub threads: usize,
    /// Units of work per thread.
    pub transactions: usize,
    /// Entities saved per unit of work.
    pub entities_per_transaction: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            transactions: 25,
            entities_per_transaction: 4,
        }
    }
}

/// Runs units of work on several threads, each with its own contexts,
/// against the factory's shared storage.
pub fn stress_concurrent_contexts(factory: &ContextFactory, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let factory = factory.clone();
            let config = config.clone();
            thread::spawn(move || {
                let mut committed = 0usize;
                let mut failed = 0usize;
                let mut keys = Vec::new();
                for n in 0..config.transactions {
                    let outcome = factory.transaction(|ctx| {
                        let members: Vec<_> = (0..config.entities_per_transaction)
                            .map(|i| member(&format!("t{t}-n{n}-m{i}"), i as i64))
                            .collect();
                        for m in &members {
                            ctx.save(m)?;
                        }
                        ctx.flush()?;
                        Ok(members.iter().filter_map(|m| m.key()).collect::<Vec<_>>())
                    });
                    match outcome {
                        Ok(mut assigned) => {
                            committed += 1;
                            keys.append(&mut assigned);
                        }
                        Err(_) => failed += 1,
                    }
                }
                (committed, failed, keys)
            })
        })
        .collect();

    let mut result = StressTestResult {
        committed: 0,
        failed: 0,
        keys: Vec::new(),
        duration: Duration::ZERO,
    };
    for handle in handles {
        let (committed, failed, mut keys) = handle.join().expect("Stress thread panicked");
        result.committed += committed;
        result.failed += failed;
        result.keys.append(&mut keys);
    }
    result.duration = start.elapsed();
    result
}

/// Counts the members visible in storage through a fresh context.
pub fn stored_member_count(factory: &ContextFactory) -> u64 {
    let mut ctx = factory.open();
    ctx.count(EntityType::new(MEMBER), None)
        .expect("Failed to count members")
}
