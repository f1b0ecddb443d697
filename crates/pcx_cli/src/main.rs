//! pcx CLI
//!
//! Replays persistence context scenarios against an in-memory store.
//!
//! # Commands
//!
//! - `paging` - Page through seeded members
//! - `lazy` - Resolve a lazy team reference
//! - `dirty` - Show dirty checking and the writes a flush emits
//! - `bulk` - Run a bulk update and show the stale context

mod commands;
mod demo;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Persistence context scenario runner.
#[derive(Parser)]
#[command(name = "pcx")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(global = true, short, long, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Page through seeded members
    Paging {
        /// Number of members to seed
        #[arg(short, long, default_value = "5")]
        members: usize,

        /// Page size
        #[arg(short, long, default_value = "3")]
        size: u64,

        /// Zero-based page number
        #[arg(short, long, default_value = "0")]
        page: u64,

        /// Sort by age, descending
        #[arg(long)]
        desc: bool,
    },

    /// Resolve a lazy team reference
    Lazy {
        /// Number of members in the team
        #[arg(short, long, default_value = "2")]
        members: usize,
    },

    /// Show dirty checking and the writes a flush emits
    Dirty {
        /// New age for the loaded member
        #[arg(short, long, default_value = "21")]
        age: i64,
    },

    /// Run a bulk update and show the stale context
    Bulk {
        /// Number of members to seed
        #[arg(short, long, default_value = "5")]
        members: usize,

        /// Only members at least this old are updated
        #[arg(long, default_value = "20")]
        min_age: i64,

        /// Amount added to each matching age
        #[arg(short, long, default_value = "1")]
        increment: i64,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Paging {
            members,
            size,
            page,
            desc,
        } => {
            commands::paging::run(members, size, page, desc, &cli.format)?;
        }
        Commands::Lazy { members } => {
            commands::lazy::run(members, &cli.format)?;
        }
        Commands::Dirty { age } => {
            commands::dirty::run(age, &cli.format)?;
        }
        Commands::Bulk {
            members,
            min_age,
            increment,
        } => {
            commands::bulk::run(members, min_age, increment, &cli.format)?;
        }
        Commands::Version => {
            println!("pcx CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("pcx Core v{}", pcx_core::VERSION);
        }
    }

    Ok(())
}
