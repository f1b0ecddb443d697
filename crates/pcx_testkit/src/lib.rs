//! # pcx Testkit
//!
//! Test utilities for pcx.
//!
//! This crate provides:
//! - Test fixtures: a Member/Team domain, DTO projections, and a context
//!   harness over a recording backend
//! - Property-based test generators using proptest
//! - Cross-crate integration checks for identity, flushing and paging
//! - Stress helpers running many contexts against one storage
//!
//! ## Usage
//!
//! ```rust
//! use pcx_testkit::prelude::*;
//!
//! with_context(|ctx, storage| {
//!     ctx.save(&member("m1", 10)).unwrap();
//!     ctx.flush().unwrap();
//!     assert_eq!(storage.write_count(), 1);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use stress::*;
