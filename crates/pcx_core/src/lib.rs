//! # pcx Core
//!
//! A persistence context for pcx: an in-memory identity map plus
//! change-tracking session scoped to one unit of work.
//!
//! This crate provides:
//! - [`Entity`], [`EntityHandle`], and [`Lazy`] references
//! - [`IdentityMap`] - one shared instance per (type, key)
//! - [`SnapshotStore`] - field copies used for dirty checking
//! - [`PersistenceContext`] - unit of work and flush coordination
//! - Query façade: [`PersistenceContext::find_by_id`],
//!   [`PersistenceContext::find_all`], [`PersistenceContext::find_page`]
//!
//! ## Example
//!
//! ```rust
//! use pcx_core::{ContextFactory, Entity, EntityHandle, Predicate};
//! use pcx_storage::InMemoryBackend;
//! use std::sync::Arc;
//!
//! let factory = ContextFactory::new(Arc::new(InMemoryBackend::new()));
//! let mut ctx = factory.open();
//!
//! let young = EntityHandle::new(Entity::new("Member").with("username", "AAA").with("age", 10));
//! let old = EntityHandle::new(Entity::new("Member").with("username", "AAA").with("age", 20));
//! ctx.save(&young).unwrap();
//! ctx.save(&old).unwrap();
//!
//! let found = ctx.find_all("Member", Some(&Predicate::field("age").gt(15))).unwrap();
//! assert_eq!(found.len(), 1);
//! assert!(found[0].same_instance(&old));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod entity;
mod error;
mod identity;
mod query;
mod snapshot;
mod types;
mod unit_of_work;

pub use config::{ContextConfig, FlushMode};
pub use entity::{Entity, EntityHandle, Lazy};
pub use error::{CoreError, CoreResult};
pub use identity::IdentityMap;
pub use query::{FromExample, Page, PageRequest, Projection, Slice};
pub use snapshot::{capture, diff, is_dirty, Snapshot, SnapshotStore};
pub use types::{ContextId, ContextState, FlushSummary};
pub use unit_of_work::{ContextFactory, PersistenceContext};

pub use pcx_storage::{BulkChange, Direction, Predicate, Sort, StorageBackend};
pub use pcx_value::{EntityKey, EntityType, KeyRef, Row, Value};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
