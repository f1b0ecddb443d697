//! # pcx Storage
//!
//! Storage collaborator trait and implementations for pcx.
//!
//! The persistence context never talks to a database directly: every read
//! and write goes through a [`StorageBackend`]. Backends own row storage,
//! key assignment, and predicate evaluation. They know nothing about
//! identity maps, snapshots, or flush ordering.
//!
//! ## Design Principles
//!
//! - Each operation is synchronous and individually atomic
//! - No cross-operation atomicity; callers wrap flushes in their own
//!   transaction boundary if they need one
//! - Must be `Send + Sync` so several contexts can share one backend
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral storage
//! - [`RecordingBackend`] - Wrapper that records writes and injects failures
//!
//! ## Example
//!
//! ```rust
//! use pcx_storage::{InMemoryBackend, Predicate, StorageBackend, Window};
//! use pcx_value::{EntityType, Row, Value};
//!
//! let backend = InMemoryBackend::new();
//! let member = EntityType::new("Member");
//! let mut row = Row::new();
//! row.insert("age".into(), Value::from(20));
//! let key = backend.insert(&member, &row).unwrap();
//!
//! let adults = Predicate::field("age").ge(18);
//! let (rows, total) = backend.read_many(&member, Some(&adults), &Window::all()).unwrap();
//! assert_eq!(total, 1);
//! assert_eq!(rows[0].0, key);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod memory;
mod query;
mod recording;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use memory::InMemoryBackend;
pub use query::{BulkChange, CompareOp, Direction, FieldPath, Predicate, Sort, Window};
pub use recording::{RecordingBackend, WriteOp};
