//! # pcx Value
//!
//! Field values, rows, and entity identities shared by every pcx crate.
//!
//! This crate provides:
//! - [`Value`] - a dynamically typed field value with deterministic equality
//! - [`Row`] - the field-name to value map exchanged with storage
//! - [`EntityType`], [`EntityKey`], [`KeyRef`] - entity identity types
//!
//! ## Equality
//!
//! Floats compare bit-exact, so [`Value`] is `Eq` and two snapshots of the
//! same field are either identical or different, never "close enough".
//!
//! ```
//! use pcx_value::{Row, Value};
//!
//! let mut row = Row::new();
//! row.insert("username".into(), Value::from("AAA"));
//! row.insert("age".into(), Value::from(10));
//! assert_eq!(row["age"], Value::Integer(10));
//! assert_ne!(Value::Float(0.0), Value::Float(-0.0));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod key;
mod value;

pub use key::{EntityKey, EntityType, KeyRef};
pub use value::Value;

use std::collections::BTreeMap;

/// A storage row: field name to value, ordered by field name.
pub type Row = BTreeMap<String, Value>;
