//! Entity types.
//!
//! An [`Entity`] is a plain record. Once wrapped in an [`EntityHandle`] it
//! can be shared, and the persistence context tracks it by handle identity.

mod handle;
mod lazy;
mod record;

pub use handle::EntityHandle;
pub use lazy::Lazy;
pub use record::Entity;
