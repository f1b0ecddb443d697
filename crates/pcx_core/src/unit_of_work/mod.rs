//! Unit of work.
//!
//! A [`PersistenceContext`] buffers inserts, dirty updates and deletes
//! until [`PersistenceContext::flush`] dispatches them to storage in a
//! fixed order:
//!
//! 1. inserts, in save order
//! 2. updates of dirty managed entities, in registration order
//! 3. deletes, in reverse registration order
//!
//! Contexts are opened from a [`ContextFactory`], which also offers a
//! closure-scoped [`ContextFactory::transaction`].

mod context;
mod factory;
mod flush;

pub use context::PersistenceContext;
pub use factory::ContextFactory;
