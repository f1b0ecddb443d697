//! DTO projections.

use crate::entity::Entity;
use crate::error::CoreResult;

/// A detached view built from an entity.
///
/// Projections carry only the fields a caller needs and never reach back
/// into the context, so they can outlive it. Build them with
/// [`crate::PersistenceContext::find_all_as`] or by mapping a
/// [`crate::Page`].
pub trait Projection: Sized {
    /// Builds the projection.
    ///
    /// # Errors
    ///
    /// Returns an error if a required field is missing or has the wrong
    /// type.
    fn project(entity: &Entity) -> CoreResult<Self>;
}
