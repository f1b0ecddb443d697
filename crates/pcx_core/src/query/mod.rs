//! Query façade.
//!
//! Every multi-row query routes its rows through the identity map: an
//! instance already managed for a key is returned unchanged and the fresh
//! row is discarded. With [`crate::FlushMode::Auto`] pending changes are
//! flushed first, so queries observe buffered writes.

mod example;
mod finder;
mod page;
mod projection;

pub use example::FromExample;
pub use page::{Page, PageRequest, Slice};
pub use projection::Projection;
