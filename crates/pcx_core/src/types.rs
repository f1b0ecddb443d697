//! Core type definitions for pcx.

use std::fmt;
use uuid::Uuid;

/// Unique identifier of a persistence context, used to correlate logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(Uuid);

impl ContextId {
    /// Creates a new random context ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Converts to a UUID.
    #[must_use]
    pub fn to_uuid(self) -> Uuid {
        self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx:{}", self.0.simple())
    }
}

/// Lifecycle state of a persistence context.
///
/// `Open → Flushing → (Flushed | Failed) → Closed`. A mutation on a
/// `Flushed` context moves it back to `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Accepting operations; may hold unflushed changes.
    Open,
    /// A flush is emitting writes.
    Flushing,
    /// The last flush succeeded and nothing changed since.
    Flushed,
    /// A flush failed; only reads and `close()` remain allowed.
    Failed,
    /// The context was closed; every operation fails.
    Closed,
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContextState::Open => "open",
            ContextState::Flushing => "flushing",
            ContextState::Flushed => "flushed",
            ContextState::Failed => "failed",
            ContextState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Number of writes emitted by one flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushSummary {
    /// Rows inserted.
    pub inserted: usize,
    /// Rows updated.
    pub updated: usize,
    /// Rows deleted.
    pub deleted: usize,
}

impl FlushSummary {
    /// Total number of writes.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }

    /// Returns `true` if the flush wrote nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.total() == 0
    }
}
