//! Persistence context configuration.

/// When buffered changes reach storage without an explicit `flush()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    /// Flush before every storage-backed multi-row query, so queries see
    /// buffered changes.
    #[default]
    Auto,
    /// Flush only on `flush()` and `commit()`.
    Commit,
}

/// Configuration for opening a persistence context.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// When buffered changes are flushed.
    pub flush_mode: FlushMode,

    /// Page size used by [`crate::PersistenceContext::default_page`].
    pub default_page_size: u64,

    /// Largest page size a query may request.
    pub max_page_size: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            flush_mode: FlushMode::Auto,
            default_page_size: 100,
            max_page_size: 2000,
        }
    }
}

impl ContextConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flush mode.
    #[must_use]
    pub const fn flush_mode(mut self, mode: FlushMode) -> Self {
        self.flush_mode = mode;
        self
    }

    /// Sets the default page size.
    #[must_use]
    pub const fn default_page_size(mut self, size: u64) -> Self {
        self.default_page_size = size;
        self
    }

    /// Sets the maximum page size.
    #[must_use]
    pub const fn max_page_size(mut self, size: u64) -> Self {
        self.max_page_size = size;
        self
    }
}
