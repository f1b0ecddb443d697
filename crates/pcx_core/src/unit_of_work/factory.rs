//! Context factory.

use super::PersistenceContext;
use crate::config::ContextConfig;
use crate::error::CoreResult;
use pcx_storage::StorageBackend;
use std::fmt;
use std::sync::Arc;

/// Opens persistence contexts over one shared storage backend.
///
/// The factory itself is `Send + Sync` and cheap to clone, so each thread
/// can open its own contexts against the same storage.
#[derive(Clone)]
pub struct ContextFactory {
    storage: Arc<dyn StorageBackend>,
    config: ContextConfig,
}

impl ContextFactory {
    /// Creates a factory with the default configuration.
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self::with_config(storage, ContextConfig::default())
    }

    /// Creates a factory with a custom configuration.
    pub fn with_config(storage: Arc<dyn StorageBackend>, config: ContextConfig) -> Self {
        Self { storage, config }
    }

    /// Returns the storage backend.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    /// Returns the configuration used for new contexts.
    #[must_use]
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Opens a new context.
    #[must_use]
    pub fn open(&self) -> PersistenceContext {
        PersistenceContext::new(Arc::clone(&self.storage), self.config.clone())
    }

    /// Executes a function within a unit of work.
    ///
    /// If the function returns `Ok`, the context is committed.
    /// If it returns `Err`, the context is rolled back.
    ///
    /// # Errors
    ///
    /// Returns the function's error, or the commit error.
    pub fn transaction<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut PersistenceContext) -> CoreResult<T>,
    {
        let mut ctx = self.open();
        match f(&mut ctx) {
            Ok(result) => match ctx.commit() {
                Ok(_) => Ok(result),
                Err(e) => {
                    ctx.rollback();
                    Err(e)
                }
            },
            Err(e) => {
                // Roll back, but don't mask the original error
                ctx.rollback();
                Err(e)
            }
        }
    }
}

impl fmt::Debug for ContextFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextFactory")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
