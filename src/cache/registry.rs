//! One cache manager per process.
//!
//! The composition root owns a [`CacheRegistry`] and passes the manager it
//! yields to collaborators. Hosts that cannot thread it through explicitly
//! can use [`get_global_cache`], which is backed by a process-wide registry.

use super::manager::CacheManager;
use super::selector::{backend_selector, BackendSelector};
use crate::config::{CacheMode, CacheOptions};
use crate::Result;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

pub struct CacheRegistry {
    selector: Arc<BackendSelector>,
    manager: OnceCell<Arc<CacheManager>>,
}

impl CacheRegistry {
    /// Registry resolving backends through the process-wide selector.
    pub fn new() -> Self {
        Self::with_selector(backend_selector())
    }

    pub fn with_selector(selector: Arc<BackendSelector>) -> Self {
        Self {
            selector,
            manager: OnceCell::new(),
        }
    }

    /// Return the manager, creating it with `mode` and `options` on the
    /// first call.
    ///
    /// Once a manager exists the arguments are ignored: a later caller cannot
    /// switch the backend for the lifetime of this registry. A failed first
    /// initialization leaves the registry empty, so the next call retries.
    pub async fn get_or_init(
        &self,
        mode: CacheMode,
        options: CacheOptions,
    ) -> Result<Arc<CacheManager>> {
        if let Some(existing) = self.manager.get() {
            debug!(
                "Cache already initialized with the {} backend; ignoring requested mode {}",
                existing.backend_name(),
                mode
            );
            return Ok(Arc::clone(existing));
        }

        let manager = self
            .manager
            .get_or_try_init(move || async move {
                CacheManager::initialize_with(&self.selector, mode, options)
                    .await
                    .map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(manager))
    }

    /// Same as [`CacheRegistry::get_or_init`] with mode `database` and default options.
    pub async fn get_or_init_default(&self) -> Result<Arc<CacheManager>> {
        self.get_or_init(CacheMode::Database, CacheOptions::default())
            .await
    }

    /// The manager, if one has been established.
    pub fn get(&self) -> Option<Arc<CacheManager>> {
        self.manager.get().cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.manager.initialized()
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_REGISTRY: once_cell::sync::Lazy<CacheRegistry> =
    once_cell::sync::Lazy::new(CacheRegistry::new);

pub fn global_registry() -> &'static CacheRegistry {
    &GLOBAL_REGISTRY
}

/// Process-wide cache manager; the first call decides mode and options.
pub async fn get_global_cache(mode: CacheMode, options: CacheOptions) -> Result<Arc<CacheManager>> {
    global_registry().get_or_init(mode, options).await
}
