//! Backend selection: turns a requested [`CacheMode`] into a live backend.

use super::backend::{CacheBackend, MemoryCache, NullCache};
use super::database::DatabaseCache;
use super::file::FileCache;
use crate::config::{CacheMode, CacheOptions, HostCapabilities};
use crate::{Error, ErrorContext, Result};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Resolves modes to backends and keeps one backend per namespace.
pub struct BackendSelector {
    registered: RwLock<HashMap<String, Arc<dyn CacheBackend>>>,
}

impl BackendSelector {
    pub fn new() -> Self {
        Self {
            registered: RwLock::new(HashMap::new()),
        }
    }

    /// Apply the selection policy. The result is always one of
    /// `Memory`, `File`, `Database` or `None`.
    pub fn resolve_mode(mode: CacheMode, capabilities: HostCapabilities) -> CacheMode {
        match mode {
            CacheMode::Auto | CacheMode::Memory => {
                if capabilities.shared_memory {
                    CacheMode::Memory
                } else {
                    CacheMode::Database
                }
            }
            CacheMode::File => CacheMode::File,
            CacheMode::None => CacheMode::None,
            CacheMode::Database => CacheMode::Database,
        }
    }

    /// Backend registered for `namespace`, if any.
    pub fn registered(&self, namespace: &str) -> Option<Arc<dyn CacheBackend>> {
        self.registered
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(namespace)
            .cloned()
    }

    /// Forget the backend registered for `namespace` so the next
    /// initialization builds a fresh one.
    pub fn unregister(&self, namespace: &str) -> Option<Arc<dyn CacheBackend>> {
        self.registered
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(namespace)
    }

    /// Return the backend for `options.namespace`, building and registering
    /// it on first use.
    ///
    /// A backend that cannot be built falls back to the database backend.
    /// Only when that fails too is a configuration error returned.
    pub async fn initialize(
        &self,
        mode: CacheMode,
        options: &CacheOptions,
    ) -> Result<Arc<dyn CacheBackend>> {
        if let Some(existing) = self.registered(&options.namespace) {
            debug!(
                "Reusing {} backend registered for namespace {}",
                existing.name(),
                options.namespace
            );
            return Ok(existing);
        }

        let resolved = Self::resolve_mode(mode, options.capabilities());
        let backend = match Self::build(resolved, options).await {
            Ok(backend) => backend,
            Err(e) if resolved != CacheMode::Database => {
                warn!(
                    "Cache backend {} unavailable ({}), falling back to database",
                    resolved, e
                );
                Self::build(CacheMode::Database, options)
                    .await
                    .map_err(|fallback| {
                        Self::missing_backend(
                            resolved,
                            format!("{}; database fallback: {}", e, fallback),
                        )
                    })?
            }
            Err(e) => return Err(Self::missing_backend(resolved, e.to_string())),
        };

        info!(
            "Cache namespace {} uses the {} backend (requested {})",
            options.namespace,
            backend.name(),
            mode
        );

        let mut registered = self
            .registered
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        // A concurrent initialization may have won the race; keep the first.
        Ok(Arc::clone(
            registered
                .entry(options.namespace.clone())
                .or_insert(backend),
        ))
    }

    async fn build(mode: CacheMode, options: &CacheOptions) -> Result<Arc<dyn CacheBackend>> {
        let backend: Arc<dyn CacheBackend> = match mode {
            CacheMode::Memory | CacheMode::Auto => Arc::new(MemoryCache::new(&options.namespace)),
            CacheMode::File => Arc::new(
                FileCache::new(options.file.directory_or_default(), &options.file.suffix).await?,
            ),
            CacheMode::None => Arc::new(NullCache::new()),
            CacheMode::Database => Arc::new(DatabaseCache::from_options(
                &options.database,
                &options.namespace,
            )?),
        };
        Ok(backend)
    }

    fn missing_backend(requested: CacheMode, details: String) -> Error {
        Error::configuration_with_context(
            format!("cache backend does not exist: {}", requested),
            ErrorContext::new()
                .with_details(details)
                .with_source("backend_selector"),
        )
    }
}

impl Default for BackendSelector {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_SELECTOR: once_cell::sync::Lazy<Arc<BackendSelector>> =
    once_cell::sync::Lazy::new(|| Arc::new(BackendSelector::new()));

/// The process-wide selector.
pub fn backend_selector() -> Arc<BackendSelector> {
    Arc::clone(&GLOBAL_SELECTOR)
}
