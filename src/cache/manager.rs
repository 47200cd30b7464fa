//! Cache manager: the facade callers talk to.

use super::backend::{CacheBackend, MemoryCache};
use super::file::FileCache;
use super::key::CacheKey;
use super::selector::{backend_selector, BackendSelector};
use crate::config::{CacheMode, CacheOptions, HostCapabilities};
use crate::Result;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

/// Raw payload older deployments stored in place of a literal `false`.
/// Not valid JSON, so no value written by [`CacheManager::save`] can match it.
const LEGACY_FALSE_PAYLOAD: &[u8] = b"boolean:false";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Successful restores, including those answered from the local map.
    pub hits: u64,
    pub misses: u64,
    /// Restores answered from the local map without a backend read.
    pub local_hits: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    local_hits: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
}

impl AtomicStats {
    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            local_hits: self.local_hits.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Two-tier cache: a process-local lookaside map in front of one backend.
///
/// The local map is an accelerator only; the backend decides presence. The
/// manager is `Send + Sync` and is meant to be shared behind an `Arc`
/// (see [`crate::cache::CacheRegistry`]).
///
/// Storage failures never surface as errors: writes report `false`, reads
/// report `None`, and the failure is logged and counted in [`CacheStats`].
pub struct CacheManager {
    backend: Arc<dyn CacheBackend>,
    options: CacheOptions,
    capabilities: HostCapabilities,
    local: RwLock<HashMap<String, Value>>,
    stats: AtomicStats,
}

impl CacheManager {
    /// Wrap an already constructed backend.
    pub fn new(backend: Arc<dyn CacheBackend>, options: CacheOptions) -> Self {
        let capabilities = options.capabilities();
        Self {
            backend,
            options,
            capabilities,
            local: RwLock::new(HashMap::new()),
            stats: AtomicStats::default(),
        }
    }

    /// Select a backend through the process-wide selector.
    pub async fn initialize(mode: CacheMode, options: CacheOptions) -> Result<Self> {
        Self::initialize_with(&backend_selector(), mode, options).await
    }

    /// Select a backend through `selector`.
    pub async fn initialize_with(
        selector: &BackendSelector,
        mode: CacheMode,
        options: CacheOptions,
    ) -> Result<Self> {
        let backend = selector.initialize(mode, &options).await?;
        Ok(Self::new(backend, options))
    }

    fn local_read(&self) -> RwLockReadGuard<'_, HashMap<String, Value>> {
        self.local.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn local_write(&self) -> RwLockWriteGuard<'_, HashMap<String, Value>> {
        self.local.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_error(&self) {
        self.stats.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Store `value` under `key`.
    ///
    /// Without `overwrite`, a value already held in the local map for `key`
    /// is kept (first writer wins for this process); the backend is written
    /// either way. Returns whether the backend accepted the write.
    pub async fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T, overwrite: bool) -> bool {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!("Cannot serialize cache entry {}: {}", key, e);
                self.record_error();
                return false;
            }
        };
        let payload = match serde_json::to_vec(&value) {
            Ok(p) => p,
            Err(e) => {
                warn!("Cannot encode cache entry {}: {}", key, e);
                self.record_error();
                return false;
            }
        };

        {
            let mut local = self.local_write();
            if overwrite || !local.contains_key(key) {
                local.insert(key.to_string(), value);
            }
        }

        let cache_key = CacheKey::new(key);
        debug!(
            "Storing cache entry: {} (size: {} bytes, backend: {})",
            cache_key,
            payload.len(),
            self.backend.name()
        );
        match self.backend.set(&cache_key, &payload).await {
            Ok(()) => {
                self.stats.sets.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                warn!("Cache write failed for {}: {}", cache_key, e);
                self.record_error();
                false
            }
        }
    }

    /// Alias of [`CacheManager::save`].
    pub async fn store<T: Serialize + ?Sized>(&self, key: &str, value: &T, overwrite: bool) -> bool {
        self.save(key, value, overwrite).await
    }

    /// Fetch the value stored under `key`.
    ///
    /// The backend is asked for presence first; if it reports the key absent
    /// the local map is ignored. A present key is answered from the local map
    /// when possible, otherwise read from the backend and remembered locally.
    pub async fn restore<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let cache_key = CacheKey::new(key);

        match self.backend.exists(&cache_key).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Cache miss: {}", cache_key);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Err(e) => {
                warn!("Cache presence check failed for {}: {}", cache_key, e);
                self.record_error();
                return None;
            }
        }

        let local_value = self.local_read().get(key).cloned();
        if let Some(value) = local_value {
            debug!("Local cache hit: {}", cache_key);
            self.stats.local_hits.fetch_add(1, Ordering::Relaxed);
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return self.decode(key, value);
        }

        let payload = match self.backend.get(&cache_key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                // Removed between the presence check and the read.
                debug!("Cache miss: {}", cache_key);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Err(e) => {
                warn!("Cache read failed for {}: {}", cache_key, e);
                self.record_error();
                return None;
            }
        };

        let value = if payload == LEGACY_FALSE_PAYLOAD {
            Value::Bool(false)
        } else {
            match serde_json::from_slice::<Value>(&payload) {
                Ok(v) => v,
                Err(e) => {
                    warn!("Undecodable cache entry {}: {}", cache_key, e);
                    self.record_error();
                    return None;
                }
            }
        };

        debug!("Cache hit: {}", cache_key);
        self.stats.hits.fetch_add(1, Ordering::Relaxed);
        self.local_write()
            .entry(key.to_string())
            .or_insert_with(|| value.clone());
        self.decode(key, value)
    }

    fn decode<T: DeserializeOwned>(&self, key: &str, value: Value) -> Option<T> {
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Cache entry {} does not match the requested type: {}", key, e);
                self.record_error();
                None
            }
        }
    }

    /// Drop `key` from the local map and the backend. Returns whether the
    /// backend removed an entry; an absent key or a storage failure is `false`.
    pub async fn delete(&self, key: &str) -> bool {
        self.local_write().remove(key);

        let cache_key = CacheKey::new(key);
        debug!("Deleting cache entry: {}", cache_key);
        match self.backend.delete(&cache_key).await {
            Ok(removed) => {
                if removed {
                    self.stats.deletes.fetch_add(1, Ordering::Relaxed);
                }
                removed
            }
            Err(e) => {
                warn!("Cache delete failed for {}: {}", cache_key, e);
                self.record_error();
                false
            }
        }
    }

    /// Invalidate everything this cache owns.
    ///
    /// Clears the local map and the active backend, then the shared memory
    /// namespace (when the host has one) and the configured file directory,
    /// which may still hold entries from an earlier backend choice. Returns
    /// `false` if any of these steps failed.
    pub async fn clear_all(&self) -> bool {
        warn!(
            "Clearing all cache entries of namespace {}",
            self.options.namespace
        );
        self.local_write().clear();

        let mut ok = true;
        if let Err(e) = self.backend.clear().await {
            warn!("Failed to clear {} backend: {}", self.backend.name(), e);
            ok = false;
        }

        let active = self.backend.mode();
        if self.capabilities.shared_memory && active != Some(CacheMode::Memory) {
            if let Err(e) = MemoryCache::new(&self.options.namespace).clear().await {
                warn!("Failed to clear shared memory cache: {}", e);
                ok = false;
            }
        }

        if let Some(ref directory) = self.options.file.directory {
            if active != Some(CacheMode::File) {
                let files = FileCache::at(directory, &self.options.file.suffix);
                if let Err(e) = files.clear().await {
                    warn!("Failed to sweep cache directory {:?}: {}", directory, e);
                    ok = false;
                }
            }
        }

        if !ok {
            self.record_error();
        }
        ok
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Number of entries in the local map.
    pub fn local_len(&self) -> usize {
        self.local_read().len()
    }
}
