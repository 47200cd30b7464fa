//! Cache backend trait plus the shared memory and null backends.

use super::key::CacheKey;
use crate::config::CacheMode;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Storage strategy behind the cache facade.
///
/// A lookup is `Some(bytes)` when present and `None` when absent; a stored
/// payload is never interpreted by the backend, so any serialized value
/// (including `false`) round-trips unambiguously.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &CacheKey, value: &[u8]) -> Result<()>;
    /// Returns whether an entry was removed.
    async fn delete(&self, key: &CacheKey) -> Result<bool>;
    async fn exists(&self, key: &CacheKey) -> Result<bool>;
    /// Remove every entry this cache owns, and nothing else.
    async fn clear(&self) -> Result<()>;
    fn name(&self) -> &'static str;

    /// The built-in mode this backend implements, `None` for custom backends.
    fn mode(&self) -> Option<CacheMode> {
        None
    }
}

type Segment = HashMap<String, HashMap<String, Vec<u8>>>;

/// Host-wide segment shared by every [`MemoryCache`] handle, partitioned by namespace.
static SHARED_SEGMENT: once_cell::sync::Lazy<RwLock<Segment>> =
    once_cell::sync::Lazy::new(|| RwLock::new(HashMap::new()));

fn poisoned() -> Error {
    Error::storage_with_context(
        "shared memory segment poisoned",
        ErrorContext::new().with_source("memory_cache"),
    )
}

fn read_segment() -> Result<RwLockReadGuard<'static, Segment>> {
    SHARED_SEGMENT.read().map_err(|_| poisoned())
}

fn write_segment() -> Result<RwLockWriteGuard<'static, Segment>> {
    SHARED_SEGMENT.write().map_err(|_| poisoned())
}

/// RAM-resident cache shared by every caller in the process.
///
/// Handles are cheap; two handles with the same namespace see the same
/// entries. Nothing survives a restart.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    namespace: String,
}

impl MemoryCache {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Number of entries held for this namespace.
    pub fn len(&self) -> usize {
        read_segment()
            .map(|seg| seg.get(&self.namespace).map_or(0, HashMap::len))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let seg = read_segment()?;
        Ok(seg
            .get(&self.namespace)
            .and_then(|entries| entries.get(key.as_str()))
            .cloned())
    }

    async fn set(&self, key: &CacheKey, value: &[u8]) -> Result<()> {
        let mut seg = write_segment()?;
        seg.entry(self.namespace.clone())
            .or_default()
            .insert(key.as_str().to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        let mut seg = write_segment()?;
        Ok(seg
            .get_mut(&self.namespace)
            .and_then(|entries| entries.remove(key.as_str()))
            .is_some())
    }

    async fn exists(&self, key: &CacheKey) -> Result<bool> {
        let seg = read_segment()?;
        Ok(seg
            .get(&self.namespace)
            .map(|entries| entries.contains_key(key.as_str()))
            .unwrap_or(false))
    }

    async fn clear(&self) -> Result<()> {
        // Only this namespace; other consumers of the segment keep their entries.
        write_segment()?.remove(&self.namespace);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }

    fn mode(&self) -> Option<CacheMode> {
        Some(CacheMode::Memory)
    }
}

/// Backend that stores nothing. Disables caching without touching call sites.
pub struct NullCache;

impl NullCache {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for NullCache {
    async fn get(&self, _: &CacheKey) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
    async fn set(&self, _: &CacheKey, _: &[u8]) -> Result<()> {
        Ok(())
    }
    async fn delete(&self, _: &CacheKey) -> Result<bool> {
        Ok(false)
    }
    async fn exists(&self, _: &CacheKey) -> Result<bool> {
        Ok(false)
    }
    async fn clear(&self) -> Result<()> {
        Ok(())
    }
    fn name(&self) -> &'static str {
        "null"
    }
    fn mode(&self) -> Option<CacheMode> {
        Some(CacheMode::None)
    }
}
