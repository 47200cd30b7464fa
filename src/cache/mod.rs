//! # Data Caching Module
//!
//! A single facade for storing and restoring serializable values under
//! string keys, backed by one interchangeable storage engine chosen at
//! initialization.
//!
//! ## Overview
//!
//! Lookups go through two tiers: a process-local map in the
//! [`CacheManager`] answers repeated reads within the process, and the
//! selected [`CacheBackend`] is the source of truth for presence.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CacheManager`] | Facade: save / restore / delete / clear_all and statistics |
//! | [`BackendSelector`] | Mode + options → backend, with database fallback |
//! | [`CacheRegistry`] | One manager per process, owned by the composition root |
//! | [`CacheBackend`] | Trait for storage strategies |
//! | [`MemoryCache`] | Process-wide shared memory, partitioned by namespace |
//! | [`FileCache`] | One file per key in a cache directory |
//! | [`DatabaseCache`] | SQLite table keyed by namespace and key |
//! | [`NullCache`] | No-op cache for disabling caching |
//! | [`CacheKey`] | Key normalization for backends |
//!
//! ## Backend selection
//!
//! | Mode | Backend |
//! |------|---------|
//! | `auto`, `memory` | shared memory if the host has it, else database |
//! | `file` | file |
//! | `none` | null |
//! | anything else | database |
//!
//! ## Example
//!
//! ```rust,no_run
//! use mmforum_cache::cache::CacheManager;
//! use mmforum_cache::config::{CacheMode, CacheOptions};
//!
//! # async fn run() -> mmforum_cache::Result<()> {
//! let cache = CacheManager::initialize(
//!     CacheMode::File,
//!     CacheOptions::new().with_directory("/var/cache/mm_forum"),
//! )
//! .await?;
//!
//! cache.save("topic,42", &vec!["first post", "reply"], false).await;
//! let posts: Option<Vec<String>> = cache.restore("topic,42").await;
//! # Ok(())
//! # }
//! ```

mod backend;
mod database;
mod file;
mod key;
mod manager;
mod registry;
mod selector;

pub use backend::{CacheBackend, MemoryCache, NullCache};
pub use database::DatabaseCache;
pub use file::{normalize_path, FileCache};
pub use key::CacheKey;
pub use manager::{CacheManager, CacheStats};
pub use registry::{get_global_cache, global_registry, CacheRegistry};
pub use selector::{backend_selector, BackendSelector};
