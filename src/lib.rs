//! # mmforum-cache
//!
//! Pluggable data cache for the mm_forum runtime.
//!
//! ## Overview
//!
//! Callers store and restore arbitrary serializable values under string keys
//! through one facade, [`CacheManager`]. The storage engine behind it is
//! chosen once, at initialization, from a [`CacheMode`]:
//!
//! - **Shared memory**: fast, process-wide, not persistent
//! - **File**: one file per key in a cache directory
//! - **Database**: an SQLite table; the default and the fallback
//! - **None**: caching disabled
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mmforum_cache::{get_global_cache, CacheMode, CacheOptions};
//!
//! #[tokio::main]
//! async fn main() -> mmforum_cache::Result<()> {
//!     let cache = get_global_cache(CacheMode::Auto, CacheOptions::new()).await?;
//!
//!     cache.save("forum,1,topics", &vec![17u32, 23, 42], false).await;
//!     let topics: Option<Vec<u32>> = cache.restore("forum,1,topics").await;
//!     assert_eq!(topics, Some(vec![17, 23, 42]));
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Facade, backends, selector and registry |
//! | [`config`] | Modes, options bundle and host capabilities |
//! | [`error`] | Error type and structured context |

pub mod cache;
pub mod config;

pub use cache::{get_global_cache, CacheManager, CacheRegistry, CacheStats};
pub use config::{CacheMode, CacheOptions, HostCapabilities};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
