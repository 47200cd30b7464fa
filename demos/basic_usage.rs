//! Basic usage example
//!
//! Picks a backend from `MMFORUM_CACHE_MODE` (default `auto`), stores a few
//! values and reads them back.
//!
//! Usage:
//!   MMFORUM_CACHE_MODE=file MMFORUM_CACHE_DIR=/tmp/mm_forum RUST_LOG=debug \
//!     cargo run --example basic_usage

use mmforum_cache::{CacheMode, CacheOptions, CacheRegistry};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct ForumSummary {
    topics: u32,
    posts: u32,
    last_poster: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mode = CacheMode::from_env().unwrap_or(CacheMode::Auto);
    let options = CacheOptions::new().with_env_overrides();

    // The composition root owns the registry and hands the manager out.
    let registry = CacheRegistry::new();
    let cache = registry.get_or_init(mode, options).await?;
    println!("Using the {} backend", cache.backend_name());

    let summary = ForumSummary {
        topics: 12,
        posts: 340,
        last_poster: Some("admin".to_string()),
    };
    cache.save("forum,1,summary", &summary, true).await;
    cache.save("forum,1,closed", &false, true).await;

    let restored: Option<ForumSummary> = cache.restore("forum,1,summary").await;
    let closed: Option<bool> = cache.restore("forum,1,closed").await;
    println!("summary: {restored:?}");
    println!("closed:  {closed:?}");

    cache.delete("forum,1,summary").await;
    cache.clear_all().await;
    println!("stats:   {:?}", cache.stats());

    Ok(())
}
