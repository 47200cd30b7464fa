use mmforum_cache::cache::{BackendSelector, CacheKey, CacheManager, DatabaseCache, FileCache};
use mmforum_cache::cache::CacheBackend;
use mmforum_cache::{CacheMode, CacheOptions, HostCapabilities};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Topic {
    uid: u32,
    title: String,
    replies: Vec<String>,
    closed: bool,
}

fn topic() -> Topic {
    Topic {
        uid: 42,
        title: "Welcome to the board".to_string(),
        replies: vec!["first".to_string(), "second, with a comma".to_string()],
        closed: false,
    }
}

/// One manager per persistent backend, each with its own selector and namespace.
async fn managers(dir: &Path) -> Vec<CacheManager> {
    let mut out = Vec::new();
    for (mode, caps, ns) in [
        (CacheMode::Memory, HostCapabilities { shared_memory: true }, "rt-memory"),
        (CacheMode::File, HostCapabilities::minimal(), "rt-file"),
        (CacheMode::Database, HostCapabilities::minimal(), "rt-database"),
    ] {
        let options = CacheOptions::new()
            .with_namespace(ns)
            .with_directory(dir.join(ns))
            .with_capabilities(caps);
        let manager = CacheManager::initialize_with(&BackendSelector::new(), mode, options)
            .await
            .unwrap();
        out.push(manager);
    }
    out
}

#[tokio::test]
async fn test_round_trip_on_every_backend() {
    let temp_dir = TempDir::new().unwrap();
    let managers = managers(temp_dir.path()).await;
    let names: Vec<_> = managers.iter().map(|m| m.backend_name()).collect();
    assert_eq!(names, vec!["memory", "file", "database"]);

    for cache in &managers {
        assert!(cache.save("topic,42", &topic(), false).await);
        assert!(cache.save("flag,closed", &false, false).await);
        assert!(cache.save("count", &0u64, false).await);
        assert!(cache.save("empty", "", false).await);

        assert_eq!(cache.restore::<Topic>("topic,42").await, Some(topic()), "{}", cache.backend_name());
        assert_eq!(cache.restore::<bool>("flag,closed").await, Some(false), "{}", cache.backend_name());
        assert_eq!(cache.restore::<u64>("count").await, Some(0));
        assert_eq!(cache.restore::<String>("empty").await.as_deref(), Some(""));
    }
}

#[tokio::test]
async fn test_round_trip_survives_a_fresh_manager() {
    let temp_dir = TempDir::new().unwrap();
    let options = CacheOptions::new()
        .with_namespace("rt-fresh")
        .with_directory(temp_dir.path());

    let selector = BackendSelector::new();
    let writer = CacheManager::initialize_with(&selector, CacheMode::File, options.clone())
        .await
        .unwrap();
    assert!(writer.save("flag", &false, false).await);

    // New manager, empty local map: the value must come from the files.
    let reader = CacheManager::initialize_with(&BackendSelector::new(), CacheMode::File, options)
        .await
        .unwrap();
    assert_eq!(reader.local_len(), 0);
    assert_eq!(reader.restore::<bool>("flag").await, Some(false));
    assert_eq!(reader.stats().local_hits, 0);
}

#[tokio::test]
async fn test_unknown_keys_are_absent_everywhere() {
    let temp_dir = TempDir::new().unwrap();
    let mut managers = managers(temp_dir.path()).await;
    managers.push(
        CacheManager::initialize_with(
            &BackendSelector::new(),
            CacheMode::None,
            CacheOptions::new().with_namespace("rt-none"),
        )
        .await
        .unwrap(),
    );

    for cache in &managers {
        assert_eq!(cache.restore::<String>("never-saved").await, None);
        assert_eq!(cache.stats().misses, 1);
    }
}

#[tokio::test]
async fn test_delete_beats_the_local_map() {
    let temp_dir = TempDir::new().unwrap();
    for cache in managers(temp_dir.path()).await {
        assert!(cache.save("post,9", "body", false).await);
        assert_eq!(cache.restore::<String>("post,9").await.as_deref(), Some("body"));

        assert!(cache.delete("post,9").await);
        assert_eq!(cache.restore::<String>("post,9").await, None, "{}", cache.backend_name());
    }
}

#[tokio::test]
async fn test_null_backend_is_provably_inert() {
    let cache = CacheManager::initialize_with(
        &BackendSelector::new(),
        CacheMode::None,
        CacheOptions::new().with_namespace("rt-inert"),
    )
    .await
    .unwrap();

    for i in 0..10 {
        let key = format!("key{}", i);
        assert!(cache.save(&key, &i, true).await);
        assert_eq!(cache.restore::<i32>(&key).await, None);
    }
    assert_eq!(cache.stats().hits, 0);
}

#[tokio::test]
async fn test_keys_with_separator_stay_reachable() {
    let db = Arc::new(DatabaseCache::memory("cache_hash", "rt-separator").unwrap());
    let cache = CacheManager::new(db.clone(), CacheOptions::new().with_namespace("rt-separator"));

    assert!(cache.save("forum,1,page,2", &"listing", false).await);
    // Stored under the normalized identifier.
    assert!(db.exists(&CacheKey::new("forum&1&page&2")).await.unwrap());
    assert_eq!(
        cache.restore::<String>("forum,1,page,2").await.as_deref(),
        Some("listing")
    );
    assert!(cache.delete("forum,1,page,2").await);
    assert!(!db.exists(&CacheKey::new("forum&1&page&2")).await.unwrap());
}

#[tokio::test]
async fn test_file_clear_all_removes_every_entry() {
    let temp_dir = TempDir::new().unwrap();
    let cache = CacheManager::initialize_with(
        &BackendSelector::new(),
        CacheMode::File,
        CacheOptions::new()
            .with_namespace("rt-file-clear")
            .with_directory(temp_dir.path())
            .with_capabilities(HostCapabilities::minimal()),
    )
    .await
    .unwrap();

    let keys: Vec<String> = (0..20).map(|i| format!("thread,{}", i)).collect();
    for key in &keys {
        assert!(cache.save(key, key, false).await);
    }

    assert!(cache.clear_all().await);
    for key in &keys {
        assert_eq!(cache.restore::<String>(key).await, None);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_file_clear_all_tolerates_concurrent_deleter() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().to_path_buf();
    let cache = CacheManager::initialize_with(
        &BackendSelector::new(),
        CacheMode::File,
        CacheOptions::new()
            .with_namespace("rt-file-race")
            .with_directory(&dir)
            .with_capabilities(HostCapabilities::minimal()),
    )
    .await
    .unwrap();

    for i in 0..200 {
        assert!(cache.save(&format!("k{}", i), &i, false).await);
    }

    let deleter = tokio::task::spawn_blocking(move || {
        for entry in std::fs::read_dir(&dir).unwrap().flatten() {
            let _ = std::fs::remove_file(entry.path());
        }
    });

    assert!(cache.clear_all().await);
    deleter.await.unwrap();
    for i in 0..200 {
        assert_eq!(cache.restore::<i32>(&format!("k{}", i)).await, None);
    }
}

#[tokio::test]
async fn test_auto_without_shared_memory_lands_in_the_database() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("forum.sqlite");
    let options = CacheOptions::new()
        .with_namespace("rt-auto")
        .with_database_path(&db_path)
        .with_capabilities(HostCapabilities::minimal());

    let cache = CacheManager::initialize_with(&BackendSelector::new(), CacheMode::Auto, options)
        .await
        .unwrap();
    assert!(cache.save("probe", &"where am I", false).await);

    // Read the table directly: the entry is there.
    let table = DatabaseCache::open(&db_path, "cache_hash", "rt-auto").unwrap();
    assert_eq!(
        table.get(&CacheKey::new("probe")).await.unwrap(),
        Some(br#""where am I""#.to_vec())
    );
}

#[tokio::test]
async fn test_configured_directory_is_normalized() {
    let temp_dir = TempDir::new().unwrap();
    let configured = temp_dir.path().join("foo").join("..").join("bar");
    let cache = CacheManager::initialize_with(
        &BackendSelector::new(),
        CacheMode::File,
        CacheOptions::new()
            .with_namespace("rt-normalize")
            .with_directory(&configured),
    )
    .await
    .unwrap();
    assert!(cache.save("k", &1, false).await);

    let files = FileCache::at(temp_dir.path().join("bar"), ".mmforum_cache");
    assert!(files.exists(&CacheKey::new("k")).await.unwrap());
    assert!(!temp_dir.path().join("foo").exists());
}

#[tokio::test]
async fn test_clear_all_sweeps_files_left_by_an_earlier_backend() {
    let temp_dir = TempDir::new().unwrap();
    let files = FileCache::new(temp_dir.path(), ".mmforum_cache").await.unwrap();
    files.set(&CacheKey::new("stale"), b"1").await.unwrap();

    let cache = CacheManager::initialize_with(
        &BackendSelector::new(),
        CacheMode::Database,
        CacheOptions::new()
            .with_namespace("rt-sweep")
            .with_directory(temp_dir.path())
            .with_capabilities(HostCapabilities::minimal()),
    )
    .await
    .unwrap();
    assert!(cache.clear_all().await);
    assert!(!files.exists(&CacheKey::new("stale")).await.unwrap());
}
