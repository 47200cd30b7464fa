//! File cache backend: one file per key in a dedicated directory.

use super::backend::CacheBackend;
use super::key::CacheKey;
use crate::config::CacheMode;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);
const TEMP_SUFFIX: &str = ".tmp";

/// Collapse `.` and `..` segments without touching the filesystem.
///
/// `foo/../bar` becomes `bar`. A `..` that would climb above the root is
/// dropped; leading `..` on a relative path is kept.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Cache storing each entry as `<dir>/<sha256(key)><suffix>`.
#[derive(Debug, Clone)]
pub struct FileCache {
    directory: PathBuf,
    suffix: String,
}

impl FileCache {
    /// Normalize `directory` and make sure it exists.
    pub async fn new(directory: impl AsRef<Path>, suffix: impl Into<String>) -> Result<Self> {
        let directory = normalize_path(directory.as_ref());
        fs::create_dir_all(&directory).await.map_err(|e| {
            Error::storage_with_context(
                format!("cannot create cache directory: {}", e),
                ErrorContext::new()
                    .with_field_path("file.directory")
                    .with_details(directory.display().to_string())
                    .with_source("file_cache"),
            )
        })?;
        Ok(Self {
            directory,
            suffix: suffix.into(),
        })
    }

    /// Handle on `directory` without creating it. Used to sweep a directory
    /// left behind by an earlier backend choice.
    pub fn at(directory: impl AsRef<Path>, suffix: impl Into<String>) -> Self {
        Self {
            directory: normalize_path(directory.as_ref()),
            suffix: suffix.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Path of the file holding `key`.
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.directory
            .join(format!("{}{}", key.digest(), self.suffix))
    }

    fn temp_path(&self, key: &CacheKey) -> PathBuf {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.directory.join(format!(
            "{}.{}.{}{}",
            key.digest(),
            std::process::id(),
            n,
            TEMP_SUFFIX
        ))
    }

    fn is_owned(&self, name: &str) -> bool {
        name.ends_with(&self.suffix) || is_temp_name(name)
    }
}

/// Matches `<sha256 hex>.<pid>.<n>.tmp`, the names [`FileCache`] writes before renaming.
fn is_temp_name(name: &str) -> bool {
    let Some(stem) = name.strip_suffix(TEMP_SUFFIX) else {
        return false;
    };
    let mut parts = stem.split('.');
    let digest_ok = parts
        .next()
        .map(|d| d.len() == 64 && d.bytes().all(|b| b.is_ascii_hexdigit()))
        .unwrap_or(false);
    let rest: Vec<&str> = parts.collect();
    digest_ok
        && rest.len() == 2
        && rest
            .iter()
            .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
}

#[async_trait]
impl CacheBackend for FileCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        match fs::read(self.entry_path(key)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &CacheKey, value: &[u8]) -> Result<()> {
        // Write-then-rename so readers never see a partial file.
        let temp_path = self.temp_path(key);
        let mut file = fs::File::create(&temp_path).await?;
        let written = match file.write_all(value).await {
            Ok(()) => file.sync_all().await,
            Err(e) => Err(e),
        };
        drop(file);
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        if let Err(e) = fs::rename(&temp_path, self.entry_path(key)).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &CacheKey) -> Result<bool> {
        match fs::metadata(self.entry_path(key)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear(&self) -> Result<()> {
        let mut entries = match fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0usize;
        let mut failed = 0usize;
        while let Some(entry) = entries.next_entry().await? {
            // Cache files and temp files left by interrupted writes.
            if !self.is_owned(&entry.file_name().to_string_lossy()) {
                continue;
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                // Another process got there first.
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to remove cache file {:?}: {}", entry.path(), e);
                    failed += 1;
                }
            }
        }

        debug!(
            "Cleared file cache at {:?}: {} removed, {} failed",
            self.directory, removed, failed
        );
        if failed > 0 {
            return Err(Error::storage_with_context(
                format!("{} cache file(s) could not be removed", failed),
                ErrorContext::new()
                    .with_details(self.directory.display().to_string())
                    .with_source("file_cache"),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }

    fn mode(&self) -> Option<CacheMode> {
        Some(CacheMode::File)
    }
}
