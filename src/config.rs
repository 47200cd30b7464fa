//! Cache configuration: the requested mode, per-backend options and host
//! capabilities.
//!
//! Options can be built in code, deserialized from YAML, and then adjusted
//! from the environment:
//! - `MMFORUM_CACHE_MODE` (read by [`CacheMode::from_env`])
//! - `MMFORUM_CACHE_DIR` (file backend directory)
//! - `MMFORUM_CACHE_DB_PATH` (SQLite database file)
//! - `MMFORUM_CACHE_TABLE` (cache table name)
//! - `MMFORUM_CACHE_DISABLE_SHARED_MEMORY` (`1`/`true` hides the shared memory backend)

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default namespace under which backends are registered and partitioned.
pub const DEFAULT_NAMESPACE: &str = "mm_forum";
/// Suffix shared by every file written by the file backend.
pub const DEFAULT_FILE_SUFFIX: &str = ".mmforum_cache";
/// Default cache table.
pub const DEFAULT_TABLE_NAME: &str = "cache_hash";

/// Requested caching mode.
///
/// Parsing never fails: anything unrecognized resolves to [`CacheMode::Database`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CacheMode {
    /// Shared memory if the host has it, otherwise database.
    Auto,
    /// Same resolution as `Auto`.
    Memory,
    File,
    #[default]
    Database,
    /// Caching disabled.
    None,
}

impl CacheMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheMode::Auto => "auto",
            CacheMode::Memory => "memory",
            CacheMode::File => "file",
            CacheMode::Database => "database",
            CacheMode::None => "none",
        }
    }

    /// Reads `MMFORUM_CACHE_MODE`, if set.
    pub fn from_env() -> Option<Self> {
        std::env::var("MMFORUM_CACHE_MODE")
            .ok()
            .map(|v| Self::from(v.as_str()))
    }
}

impl From<&str> for CacheMode {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => CacheMode::Auto,
            "memory" | "apc" => CacheMode::Memory,
            "file" => CacheMode::File,
            "none" => CacheMode::None,
            _ => CacheMode::Database,
        }
    }
}

impl From<String> for CacheMode {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<CacheMode> for String {
    fn from(mode: CacheMode) -> Self {
        mode.as_str().to_string()
    }
}

impl FromStr for CacheMode {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the host offers. Probed once, explicitly, by the backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCapabilities {
    pub shared_memory: bool,
}

impl HostCapabilities {
    /// Probe the current process.
    pub fn detect() -> Self {
        let disabled = std::env::var("MMFORUM_CACHE_DISABLE_SHARED_MEMORY")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        Self {
            shared_memory: cfg!(feature = "shared-memory") && !disabled,
        }
    }

    /// A host without any optional facility.
    pub fn minimal() -> Self {
        Self {
            shared_memory: false,
        }
    }
}

/// File backend options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOptions {
    pub directory: Option<PathBuf>,
    pub suffix: String,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            directory: None,
            suffix: DEFAULT_FILE_SUFFIX.to_string(),
        }
    }
}

impl FileOptions {
    /// Configured directory, or `<tmp>/mm_forum`.
    pub fn directory_or_default(&self) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("mm_forum"))
    }
}

/// Relational table backend options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseOptions {
    /// SQLite database file. `None` keeps the table in a private in-memory
    /// database: entries do not survive a restart and are not shared between
    /// backend instances.
    pub path: Option<PathBuf>,
    pub table_name: String,
    /// Written into the `expires` column; `None` means entries never expire.
    pub default_lifetime_secs: Option<u64>,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            path: None,
            table_name: DEFAULT_TABLE_NAME.to_string(),
            default_lifetime_secs: None,
        }
    }
}

/// Options bundle passed to initialization. Each backend reads only its own
/// section; unknown keys are ignored on deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    pub namespace: String,
    pub file: FileOptions,
    pub database: DatabaseOptions,
    /// Overrides [`HostCapabilities::detect`].
    pub capabilities: Option<HostCapabilities>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            file: FileOptions::default(),
            database: DatabaseOptions::default(),
            capabilities: None,
        }
    }
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.file.directory = Some(directory.into());
        self
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database.path = Some(path.into());
        self
    }

    pub fn with_table_name(mut self, table: impl Into<String>) -> Self {
        self.database.table_name = table.into();
        self
    }

    pub fn with_capabilities(mut self, capabilities: HostCapabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    /// Effective host capabilities.
    pub fn capabilities(&self) -> HostCapabilities {
        self.capabilities.unwrap_or_else(HostCapabilities::detect)
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_context(
                format!("failed to read cache configuration: {}", e),
                ErrorContext::new()
                    .with_field_path(path.display().to_string())
                    .with_source("config"),
            )
        })?;
        Self::from_yaml_str(&content)
    }

    /// Apply `MMFORUM_CACHE_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var("MMFORUM_CACHE_DIR") {
            self.file.directory = Some(PathBuf::from(dir));
        }
        if let Ok(path) = std::env::var("MMFORUM_CACHE_DB_PATH") {
            self.database.path = Some(PathBuf::from(path));
        }
        if let Ok(table) = std::env::var("MMFORUM_CACHE_TABLE") {
            self.database.table_name = table;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!(CacheMode::from("auto"), CacheMode::Auto);
        assert_eq!(CacheMode::from("APC"), CacheMode::Memory);
        assert_eq!(CacheMode::from(" memory "), CacheMode::Memory);
        assert_eq!(CacheMode::from("file"), CacheMode::File);
        assert_eq!(CacheMode::from("none"), CacheMode::None);
        assert_eq!(CacheMode::from("database"), CacheMode::Database);
        assert_eq!(CacheMode::from("globals"), CacheMode::Database);
        assert_eq!(CacheMode::from(""), CacheMode::Database);
        assert_eq!("file".parse::<CacheMode>().unwrap(), CacheMode::File);
        assert_eq!(CacheMode::default(), CacheMode::Database);
    }

    #[test]
    fn test_options_from_yaml_ignores_unknown_keys() {
        let yaml = r#"
namespace: board
file:
  directory: /var/cache/board
  compress: true
database:
  table_name: forum_cache
  default_lifetime_secs: 600
unrelated: 42
"#;
        let opts = CacheOptions::from_yaml_str(yaml).unwrap();
        assert_eq!(opts.namespace, "board");
        assert_eq!(opts.file.directory, Some(PathBuf::from("/var/cache/board")));
        assert_eq!(opts.file.suffix, DEFAULT_FILE_SUFFIX);
        assert_eq!(opts.database.table_name, "forum_cache");
        assert_eq!(opts.database.default_lifetime_secs, Some(600));
        assert_eq!(opts.database.path, None);
        assert!(opts.capabilities.is_none());
    }

    #[test]
    fn test_mode_deserializes_leniently() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: CacheMode,
        }
        let w: Wrapper = serde_yaml::from_str("mode: something-else").unwrap();
        assert_eq!(w.mode, CacheMode::Database);
        let w: Wrapper = serde_yaml::from_str("mode: auto").unwrap();
        assert_eq!(w.mode, CacheMode::Auto);
    }

    #[test]
    fn test_options_from_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.yaml");
        std::fs::write(&path, "namespace: board\nfile:\n  suffix: .board\n").unwrap();

        let opts = CacheOptions::from_file(&path).unwrap();
        assert_eq!(opts.namespace, "board");
        assert_eq!(opts.file.suffix, ".board");
        assert_eq!(opts.database, DatabaseOptions::default());

        let err = CacheOptions::from_file(temp_dir.path().join("missing.yaml"))
            .err()
            .unwrap();
        assert!(err.is_configuration());

        std::fs::write(&path, "namespace: [unclosed").unwrap();
        assert!(CacheOptions::from_file(&path).is_err());
    }

    // Environment variables are process state; keep every assertion about them in one test.
    #[test]
    fn test_env_overrides() {
        std::env::set_var("MMFORUM_CACHE_MODE", "APC");
        std::env::set_var("MMFORUM_CACHE_DIR", "/var/cache/from-env");
        std::env::set_var("MMFORUM_CACHE_DB_PATH", "/var/lib/forum.sqlite");
        std::env::set_var("MMFORUM_CACHE_TABLE", "env_cache");

        let mode = CacheMode::from_env();
        let opts = CacheOptions::new()
            .with_namespace("board")
            .with_directory("/configured")
            .with_env_overrides();

        for var in [
            "MMFORUM_CACHE_MODE",
            "MMFORUM_CACHE_DIR",
            "MMFORUM_CACHE_DB_PATH",
            "MMFORUM_CACHE_TABLE",
        ] {
            std::env::remove_var(var);
        }

        assert_eq!(mode, Some(CacheMode::Memory));
        assert_eq!(opts.namespace, "board");
        assert_eq!(opts.file.directory, Some(PathBuf::from("/var/cache/from-env")));
        assert_eq!(opts.database.path, Some(PathBuf::from("/var/lib/forum.sqlite")));
        assert_eq!(opts.database.table_name, "env_cache");

        assert_eq!(CacheMode::from_env(), None);
        let untouched = CacheOptions::new().with_directory("/configured").with_env_overrides();
        assert_eq!(untouched.file.directory, Some(PathBuf::from("/configured")));
        assert_eq!(untouched.database, DatabaseOptions::default());
    }

    #[test]
    fn test_capability_override() {
        let opts = CacheOptions::new().with_capabilities(HostCapabilities::minimal());
        assert!(!opts.capabilities().shared_memory);
    }
}
