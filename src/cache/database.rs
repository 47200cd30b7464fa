//! Relational table backend on SQLite.
//!
//! All namespaces share one table; rows are keyed by (namespace, identifier).
//! The `expires` column holds unix seconds, `0` meaning "never".

use super::backend::CacheBackend;
use super::key::CacheKey;
use crate::config::{CacheMode, DatabaseOptions};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

static TABLE_NAME: once_cell::sync::Lazy<Regex> = once_cell::sync::Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,63}$").expect("static regex")
});

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn validate_table_name(table: &str) -> Result<()> {
    if TABLE_NAME.is_match(table) {
        Ok(())
    } else {
        Err(Error::configuration_with_context(
            format!("invalid cache table name: {:?}", table),
            ErrorContext::new()
                .with_field_path("database.table_name")
                .with_details("expected [A-Za-z_][A-Za-z0-9_]*, at most 64 characters")
                .with_source("database_cache"),
        ))
    }
}

/// SQLite-backed cache table.
#[derive(Clone)]
pub struct DatabaseCache {
    conn: Arc<Mutex<Connection>>,
    table: String,
    namespace: String,
    default_lifetime: Option<Duration>,
}

impl DatabaseCache {
    /// Open a file-backed table.
    pub fn open(path: &Path, table: &str, namespace: &str) -> Result<Self> {
        validate_table_name(table)?;
        let conn = Connection::open(path)?;
        Self::from_connection(conn, table, namespace)
    }

    /// Create a table in a private in-memory database.
    pub fn memory(table: &str, namespace: &str) -> Result<Self> {
        validate_table_name(table)?;
        Self::from_connection(Connection::open_in_memory()?, table, namespace)
    }

    /// Wrap an existing connection (e.g. to share one database between namespaces).
    pub fn from_connection(conn: Connection, table: &str, namespace: &str) -> Result<Self> {
        validate_table_name(table)?;
        Self::init_connection(&conn, table)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            table: table.to_string(),
            namespace: namespace.to_string(),
            default_lifetime: None,
        })
    }

    /// Build from the `database` options section.
    pub fn from_options(options: &DatabaseOptions, namespace: &str) -> Result<Self> {
        let cache = match options.path {
            Some(ref path) => Self::open(path, &options.table_name, namespace)?,
            None => Self::memory(&options.table_name, namespace)?,
        };
        Ok(match options.default_lifetime_secs {
            Some(secs) => cache.with_default_lifetime(Duration::from_secs(secs)),
            None => cache,
        })
    }

    pub fn with_default_lifetime(mut self, lifetime: Duration) -> Self {
        self.default_lifetime = Some(lifetime);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// A handle on the same connection and table for another namespace.
    pub fn for_namespace(&self, namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            ..self.clone()
        }
    }

    fn init_connection(conn: &Connection, table: &str) -> Result<()> {
        // WAL mode for file-backed DBs (no-op for in-memory)
        let _ = conn.execute_batch("PRAGMA journal_mode = WAL");
        let _ = conn.execute_batch("PRAGMA busy_timeout = 5000");
        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                namespace  TEXT    NOT NULL,
                identifier TEXT    NOT NULL,
                content    BLOB    NOT NULL,
                expires    INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (namespace, identifier)
            );
            CREATE INDEX IF NOT EXISTS {table}_expires ON {table} (expires);
            "#
        ))?;
        Ok(())
    }

    /// Lifetimes beyond the `i64` range saturate to "far future".
    fn expires_at(&self) -> i64 {
        match self.default_lifetime {
            Some(lifetime) => {
                let secs = i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX);
                now_secs().saturating_add(secs)
            }
            None => 0,
        }
    }

    /// Run a blocking statement off the async executor.
    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| {
                Error::storage_with_context(
                    "database connection poisoned",
                    ErrorContext::new().with_source("database_cache"),
                )
            })?;
            f(&conn).map_err(Error::from)
        })
        .await
        .map_err(|e| {
            Error::storage_with_context(
                format!("database task failed: {}", e),
                ErrorContext::new().with_source("database_cache"),
            )
        })?
    }

    /// Delete expired rows of every namespace. Returns the number removed.
    pub async fn collect_garbage(&self) -> Result<usize> {
        let sql = format!(
            "DELETE FROM {} WHERE expires > 0 AND expires <= ?1",
            self.table
        );
        let now = now_secs();
        let removed = self.run(move |conn| conn.execute(&sql, params![now])).await?;
        debug!("Collected {} expired rows from {}", removed, self.table);
        Ok(removed)
    }
}

#[async_trait]
impl CacheBackend for DatabaseCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let sql = format!(
            "SELECT content FROM {} WHERE namespace = ?1 AND identifier = ?2 \
             AND (expires = 0 OR expires > ?3)",
            self.table
        );
        let namespace = self.namespace.clone();
        let identifier = key.as_str().to_string();
        let now = now_secs();
        self.run(move |conn| {
            conn.query_row(&sql, params![namespace, identifier, now], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()
        })
        .await
    }

    async fn set(&self, key: &CacheKey, value: &[u8]) -> Result<()> {
        let sql = format!(
            r#"
            INSERT INTO {} (namespace, identifier, content, expires)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(namespace, identifier)
            DO UPDATE SET content = excluded.content, expires = excluded.expires
            "#,
            self.table
        );
        let namespace = self.namespace.clone();
        let identifier = key.as_str().to_string();
        let content = value.to_vec();
        let expires = self.expires_at();
        self.run(move |conn| conn.execute(&sql, params![namespace, identifier, content, expires]))
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        let sql = format!(
            "DELETE FROM {} WHERE namespace = ?1 AND identifier = ?2",
            self.table
        );
        let namespace = self.namespace.clone();
        let identifier = key.as_str().to_string();
        let removed = self
            .run(move |conn| conn.execute(&sql, params![namespace, identifier]))
            .await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &CacheKey) -> Result<bool> {
        let sql = format!(
            "SELECT 1 FROM {} WHERE namespace = ?1 AND identifier = ?2 \
             AND (expires = 0 OR expires > ?3)",
            self.table
        );
        let namespace = self.namespace.clone();
        let identifier = key.as_str().to_string();
        let now = now_secs();
        let found = self
            .run(move |conn| {
                conn.query_row(&sql, params![namespace, identifier, now], |row| {
                    row.get::<_, i64>(0)
                })
                .optional()
            })
            .await?;
        Ok(found.is_some())
    }

    async fn clear(&self) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE namespace = ?1", self.table);
        let namespace = self.namespace.clone();
        let removed = self
            .run(move |conn| conn.execute(&sql, params![namespace]))
            .await?;
        debug!(
            "Cleared {} rows of namespace {} from {}",
            removed, self.namespace, self.table
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "database"
    }

    fn mode(&self) -> Option<CacheMode> {
        Some(CacheMode::Database)
    }
}
