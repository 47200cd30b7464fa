//! Cache key normalization.

use sha2::{Digest, Sha256};

/// Character the underlying stores use as an internal separator.
pub const RESERVED_SEPARATOR: char = ',';
/// Replacement for [`RESERVED_SEPARATOR`].
pub const SEPARATOR_REPLACEMENT: char = '&';

/// A caller key together with the form handed to backends.
///
/// Every backend call goes through [`CacheKey::as_str`], so save, restore and
/// delete always agree on the stored identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    raw: String,
    normalized: String,
}

impl CacheKey {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let normalized = Self::normalize(&raw);
        Self { raw, normalized }
    }

    /// Replace the reserved separator so the key is safe for every backend.
    pub fn normalize(key: &str) -> String {
        key.replace(RESERVED_SEPARATOR, &SEPARATOR_REPLACEMENT.to_string())
    }

    /// The key as the caller supplied it.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The backend-facing identifier.
    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    /// Hex SHA-256 digest of the backend identifier; used for file names.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.normalized.as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.normalized)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
