//! Key-value substrate shared by the feed cache and the allowlist registry.
//!
//! The substrate is atomic per key (get/set/delete) and offers no multi-key
//! transactions. Records of different kinds live under distinct key spaces
//! and are only ever listed one space at a time.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use thiserror::Error;

/// Disjoint key spaces of the substrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeySpace {
    /// Rewritten feed bodies, keyed by feed URL.
    Feed,
    /// Allowlisted article URLs, keyed by the feed URL that produced them.
    Allowlist,
}

impl KeySpace {
    pub fn prefix(self) -> &'static str {
        match self {
            KeySpace::Feed => "rss",
            KeySpace::Allowlist => "valid_urls",
        }
    }
}

/// Fully qualified substrate key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KvKey {
    pub space: KeySpace,
    pub id: String,
}

impl KvKey {
    pub fn new(space: KeySpace, id: impl Into<String>) -> Self {
        Self {
            space,
            id: id.into(),
        }
    }

    pub fn feed(id: impl Into<String>) -> Self {
        Self::new(KeySpace::Feed, id)
    }

    pub fn allowlist(id: impl Into<String>) -> Self {
        Self::new(KeySpace::Allowlist, id)
    }
}

impl fmt::Display for KvKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.space.prefix(), self.id)
    }
}

#[derive(Debug, Error)]
pub enum KvError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Asynchronous key-value substrate.
///
/// Deleting a key that does not exist succeeds. `list` returns a snapshot;
/// entries written or removed afterwards are not reflected in it.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &KvKey) -> Result<Option<Bytes>, KvError>;
    async fn set(&self, key: &KvKey, value: Bytes) -> Result<(), KvError>;
    async fn delete(&self, key: &KvKey) -> Result<(), KvError>;
    async fn list(&self, space: KeySpace) -> Result<Vec<(KvKey, Bytes)>, KvError>;
}

/// In-process substrate backed by a sharded concurrent map.
#[derive(Default)]
pub struct MemoryKv {
    entries: DashMap<KvKey, Bytes>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &KvKey) -> Result<Option<Bytes>, KvError> {
        Ok(self.entries.get(key).map(|value| value.value().clone()))
    }

    async fn set(&self, key: &KvKey, value: Bytes) -> Result<(), KvError> {
        self.entries.insert(key.clone(), value);
        Ok(())
    }

    async fn delete(&self, key: &KvKey) -> Result<(), KvError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn list(&self, space: KeySpace) -> Result<Vec<(KvKey, Bytes)>, KvError> {
        let mut snapshot: Vec<(KvKey, Bytes)> = self
            .entries
            .iter()
            .filter(|entry| entry.key().space == space)
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        // Shard iteration order is arbitrary; keep listings deterministic.
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(snapshot)
    }
}
