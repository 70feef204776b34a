//! Shared artifact storage.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CacheResult;
use crate::manifest::Revalidate;

/// Status of a cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// Fresh cache hit.
    Hit,
    /// Cache miss.
    Miss,
    /// Stale hit.
    Stale,
    /// Bypass - caching disabled.
    Bypass,
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hit => write!(f, "HIT"),
            Self::Miss => write!(f, "MISS"),
            Self::Stale => write!(f, "STALE"),
            Self::Bypass => write!(f, "BYPASS"),
        }
    }
}

/// A rendered page as stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPage {
    /// Response body.
    pub body: Vec<u8>,
    /// Declared content type, if any.
    pub content_type: Option<String>,
}

impl CachedPage {
    /// Create a cached page.
    pub fn new(body: impl Into<Vec<u8>>, content_type: Option<String>) -> Self {
        Self {
            body: body.into(),
            content_type,
        }
    }
}

/// A cache entry with its freshness metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// The cached page.
    pub page: CachedPage,
    /// When the entry was created (seconds since epoch).
    pub created_at: u64,
    /// Revalidation policy recorded at write time.
    pub revalidate: Revalidate,
}

impl CacheEntry {
    /// Create an entry stamped with the current time.
    pub fn new(page: CachedPage, revalidate: Revalidate) -> Self {
        Self {
            page,
            created_at: current_timestamp(),
            revalidate,
        }
    }

    /// Get age in seconds.
    pub fn age(&self) -> u64 {
        current_timestamp().saturating_sub(self.created_at)
    }

    /// Whether the entry is past its revalidation window.
    pub fn is_stale(&self) -> bool {
        match self.revalidate {
            Revalidate::Never => false,
            Revalidate::After(window) => self.age() >= window.as_secs(),
        }
    }

    /// Bytes counted against the memory budget.
    pub fn size(&self) -> u64 {
        let content_type = self.page.content_type.as_ref().map_or(0, String::len);
        (self.page.body.len() + content_type) as u64
    }
}

/// Storage backend shared by all requests.
///
/// Implementations must be safe for concurrent reads and writes keyed by
/// cache key.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Get an entry.
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>>;

    /// Store an entry. Returns `false` when the store declined it.
    async fn set(&self, key: &str, entry: CacheEntry) -> CacheResult<bool>;

    /// Delete an entry.
    async fn delete(&self, key: &str) -> CacheResult<()>;
}

/// In-memory store with a byte budget.
///
/// A budget of zero disables the store. Entries that would push the store
/// over budget are not inserted.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, CacheEntry>,
    used_bytes: AtomicU64,
    max_bytes: u64,
}

impl MemoryStore {
    /// Create a store with a byte budget.
    pub fn with_budget(max_bytes: u64) -> Self {
        Self {
            entries: DashMap::new(),
            used_bytes: AtomicU64::new(0),
            max_bytes,
        }
    }

    /// Bytes currently stored.
    pub fn used_bytes(&self) -> u64 {
        self.used_bytes.load(Ordering::Acquire)
    }

    /// Configured budget.
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Swap `replaced` bytes for `size` bytes if the result fits the budget.
    fn reserve(&self, size: u64, replaced: u64) -> bool {
        let max_bytes = self.max_bytes;
        self.used_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                let projected = used.saturating_sub(replaced).saturating_add(size);
                (projected <= max_bytes).then_some(projected)
            })
            .is_ok()
    }

    fn release(&self, size: u64) {
        let _ = self
            .used_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                Some(used.saturating_sub(size))
            });
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> CacheResult<bool> {
        if self.max_bytes == 0 {
            return Ok(false);
        }

        let size = entry.size();
        // Accounting happens under the shard lock so the replaced size is exact.
        let stored = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut slot) => {
                let replaced = slot.get().size();
                let reserved = self.reserve(size, replaced);
                if reserved {
                    slot.insert(entry);
                }
                reserved
            }
            Entry::Vacant(slot) => {
                let reserved = self.reserve(size, 0);
                if reserved {
                    slot.insert(entry);
                }
                reserved
            }
        };

        if !stored {
            debug!(key, size, budget = self.max_bytes, "entry exceeds memory budget");
        }
        Ok(stored)
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        if let Entry::Occupied(slot) = self.entries.entry(key.to_string()) {
            let (_, entry) = slot.remove_entry();
            self.release(entry.size());
        }
        Ok(())
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
