//! Bounded in-memory store with least-recently-used eviction.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use lru::LruCache;
use tracing::debug;

use super::StoreAdapter;
use crate::error::HyvError;
use crate::types::Message;
use crate::util::id::generate_id;

/// Default number of messages kept before eviction starts.
pub const DEFAULT_CAPACITY: usize = 50;

/// Best-effort in-memory message cache.
///
/// Once `capacity` messages are held, each `set` silently evicts the least
/// recently used entry. `get` counts as a use. Treat this store as a cache,
/// never as a durability guarantee: a slow consumer can find its message
/// evicted by a concurrent pipeline.
pub struct MemoryStore {
    entries: Mutex<LruCache<String, Message>>,
}

impl MemoryStore {
    /// Create a store with [`DEFAULT_CAPACITY`].
    pub fn new() -> Self {
        Self::bounded(NonZeroUsize::new(DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN))
    }

    /// Create a store holding at most `capacity` messages.
    pub fn with_capacity(capacity: usize) -> Result<Self, HyvError> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            HyvError::InvalidArgument("memory store capacity must be at least 1".to_string())
        })?;
        Ok(Self::bounded(capacity))
    }

    fn bounded(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    // Poisoning only means a holder panicked; the cache itself stays consistent.
    fn entries(&self) -> MutexGuard<'_, LruCache<String, Message>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.entries().cap().get()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `id` is currently held. Does not affect recency.
    pub fn contains(&self, id: &str) -> bool {
        self.entries().contains(id)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[async_trait]
impl StoreAdapter for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn set(&self, message: &Message) -> Result<String, HyvError> {
        let id = generate_id();
        let evicted = self.entries().push(id.clone(), message.clone());
        if let Some((evicted_id, _)) = evicted {
            debug!(evicted = %evicted_id, "memory store at capacity, evicted entry");
        }
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Message, HyvError> {
        self.entries()
            .get(id)
            .cloned()
            .ok_or_else(|| HyvError::NotFound(id.to_string()))
    }
}
