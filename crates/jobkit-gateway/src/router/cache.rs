use super::router_impl::AiResponse;
use crate::complexity::TaskComplexity;
use crate::registry::TaskCategory;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::debug;

/// Short-TTL response cache keyed by (category, complexity, prompt).
///
/// Read-through, last-writer-wins; a racing duplicate population is a
/// harmless overwrite. Streaming responses are never cached.
pub struct ResponseCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, (AiResponse, Instant)>>,
}

impl ResponseCache {
    /// Create a cache with the given time-to-live
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Cache key over the request identity
    #[must_use]
    pub fn key(category: TaskCategory, complexity: TaskComplexity, prompt: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(category.to_string().as_bytes());
        hasher.update([0]);
        hasher.update(complexity.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(prompt.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Fresh cached response for the key, if any
    #[must_use]
    pub fn get(&self, key: &str) -> Option<AiResponse> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let (response, inserted) = entries.get(key)?;
        if inserted.elapsed() > self.ttl {
            return None;
        }
        debug!(key, "response cache hit");
        Some(response.clone())
    }

    /// Store a response, replacing any previous entry for the key
    pub fn insert(&self, key: String, response: AiResponse) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        // Expired entries are dropped opportunistically on write.
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.1.elapsed() <= ttl);
        entries.insert(key, (response, Instant::now()));
    }

    /// Drop every cached response (admin surface)
    pub fn invalidate_all(&self) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}
