use std::time::{Duration, Instant};

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::metrics::CACHE_SIZE;
use crate::models::AnalysisResponse;

// Cached analysis with timestamp
struct CacheEntry {
    response: String,
    created_at: Instant,
}

// TTL cache for analysis responses. Identical requests inside the TTL
// are answered without touching the vision backend. A zero TTL
// disables caching entirely.
pub struct AnalysisCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl AnalysisCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    // Cache key: hash of the image content (or URL) plus the
    // detection parameters that shape the response
    pub fn key(parts: &[&[u8]]) -> String {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Option<AnalysisResponse> {
        if self.ttl.is_zero() {
            return None;
        }
        let entry = self.entries.get(key)?;
        if entry.created_at.elapsed() >= self.ttl {
            return None;
        }
        serde_json::from_str(&entry.response).ok()
    }

    pub fn put(&self, key: String, response: &AnalysisResponse) {
        if self.ttl.is_zero() {
            return;
        }
        match serde_json::to_string(response) {
            Ok(json) => {
                self.entries.insert(
                    key,
                    CacheEntry {
                        response: json,
                        created_at: Instant::now(),
                    },
                );
                CACHE_SIZE.set(self.entries.len() as f64);
            }
            Err(err) => debug!(%err, "failed to serialize response for caching"),
        }
    }

    // Drops expired entries; called from the background sweep task
    pub fn purge_expired(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.created_at.elapsed() < ttl);
        CACHE_SIZE.set(self.entries.len() as f64);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
