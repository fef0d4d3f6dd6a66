//! Small injected caches. No module-level globals: each cache is owned by
//! the service that needs it and carries an explicit capacity and lifetime.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Remembers recently processed external event ids so replayed deliveries
/// can be acknowledged without touching storage.
///
/// Purely an optimization: reconciliation is idempotent regardless, so the
/// eviction policy is allowed to forget early. Entries expire after `ttl`;
/// when the map outgrows `capacity` the expired entries are swept, and if
/// everything is still live the cache is reset rather than grown.
#[derive(Debug)]
pub struct DedupeCache {
    entries: DashMap<String, Instant>,
    capacity: usize,
    ttl: Duration,
}

impl DedupeCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
            ttl,
        }
    }

    pub fn seen(&self, key: &str) -> bool {
        match self.entries.get(key) {
            Some(inserted) => inserted.elapsed() < self.ttl,
            None => false,
        }
    }

    pub fn record(&self, key: &str) {
        if self.entries.len() >= self.capacity {
            let ttl = self.ttl;
            self.entries.retain(|_, inserted| inserted.elapsed() < ttl);
            if self.entries.len() >= self.capacity {
                debug!(capacity = self.capacity, "dedupe cache full of live entries, resetting");
                self.entries.clear();
            }
        }
        self.entries.insert(key.to_string(), Instant::now());
    }
}

impl Default for DedupeCache {
    fn default() -> Self {
        // A day of provider redeliveries fits comfortably in 10k entries.
        Self::new(10_000, Duration::from_secs(24 * 3600))
    }
}
