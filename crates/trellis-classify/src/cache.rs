//! Classification cache keyed by request content hash

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::bridge::Classification;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub classification: Classification,
    pub timestamp: Instant,
    pub ttl: Option<Duration>,
}

impl CacheEntry {
    pub fn is_expired(&self) -> bool {
        self.ttl.is_some_and(|ttl| self.timestamp.elapsed() > ttl)
    }
}

/// Shared between concurrent classification tasks; entries never expire
/// unless a TTL is set.
#[derive(Debug, Default)]
pub struct ClassificationCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Option<Duration>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl ClassificationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    pub fn get(&self, key: &str) -> Option<Classification> {
        let found = self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.classification.clone());
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub fn insert(&self, key: impl Into<String>, classification: Classification) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                classification,
                timestamp: Instant::now(),
                ttl: self.ttl,
            },
        );
    }

    pub fn cleanup_expired(&self) {
        self.entries.retain(|_, entry| !entry.is_expired());
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            total_entries: self.entries.len(),
            expired_entries: self.entries.iter().filter(|e| e.is_expired()).count(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub hits: usize,
    pub misses: usize,
}
