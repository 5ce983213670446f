//! Bounded LRU + TTL cache for translated request payloads.

use crate::registry::Registry;
use lru::LruCache;
use rosetta_core::{Format, Result};
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub type CacheKey = [u8; 32];

struct CacheEntry {
    payload: Vec<u8>,
    expires_at: Instant,
}

/// Keyed by a SHA-256 digest over `from‖to‖model‖payload` (length-prefixed
/// so adjacent fields cannot collide). Values are defensive copies both on
/// the way in and on the way out.
///
/// A single mutex guards the map: reads mutate LRU recency, so there is no
/// read-side sharing to exploit.
pub struct TranslationCache {
    inner: Mutex<LruCache<CacheKey, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
    enabled: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub max_entries: usize,
    pub enabled: bool,
}

/// Derive the cache key for a translation input.
pub fn cache_key(from: &Format, to: &Format, model: &str, payload: &[u8]) -> CacheKey {
    let mut hasher = Sha256::new();
    for part in [from.as_str().as_bytes(), to.as_str().as_bytes(), model.as_bytes(), payload] {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    hasher.finalize().into()
}

impl TranslationCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(max_entries.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(cap)),
            ttl,
            max_entries: cap.get(),
            enabled: AtomicBool::new(true),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Look up a key. Expired entries are evicted and count as misses;
    /// a hit refreshes recency and returns a fresh copy.
    pub fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        if !self.is_enabled() {
            return None;
        }
        let mut cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match cache.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                let copy = entry.payload.clone();
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(copy)
            }
            Some(_) => {
                cache.pop(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a value. Refreshes an existing entry; evicts from the LRU end
    /// once the cache is full. No-op when disabled.
    pub fn set(&self, key: CacheKey, value: &[u8]) {
        if !self.is_enabled() {
            return;
        }
        let entry = CacheEntry {
            payload: value.to_vec(),
            expires_at: Instant::now() + self.ttl,
        };
        let mut cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        cache.put(key, entry);
    }

    pub fn get_translation(
        &self,
        from: &Format,
        to: &Format,
        model: &str,
        payload: &[u8],
    ) -> Option<Vec<u8>> {
        self.get(&cache_key(from, to, model, payload))
    }

    pub fn set_translation(
        &self,
        from: &Format,
        to: &Format,
        model: &str,
        payload: &[u8],
        translated: &[u8],
    ) {
        self.set(cache_key(from, to, model, payload), translated);
    }

    /// Wipe entries and hit/miss counters.
    pub fn clear(&self) {
        let mut cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        cache.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: self.len(),
            max_entries: self.max_entries,
            enabled: self.is_enabled(),
        }
    }
}

/// Registry wrapper that transparently probes the cache before request
/// translation and writes back on miss. Preserves the underlying registry
/// contract (identity no-op, passthrough on miss).
pub struct CachedRegistry {
    registry: std::sync::Arc<Registry>,
    cache: std::sync::Arc<TranslationCache>,
}

impl CachedRegistry {
    pub fn new(
        registry: std::sync::Arc<Registry>,
        cache: std::sync::Arc<TranslationCache>,
    ) -> Self {
        Self { registry, cache }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    pub fn translate_request(
        &self,
        from: &Format,
        to: &Format,
        model: &str,
        payload: &[u8],
        stream: bool,
    ) -> Result<Vec<u8>> {
        let key = cache_key(from, to, model, payload);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }
        let out = self
            .registry
            .translate_request(from, to, model, payload, stream)?;
        self.cache.set(key, &out);
        Ok(out)
    }
}
