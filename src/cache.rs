//! Idempotent response cache (cache-aside, TTL bounded, insertion-order eviction).

use axum::body::Bytes;
use axum::http::{Method, StatusCode};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest response body the cache will buffer and keep.
pub const MAX_CACHEABLE_BODY_BYTES: u64 = 1024 * 1024;

/// A response body kept for replay.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub body: Bytes,
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub stored_at_millis: u64,
}

/// A successful lookup: the response plus how long it stays valid.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub response: CachedResponse,
    pub remaining_ttl_millis: u64,
}

impl CacheHit {
    /// Remaining lifetime for the `X-Cache-TTL` header.
    pub fn remaining_ttl_secs(&self) -> u64 {
        (self.remaining_ttl_millis as f64 / 1000.0).round() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub ttl_ms: u64,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Deserialize)]
struct SuccessMarker {
    success: bool,
}

struct Inner {
    entries: IndexMap<String, CachedResponse>,
    hits: u64,
    misses: u64,
}

pub struct ResponseCache {
    ttl_millis: u64,
    capacity: usize,
    exclude_paths: Vec<String>,
    inner: Mutex<Inner>,
}

impl ResponseCache {
    pub fn new(ttl: Duration, capacity: usize, exclude_paths: Vec<String>) -> Self {
        Self {
            ttl_millis: ttl.as_millis() as u64,
            capacity,
            exclude_paths,
            inner: Mutex::new(Inner {
                entries: IndexMap::with_capacity(capacity),
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Only safe reads of shared (non user-specific, non operational) paths.
    pub fn is_eligible(&self, method: &Method, path: &str) -> bool {
        *method == Method::GET && !self.exclude_paths.iter().any(|p| path.contains(p.as_str()))
    }

    pub fn lookup(&self, path: &str, query: Option<&str>, now_millis: u64) -> Option<CacheHit> {
        self.lookup_key(&cache_key(path, query), now_millis)
    }

    pub fn lookup_key(&self, key: &str, now_millis: u64) -> Option<CacheHit> {
        let mut inner = self.inner.lock();

        let hit = inner.entries.get(key).and_then(|entry| {
            let age = now_millis.saturating_sub(entry.stored_at_millis);
            // Expired entries stay put until evicted or overwritten.
            (age < self.ttl_millis).then(|| CacheHit {
                response: entry.clone(),
                remaining_ttl_millis: self.ttl_millis - age,
            })
        });

        match hit {
            Some(_) => inner.hits += 1,
            None => inner.misses += 1,
        }

        hit
    }

    /// Store a handler's response if it is a structurally successful 200.
    /// Returns whether the body was cached.
    pub fn store(
        &self,
        path: &str,
        query: Option<&str>,
        status: StatusCode,
        content_type: Option<String>,
        body: Bytes,
        now_millis: u64,
    ) -> bool {
        self.store_key(cache_key(path, query), status, content_type, body, now_millis)
    }

    pub fn store_key(
        &self,
        key: String,
        status: StatusCode,
        content_type: Option<String>,
        body: Bytes,
        now_millis: u64,
    ) -> bool {
        if status != StatusCode::OK
            || body.len() as u64 > MAX_CACHEABLE_BODY_BYTES
            || !is_success_body(&body)
        {
            return false;
        }

        let entry = CachedResponse {
            body,
            status,
            content_type,
            stored_at_millis: now_millis,
        };

        let mut inner = self.inner.lock();
        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            inner.entries.shift_remove_index(0);
        }
        // An existing key keeps its original insertion slot.
        inner.entries.insert(key, entry);

        true
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len(),
            capacity: self.capacity,
            ttl_ms: self.ttl_millis,
            hits: inner.hits,
            misses: inner.misses,
        }
    }
}

/// Deterministic key: the path plus query parameters sorted by name, then value.
pub fn cache_key(path: &str, query: Option<&str>) -> String {
    let mut params: Vec<&str> = query
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .collect();

    if params.is_empty() {
        return path.to_string();
    }

    params.sort_by(|a, b| {
        let (a_name, a_value) = a.split_once('=').unwrap_or((*a, ""));
        let (b_name, b_value) = b.split_once('=').unwrap_or((*b, ""));
        a_name.cmp(b_name).then(a_value.cmp(b_value))
    });

    format!("{}?{}", path, params.join("&"))
}

/// Malformed or non-object bodies are simply not cacheable.
fn is_success_body(body: &[u8]) -> bool {
    serde_json::from_slice::<SuccessMarker>(body)
        .map(|marker| marker.success)
        .unwrap_or(false)
}
