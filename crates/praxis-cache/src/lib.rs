//! Memoization layer for expensive, idempotent computations.
//!
//! The engine issues the same external calls repeatedly: safety analyses of
//! identical content, completions for identical prompts, prompt-template
//! renders. [`MemoCache`] avoids repeating them. Each named cache carries its
//! own time-to-live and maximum-entry configuration; expiry is evaluated
//! lazily on access and the oldest-inserted entry is evicted on overflow.

use praxis_core::PraxisResult;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

struct Inner<V> {
    entries: HashMap<String, Entry<V>>,
    // Insertion order, oldest first. Keys are unique within the deque.
    order: VecDeque<String>,
}

/// A named key→value cache with TTL expiry and bounded capacity.
///
/// Mutation is internally synchronized; callers never lock. Values must be
/// `Clone` because reads hand out copies while the entry stays cached.
pub struct MemoCache<V> {
    name: String,
    ttl: Duration,
    capacity: usize,
    inner: Mutex<Inner<V>>,
}

impl<V: Clone> MemoCache<V> {
    /// Create a named cache with the given TTL and maximum entry count.
    pub fn new(name: impl Into<String>, ttl: Duration, capacity: usize) -> Self {
        Self {
            name: name.into(),
            ttl,
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Name of this cache, used in log output.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the cached value for `key`, or run `compute` and cache its
    /// result.
    ///
    /// An entry past its TTL is treated as absent and replaced by a fresh
    /// computation. If `compute` fails, nothing is cached and the error is
    /// propagated; failures are never memoized.
    ///
    /// Concurrent callers racing on the same uncached key may each invoke
    /// `compute`; there is no single-flight deduplication. The memoized
    /// calls are idempotent and side-effect free, so the only cost is the
    /// duplicated work.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, compute: F) -> PraxisResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PraxisResult<V>>,
    {
        if let Some(value) = self.get(key).await {
            debug!(cache = %self.name, key, "cache hit");
            return Ok(value);
        }

        debug!(cache = %self.name, key, "cache miss, computing");
        let value = compute().await?;
        self.insert(key, value.clone()).await;
        Ok(value)
    }

    /// Look up `key`, removing it if expired. Misses return `None`.
    pub async fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock().await;
        match inner.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                inner.entries.remove(key);
                inner.order.retain(|k| k != key);
                None
            }
            None => None,
        }
    }

    /// Insert `value` under `key`, evicting the oldest-inserted entries if
    /// the cache is full.
    pub async fn insert(&self, key: &str, value: V) {
        let mut inner = self.inner.lock().await;
        let expires_at = Instant::now() + self.ttl;

        if inner.entries.contains_key(key) {
            inner.order.retain(|k| k != key);
        }
        inner.order.push_back(key.to_string());
        inner.entries.insert(key.to_string(), Entry { value, expires_at });

        while inner.entries.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
                debug!(cache = %self.name, key = %oldest, "evicted oldest entry");
            } else {
                break;
            }
        }
    }

    /// Remove `key` if present. Returns whether an entry existed.
    pub async fn invalidate(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().await;
        inner.order.retain(|k| k != key);
        inner.entries.remove(key).is_some()
    }

    /// Drop all expired entries. Returns how many were removed.
    ///
    /// Expiry is already handled lazily on access; this exists so the
    /// background maintenance sweep can reclaim memory for keys that are
    /// never read again.
    pub async fn evict_expired(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let Inner { entries, order } = &mut *inner;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        order.retain(|k| entries.contains_key(k));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(cache = %self.name, removed, "swept expired entries");
        }
        removed
    }

    /// Number of live (possibly expired but unswept) entries.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Derive a cache key from a call's identity and arguments.
///
/// The parts are hashed rather than concatenated so arbitrarily large
/// payloads (full prompts, whole request bodies) produce fixed-size keys.
pub fn args_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use praxis_core::PraxisError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_compute_runs_at_most_once_within_ttl() {
        let cache: MemoCache<String> =
            MemoCache::new("test", Duration::from_secs(60), 10);
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_compute("k", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("v".to_string())
                })
                .await
                .unwrap();
            assert_eq!(value, "v");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_recomputed() {
        let cache: MemoCache<u32> =
            MemoCache::new("test", Duration::from_millis(20), 10);
        let calls = AtomicUsize::new(0);

        let compute = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(7u32)
        };
        cache.get_or_compute("k", compute).await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        cache
            .get_or_compute("k", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(8u32)
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.get("k").await, Some(8));
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let cache: MemoCache<u32> = MemoCache::new("test", Duration::from_secs(60), 10);
        let calls = AtomicUsize::new(0);

        let result = cache
            .get_or_compute("k", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(PraxisError::Compute("upstream timeout".into()))
            })
            .await;
        assert!(result.is_err());
        assert!(cache.is_empty().await);

        // Next call retries the computation.
        let value = cache
            .get_or_compute("k", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(42u32)
            })
            .await
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_overflow_evicts_oldest_inserted() {
        let cache: MemoCache<u32> = MemoCache::new("test", Duration::from_secs(60), 2);
        cache.insert("a", 1).await;
        cache.insert("b", 2).await;
        cache.insert("c", 3).await;

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.get("b").await, Some(2));
        assert_eq!(cache.get("c").await, Some(3));
    }

    #[tokio::test]
    async fn test_reinsert_refreshes_order() {
        let cache: MemoCache<u32> = MemoCache::new("test", Duration::from_secs(60), 2);
        cache.insert("a", 1).await;
        cache.insert("b", 2).await;
        cache.insert("a", 10).await; // "a" is now the newest insertion
        cache.insert("c", 3).await;

        assert_eq!(cache.get("b").await, None);
        assert_eq!(cache.get("a").await, Some(10));
    }

    #[tokio::test]
    async fn test_evict_expired_sweep() {
        let cache: MemoCache<u32> =
            MemoCache::new("test", Duration::from_millis(20), 10);
        cache.insert("a", 1).await;
        cache.insert("b", 2).await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        cache.insert("c", 3).await;

        let removed = cache.evict_expired().await;
        assert_eq!(removed, 2);
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get("c").await, Some(3));
    }

    #[tokio::test]
    async fn test_invalidate() {
        let cache: MemoCache<u32> = MemoCache::new("test", Duration::from_secs(60), 10);
        cache.insert("a", 1).await;
        assert!(cache.invalidate("a").await);
        assert!(!cache.invalidate("a").await);
        assert_eq!(cache.get("a").await, None);
    }

    #[test]
    fn test_args_key_is_stable_and_distinct() {
        let k1 = args_key(&["complete", "prompt text", "0.7"]);
        let k2 = args_key(&["complete", "prompt text", "0.7"]);
        let k3 = args_key(&["complete", "prompt text", "0.2"]);
        assert_eq!(k1, k2);
        assert_ne!(k1, k3);
        assert_eq!(k1.len(), 64);
    }

    #[test]
    fn test_args_key_boundary_not_ambiguous() {
        // ["ab", "c"] must differ from ["a", "bc"]
        assert_ne!(args_key(&["ab", "c"]), args_key(&["a", "bc"]));
    }
}
