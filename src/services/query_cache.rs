use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ServiceError;

const DEFAULT_FRESH_FOR: Duration = Duration::from_secs(5 * 60);
const DEFAULT_KEEP_FOR: Duration = Duration::from_secs(30 * 60);
const DEFAULT_MAX_RETRIES: u32 = 2;
const MAX_BACKOFF: Duration = Duration::from_secs(30);

struct CacheEntry {
    value: serde_json::Value,
    fetched_at: Instant,
    last_access: Instant,
    refreshing: bool,
}

/// Read cache fronting the content queries, keyed by a semantic name
/// ("featured-properties", "enabled-areas", ...). Within the freshness window
/// the cached rows are served as-is; after it they are still served but a
/// background refetch is kicked off. Entries that nobody has read for the
/// keep window are evicted by the scheduled sweep.
///
/// Callers always get a collection back. Empty means "no data available",
/// never an error signal.
pub struct QueryCache {
    entries: DashMap<String, CacheEntry>,
    fresh_for: Duration,
    keep_for: Duration,
    max_retries: u32,
    retry_base: Duration,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::with_windows(DEFAULT_FRESH_FOR, DEFAULT_KEEP_FOR, Duration::from_secs(1))
    }

    pub fn with_windows(fresh_for: Duration, keep_for: Duration, retry_base: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            fresh_for,
            keep_for,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base,
        }
    }

    pub async fn get_or_fetch<T, F, Fut>(self: &Arc<Self>, key: &str, fetch: F) -> Vec<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<T>, ServiceError>> + Send + 'static,
    {
        let cached = match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.last_access = Instant::now();
                let stale = entry.fetched_at.elapsed() >= self.fresh_for;
                let start_refresh = stale && !entry.refreshing;
                if start_refresh {
                    entry.refreshing = true;
                }
                Some((entry.value.clone(), start_refresh))
            }
            None => None,
        };

        if let Some((value, start_refresh)) = cached {
            if start_refresh {
                let cache = self.clone();
                let key = key.to_string();
                tokio::spawn(async move {
                    match cache.fetch_with_retries(&key, &fetch).await {
                        Some(rows) => {
                            cache.store(&key, rows);
                        }
                        // Keep serving the last-known value.
                        None => {
                            if let Some(mut entry) = cache.entries.get_mut(&key) {
                                entry.refreshing = false;
                            }
                        }
                    }
                });
            }
            return decode(key, value);
        }

        match self.fetch_with_retries(key, &fetch).await {
            Some(rows) => decode(key, self.store(key, rows)),
            None => Vec::new(),
        }
    }

    async fn fetch_with_retries<T, F, Fut>(&self, key: &str, fetch: &F) -> Option<serde_json::Value>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<Vec<T>, ServiceError>> + Send,
    {
        for attempt in 0..=self.max_retries {
            match fetch().await {
                Ok(rows) => match serde_json::to_value(&rows) {
                    Ok(value) => return Some(value),
                    Err(e) => {
                        tracing::error!("Failed to encode rows for cache key {}: {}", key, e);
                        return None;
                    }
                },
                Err(e) => {
                    tracing::warn!("Fetch for cache key {} failed (attempt {}): {}", key, attempt + 1, e);
                    if attempt < self.max_retries {
                        let backoff = self.retry_base * 2u32.pow(attempt);
                        tokio::time::sleep(backoff.min(MAX_BACKOFF)).await;
                    }
                }
            }
        }
        None
    }

    fn store(&self, key: &str, value: serde_json::Value) -> serde_json::Value {
        let now = Instant::now();
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.clone(),
                fetched_at: now,
                last_access: now,
                refreshing: false,
            },
        );
        value
    }

    /// Drops entries nobody has read within the keep window. Called from the
    /// scheduled maintenance job.
    pub fn evict_idle(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.last_access.elapsed() < self.keep_for);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: serde_json::Value) -> Vec<T> {
    match serde_json::from_value(value) {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!("Discarding undecodable cache entry {}: {}", key, e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache(fresh_ms: u64, keep_ms: u64) -> Arc<QueryCache> {
        Arc::new(QueryCache::with_windows(
            Duration::from_millis(fresh_ms),
            Duration::from_millis(keep_ms),
            Duration::from_millis(1),
        ))
    }

    #[tokio::test]
    async fn fresh_entries_are_served_without_refetching() {
        let cache = cache(10_000, 60_000);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let fetch = move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec!["a".to_string(), "b".to_string()])
            }
        };
        let first: Vec<String> = cache.get_or_fetch("k", fetch.clone()).await;
        let second: Vec<String> = cache.get_or_fetch("k", fetch).await;
        assert_eq!(first, vec!["a", "b"]);
        assert_eq!(second, vec!["a", "b"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_entries_serve_cached_and_refresh_in_background() {
        let cache = cache(5, 60_000);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let fetch = move || {
            let calls = calls_clone.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![format!("gen-{}", n)])
            }
        };
        let first: Vec<String> = cache.get_or_fetch("k", fetch.clone()).await;
        assert_eq!(first, vec!["gen-0"]);
        tokio::time::sleep(Duration::from_millis(20)).await;
        // Stale read: still the old value, but a refetch starts.
        let second: Vec<String> = cache.get_or_fetch("k", fetch.clone()).await;
        assert_eq!(second, vec!["gen-0"]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let third: Vec<String> = cache.get_or_fetch("k", fetch).await;
        assert_eq!(third, vec!["gen-1"]);
    }

    #[tokio::test]
    async fn exhausted_retries_fall_back_to_empty() {
        let cache = cache(10_000, 60_000);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let fetch = move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<Vec<String>, _>(ServiceError::Upstream("down".into()))
            }
        };
        let rows: Vec<String> = cache.get_or_fetch("k", fetch).await;
        assert!(rows.is_empty());
        // Initial attempt plus two retries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_serving_last_known_value() {
        let cache = cache(5, 60_000);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let fetch = move || {
            let calls = calls_clone.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(vec!["good".to_string()])
                } else {
                    Err(ServiceError::Upstream("down".into()))
                }
            }
        };
        let _: Vec<String> = cache.get_or_fetch("k", fetch.clone()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let stale: Vec<String> = cache.get_or_fetch("k", fetch.clone()).await;
        assert_eq!(stale, vec!["good"]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let after_failed_refresh: Vec<String> = cache.get_or_fetch("k", fetch).await;
        assert_eq!(after_failed_refresh, vec!["good"]);
    }

    #[tokio::test]
    async fn idle_entries_are_evicted() {
        let cache = cache(10_000, 20);
        let fetch = || async { Ok(vec![1i32]) };
        let _: Vec<i32> = cache.get_or_fetch("k", fetch).await;
        assert_eq!(cache.len(), 1);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.evict_idle(), 1);
        assert_eq!(cache.len(), 0);
    }
}
