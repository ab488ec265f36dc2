//! Time-bounded cache of query results keyed by query identity
use crate::core::db::RawTable;
use crate::core::{DashError, Result};
use moka::sync::Cache;
use std::cell::Cell;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub type QueryKey = &'static str;

/// Longest TTL a cache entry may carry; longer requests are clamped
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Query results held for a fixed TTL.
///
/// Concurrent lookups of a key that is being fetched wait for that single
/// fetch and share its outcome. Failed fetches are handed to every waiter
/// but never stored.
#[derive(Clone)]
pub struct QueryCache {
    inner: Cache<QueryKey, Arc<RawTable>>,
    ttl: Duration,
}

impl QueryCache {
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        let ttl = ttl.min(MAX_TTL);
        let inner = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(max_capacity.max(1))
            .build();
        QueryCache { inner, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached table for `key`, running `fetch` when it is absent
    /// or expired.
    pub fn get_or_fetch<F>(&self, key: QueryKey, fetch: F) -> Result<Arc<RawTable>>
    where
        F: FnOnce() -> Result<Arc<RawTable>>,
    {
        let missed = Cell::new(false);
        let result = self.inner.try_get_with(key, || {
            missed.set(true);
            fetch()
        });
        if missed.get() {
            debug!(query = key, "query cache miss");
        } else {
            debug!(query = key, "query cache hit");
        }
        result.map_err(|e| DashError::QueryFailed(e.detail()))
    }

    pub fn get(&self, key: QueryKey) -> Option<Arc<RawTable>> {
        self.inner.get(&key)
    }

    pub fn contains(&self, key: QueryKey) -> bool {
        self.inner.contains_key(&key)
    }

    pub fn invalidate(&self, key: QueryKey) {
        self.inner.invalidate(&key);
    }

    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    fn table(n: i64) -> Arc<RawTable> {
        Arc::new(RawTable::new(vec!["n".to_string()], vec![vec![Value::Integer(n)]]))
    }

    #[test]
    fn test_oversized_ttl_is_clamped() {
        let cache = QueryCache::new(Duration::from_secs(100_000_000_000), 8);
        assert_eq!(cache.ttl(), MAX_TTL);
        assert_eq!(cache.get_or_fetch("flood", || Ok(table(1))).unwrap().len(), 1);
    }

    #[test]
    fn test_hit_within_ttl() {
        let cache = QueryCache::new(Duration::from_secs(600), 8);
        let calls = AtomicUsize::new(0);
        let fetch = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(table(1))
        };

        let first = cache.get_or_fetch("cold-wave", fetch).unwrap();
        let second = cache
            .get_or_fetch("cold-wave", || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(table(2))
            })
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        assert!(cache.contains("cold-wave"));
    }

    #[test]
    fn test_refetch_after_expiry() {
        let cache = QueryCache::new(Duration::from_millis(30), 8);
        cache.get_or_fetch("flood", || Ok(table(1))).unwrap();

        thread::sleep(Duration::from_millis(60));
        let refreshed = cache.get_or_fetch("flood", || Ok(table(2))).unwrap();
        assert_eq!(refreshed.rows[0][0], Value::Integer(2));
    }

    #[test]
    fn test_failures_are_not_stored() {
        let cache = QueryCache::new(Duration::from_secs(600), 8);
        let err = cache
            .get_or_fetch("incidents", || Err(DashError::QueryFailed("timeout".to_string())))
            .unwrap_err();
        assert_eq!(err.to_string(), "Query failed: timeout");
        assert!(!cache.contains("incidents"));

        let ok = cache.get_or_fetch("incidents", || Ok(table(3))).unwrap();
        assert_eq!(ok.len(), 1);
    }

    #[test]
    fn test_explicit_invalidation() {
        let cache = QueryCache::new(Duration::from_secs(600), 8);
        cache.get_or_fetch("flood", || Ok(table(1))).unwrap();
        cache.invalidate("flood");
        assert!(cache.get("flood").is_none());

        cache.get_or_fetch("flood", || Ok(table(1))).unwrap();
        cache.get_or_fetch("cold-wave", || Ok(table(1))).unwrap();
        cache.invalidate_all();
        assert!(!cache.contains("flood"));
        assert!(!cache.contains("cold-wave"));
    }

    #[test]
    fn test_single_flight_under_contention() {
        let cache = QueryCache::new(Duration::from_secs(600), 8);
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    cache
                        .get_or_fetch("incidents", || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(50));
                            Ok(table(9))
                        })
                        .unwrap()
                })
            })
            .collect();

        let tables: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(tables.iter().all(|t| Arc::ptr_eq(t, &tables[0])));
    }
}
