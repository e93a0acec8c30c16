//! Read-through access with request coalescing
//!
//! `ReadThrough::get_or_fetch` is the single place where a cache miss turns into
//! an upstream fetch. Concurrent misses for the same key share one pending
//! fetch; its result is written through to the cache before any waiter sees it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::debug;

use super::key::CacheKey;
use super::manager::CacheManager;
use crate::data::FetchError;

type PendingFetch = Shared<BoxFuture<'static, Result<Option<Value>, FetchError>>>;
type InFlight = Arc<Mutex<HashMap<String, PendingFetch>>>;

fn lock(in_flight: &InFlight) -> MutexGuard<'_, HashMap<String, PendingFetch>> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cache front door used by every call site
#[derive(Clone)]
pub struct ReadThrough {
    cache: Arc<CacheManager>,
    in_flight: InFlight,
}

impl ReadThrough {
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self {
            cache,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    /// Number of fetches currently pending
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Returns the cached value for `key`, or runs `fetch` and caches its result
    ///
    /// `Ok(None)` from the fetcher is passed through without being cached, so an
    /// upstream gap is retried on the next call. Errors are never cached.
    pub async fn get_or_fetch<T, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        fetch: F,
    ) -> Result<Option<T>, FetchError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, FetchError>> + Send + 'static,
    {
        if let Some(hit) = self.cache.get::<T>(key) {
            return Ok(Some(hit));
        }

        let name = key.to_string();
        let pending = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.get(&name) {
                Some(pending) => {
                    debug!(key = %name, "Joining in-flight fetch");
                    pending.clone()
                }
                None => {
                    // A fetch may have finished between the miss above and taking the lock
                    if let Some(hit) = self.cache.get::<T>(key) {
                        return Ok(Some(hit));
                    }
                    debug!(key = %name, "Cache miss, fetching upstream");
                    let pending = self.start_fetch(key.clone(), ttl, fetch());
                    in_flight.insert(name, pending.clone());
                    pending
                }
            }
        };

        match pending.await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn start_fetch<T, Fut>(&self, key: CacheKey, ttl: Duration, fetch: Fut) -> PendingFetch
    where
        T: Serialize + Send + 'static,
        Fut: Future<Output = Result<Option<T>, FetchError>> + Send + 'static,
    {
        let cache = Arc::clone(&self.cache);
        let in_flight = Arc::clone(&self.in_flight);

        async move {
            let outcome = match fetch.await {
                Ok(Some(fetched)) => serde_json::to_value(fetched)
                    .map(Some)
                    .map_err(FetchError::from),
                Ok(None) => Ok(None),
                Err(e) => Err(e),
            };

            if let Ok(Some(value)) = &outcome {
                cache.set_value(&key, value.clone(), ttl);
            }
            lock(&in_flight).remove(&key.to_string());
            outcome
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::FileStore;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn create_test_reader() -> (ReadThrough, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let cache = CacheManager::new(FileStore::open(temp_dir.path()).unwrap());
        (ReadThrough::new(Arc::new(cache)), temp_dir)
    }

    fn key() -> CacheKey {
        CacheKey::menu("Ford", NaiveDate::from_ymd_opt(2026, 3, 9).unwrap())
    }

    const TTL: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_miss_fetches_and_caches() {
        let (reader, _temp_dir) = create_test_reader();

        let value = reader
            .get_or_fetch(&key(), TTL, || async { Ok(Some(7u32)) })
            .await
            .unwrap();

        assert_eq!(value, Some(7));
        assert_eq!(reader.cache().get::<u32>(&key()), Some(7));
        assert_eq!(reader.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_hit_skips_fetch() {
        let (reader, _temp_dir) = create_test_reader();
        reader.cache().set(&key(), &1u32, None);
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let value = reader
            .get_or_fetch(&key(), TTL, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Some(2u32))
            })
            .await
            .unwrap();

        assert_eq!(value, Some(1));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_fetch() {
        let (reader, _temp_dir) = create_test_reader();
        let calls = Arc::new(AtomicUsize::new(0));

        let lookups = (0..8).map(|_| {
            let counter = Arc::clone(&calls);
            let reader = reader.clone();
            async move {
                reader
                    .get_or_fetch(&key(), TTL, move || async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(Some("menu".to_string()))
                    })
                    .await
            }
        });
        let results = futures::future::join_all(lookups).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap(), Some("menu".to_string()));
        }
        assert_eq!(reader.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_errors_are_shared_but_not_cached() {
        let (reader, _temp_dir) = create_test_reader();

        let first: Result<Option<u32>, _> = reader
            .get_or_fetch(&key(), TTL, || async {
                Err(FetchError::Status {
                    status: 502,
                    body: "bad gateway".to_string(),
                })
            })
            .await;
        assert!(matches!(first, Err(FetchError::Status { status: 502, .. })));
        assert_eq!(reader.in_flight(), 0);

        let second = reader
            .get_or_fetch(&key(), TTL, || async { Ok(Some(3u32)) })
            .await
            .unwrap();
        assert_eq!(second, Some(3));
    }

    #[tokio::test]
    async fn test_none_is_not_cached() {
        let (reader, _temp_dir) = create_test_reader();

        let first: Option<u32> = reader
            .get_or_fetch(&key(), TTL, || async { Ok(None) })
            .await
            .unwrap();
        assert_eq!(first, None);
        assert!(!reader.cache().in_memory(&key()));

        let second = reader
            .get_or_fetch(&key(), TTL, || async { Ok(Some(4u32)) })
            .await
            .unwrap();
        assert_eq!(second, Some(4));
    }
}
