// Copyright 2015-2021 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Bounded caches of materialized zones and records with coalesced, stale-tolerant refresh

mod metrics;
mod single_flight;

use std::{future::Future, sync::Arc, time::Duration};

use moka::sync::Cache;
use tracing::{debug, warn};

pub use self::metrics::CacheMetrics;
use self::single_flight::SingleFlight;
use crate::{clock::Clock, error::Error};

/// A value that knows until when it may be served without a refetch
pub(crate) trait Expiring {
    /// Epoch seconds after which the value is stale
    fn expires_at(&self) -> u64;

    /// Returns whether this value may be served at `now` without refetching.
    fn is_current(&self, now: u64) -> bool {
        now <= self.expires_at()
    }
}

type FetchOutcome<V> = Result<Arc<V>, Arc<Error>>;

/// A capacity-bounded cache whose entries are refreshed lazily once they expire.
///
/// Concurrent misses for the same key are coalesced into one fetch. Expired entries are kept
/// in the cache (until evicted) so they can be served if the refresh fails.
pub(crate) struct ExpiringCache<V> {
    name: &'static str,
    entries: Cache<String, Arc<V>>,
    flights: SingleFlight<String, FetchOutcome<V>>,
    lifetime: u64,
    clock: Arc<dyn Clock>,
    metrics: CacheMetrics,
}

impl<V> ExpiringCache<V>
where
    V: Expiring + Send + Sync + 'static,
{
    /// Construct a new cache.
    ///
    /// # Arguments
    ///
    /// * `name` - label used in logs
    /// * `capacity` - maximum number of entries
    /// * `lifetime` - seconds a fetched value stays fresh
    /// * `idle` - entries not read for this long are dropped, fresh or stale
    /// * `clock` - the time source for expiry
    /// * `metrics` - counters for hits, misses, stale serves and failures
    pub(crate) fn new(
        name: &'static str,
        capacity: u64,
        lifetime: u64,
        idle: Option<Duration>,
        clock: Arc<dyn Clock>,
        metrics: CacheMetrics,
    ) -> Self {
        let mut builder = Cache::builder().max_capacity(capacity);
        if let Some(idle) = idle {
            builder = builder.time_to_idle(idle);
        }

        Self {
            name,
            entries: builder.build(),
            flights: SingleFlight::new(),
            lifetime,
            clock,
            metrics,
        }
    }

    /// Returns the value for `key`, fetching it if there is no fresh entry.
    ///
    /// `fetch` receives the expiry to stamp on the new value. If it fails, a previously cached
    /// value is returned even though it is stale; `None` is returned only when nothing was ever
    /// cached for the key.
    pub(crate) async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Option<Arc<V>>
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = Result<V, Error>>,
    {
        let cached = self.entries.get(key);
        if let Some(value) = &cached {
            if value.is_current(self.clock.now()) {
                self.metrics.hits.increment(1);
                return Some(value.clone());
            }
        }

        self.metrics.misses.increment(1);
        let Self {
            name,
            entries,
            lifetime,
            clock,
            ..
        } = self;
        let outcome = self
            .flights
            .run(key.to_string(), move || async move {
                // a flight that finished just before this one started may have refreshed it
                if let Some(value) = entries.get(key) {
                    if value.is_current(clock.now()) {
                        return Ok(value);
                    }
                }

                debug!("{name}: fetching {key}");
                let expires_at = clock.now().saturating_add(*lifetime);
                match fetch(expires_at).await {
                    Ok(value) => {
                        let value = Arc::new(value);
                        entries.insert(key.to_string(), value.clone());
                        Ok(value)
                    }
                    Err(error) => Err(Arc::new(error)),
                }
            })
            .await;

        match outcome {
            Ok(value) => Some(value),
            Err(error) => {
                self.metrics.failures.increment(1);
                match cached.or_else(|| self.entries.get(key)) {
                    Some(stale) => {
                        self.metrics.stale.increment(1);
                        warn!(
                            "{}: refresh of {key} failed, serving stale entry: {error}",
                            self.name
                        );
                        Some(stale)
                    }
                    None => {
                        warn!("{}: fetch of {key} failed: {error}", self.name);
                        None
                    }
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{clock::ManualClock, error::ErrorKind};

    struct Value {
        id: usize,
        expires_at: u64,
    }

    impl Expiring for Value {
        fn expires_at(&self) -> u64 {
            self.expires_at
        }
    }

    fn cache(clock: Arc<ManualClock>) -> ExpiringCache<Value> {
        ExpiringCache::new("test", 16, 10, None, clock, CacheMetrics::noop())
    }

    async fn fetch_ok(
        calls: &AtomicUsize,
        expires_at: u64,
    ) -> Result<Value, Error> {
        let id = calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Value { id, expires_at })
    }

    async fn fetch_err(calls: &AtomicUsize) -> Result<Value, Error> {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(ErrorKind::Missing("test".to_string()).into())
    }

    #[tokio::test]
    async fn test_fresh_entry_is_not_refetched() {
        let clock = Arc::new(ManualClock::new(1_000));
        let cache = cache(clock.clone());
        let calls = AtomicUsize::new(0);

        let first = cache
            .get_or_fetch("k", |exp| fetch_ok(&calls, exp))
            .await
            .unwrap();
        assert_eq!(first.expires_at, 1_010);

        clock.advance(10);
        let second = cache
            .get_or_fetch("k", |exp| fetch_ok(&calls, exp))
            .await
            .unwrap();
        assert_eq!(second.id, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched() {
        let clock = Arc::new(ManualClock::new(1_000));
        let cache = cache(clock.clone());
        let calls = AtomicUsize::new(0);

        cache.get_or_fetch("k", |exp| fetch_ok(&calls, exp)).await;
        clock.advance(11);
        let value = cache
            .get_or_fetch("k", |exp| fetch_ok(&calls, exp))
            .await
            .unwrap();
        assert_eq!(value.id, 2);
        assert_eq!(value.expires_at, 1_021);
    }

    #[tokio::test]
    async fn test_failed_refresh_serves_stale() {
        let clock = Arc::new(ManualClock::new(1_000));
        let cache = cache(clock.clone());
        let calls = AtomicUsize::new(0);

        cache.get_or_fetch("k", |exp| fetch_ok(&calls, exp)).await;
        clock.advance(60);
        let value = cache
            .get_or_fetch("k", |_| fetch_err(&calls))
            .await
            .expect("stale value");
        assert_eq!(value.id, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cold_failure_is_absent_and_not_cached() {
        let clock = Arc::new(ManualClock::new(1_000));
        let cache = cache(clock);
        let calls = AtomicUsize::new(0);

        assert!(cache.get_or_fetch("k", |_| fetch_err(&calls)).await.is_none());
        assert!(!cache.contains("k"));
        assert!(cache.get_or_fetch("k", |_| fetch_err(&calls)).await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
