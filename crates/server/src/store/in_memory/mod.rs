// Copyright 2015-2019 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! In-memory backing store

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{
    error::{StoreErrorKind, StoreResult},
    store::{pattern_matches, with_timeout, BackingStore, StoreEvent, Subscription},
};

const FEED_CAPACITY: usize = 64;

/// A backing store held in process memory.
///
/// Besides serving embedded and single-node deployments it keeps count of every read it serves
/// and can simulate outages and latency, which makes it the fake of choice in tests.
pub struct InMemoryStore {
    data: Mutex<Data>,
    subscribers: Mutex<Vec<Subscriber>>,
    reads: AtomicUsize,
    unavailable: AtomicBool,
    latency: Mutex<Option<Duration>>,
    read_timeout: Duration,
}

#[derive(Default)]
struct Data {
    strings: HashMap<String, String>,
    sets: HashMap<String, BTreeSet<String>>,
    hashes: HashMap<String, BTreeMap<String, String>>,
}

struct Subscriber {
    pattern: String,
    events: mpsc::Sender<StoreEvent>,
}

impl InMemoryStore {
    /// Creates an empty store whose reads fail after `read_timeout`
    pub fn new(read_timeout: Duration) -> Self {
        Self {
            data: Mutex::new(Data::default()),
            subscribers: Mutex::new(Vec::new()),
            reads: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
            latency: Mutex::new(None),
            read_timeout,
        }
    }

    /// Sets the string at `key`
    pub fn set(&self, key: &str, value: impl Into<String>) {
        self.data().strings.insert(key.to_string(), value.into());
        self.notify(key);
    }

    /// Deletes whatever is stored at `key`
    pub fn delete(&self, key: &str) {
        let removed = {
            let mut data = self.data();
            let string = data.strings.remove(key).is_some();
            let set = data.sets.remove(key).is_some();
            let hash = data.hashes.remove(key).is_some();
            string || set || hash
        };
        if removed {
            self.notify(key);
        }
    }

    /// Adds `member` to the set at `key`
    pub fn add_member(&self, key: &str, member: impl Into<String>) {
        let added = self
            .data()
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.into());
        if added {
            self.notify(key);
        }
    }

    /// Removes `member` from the set at `key`
    pub fn remove_member(&self, key: &str, member: &str) {
        let removed = self
            .data()
            .sets
            .get_mut(key)
            .is_some_and(|set| set.remove(member));
        if removed {
            self.notify(key);
        }
    }

    /// Sets `field` of the hash at `key` without going through the [`BackingStore`] interface
    pub fn put_field(&self, key: &str, field: &str, value: impl Into<String>) {
        self.data()
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.into());
        self.notify(key);
    }

    /// Number of reads served since creation or the last [`Self::reset_reads`]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Resets the read counter
    pub fn reset_reads(&self) {
        self.reads.store(0, Ordering::SeqCst);
    }

    /// While unavailable every operation fails as if the store could not be reached
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delays every operation by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap_or_else(PoisonError::into_inner) = latency;
    }

    /// Number of change feeds that are still open
    pub fn active_subscriptions(&self) -> usize {
        let mut subscribers = self.subscribers();
        subscribers.retain(|s| !s.events.is_closed());
        subscribers.len()
    }

    fn data(&self) -> MutexGuard<'_, Data> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, key: &str) {
        let mut subscribers = self.subscribers();
        subscribers.retain(|s| !s.events.is_closed());
        for subscriber in subscribers.iter() {
            if !pattern_matches(&subscriber.pattern, key) {
                continue;
            }
            if let Err(error) = subscriber
                .events
                .try_send(StoreEvent::Changed(key.to_string()))
            {
                // a full feed already has a pending change for the reader to act on
                trace!("dropping change notification for {key}: {error}");
            }
        }
    }

    /// Applies the simulated latency and outage, and counts the operation as a read if asked
    async fn access(&self, read: bool) -> StoreResult<()> {
        let latency = *self.latency.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(
                StoreErrorKind::Unavailable("in-memory store is offline".to_string()).into(),
            );
        }
        if read {
            self.reads.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn read<T>(&self, f: impl FnOnce(&Data) -> T + Send) -> StoreResult<T> {
        self.access(true).await?;
        Ok(f(&self.data()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

#[async_trait::async_trait]
impl BackingStore for InMemoryStore {
    async fn members(&self, key: &str) -> StoreResult<Vec<String>> {
        let read = self.read(|data| {
            data.sets
                .get(key)
                .map(|set| set.iter().cloned().collect::<Vec<_>>())
                .unwrap_or_default()
        });
        with_timeout(self.read_timeout, read).await
    }

    async fn hash_field_names(&self, key: &str) -> StoreResult<Vec<String>> {
        let read = self.read(|data| {
            data.hashes
                .get(key)
                .map(|hash| hash.keys().cloned().collect::<Vec<_>>())
                .unwrap_or_default()
        });
        with_timeout(self.read_timeout, read).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let read = self.read(|data| data.strings.get(key).cloned());
        with_timeout(self.read_timeout, read).await
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let read = self.read(|data| {
            data.hashes
                .get(key)
                .and_then(|hash| hash.get(field))
                .cloned()
        });
        with_timeout(self.read_timeout, read).await
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        with_timeout(self.read_timeout, self.access(false)).await?;
        self.put_field(key, field, value);
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> StoreResult<Subscription> {
        self.access(false).await?;

        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        tx.try_send(StoreEvent::Connected)
            .map_err(|_| StoreErrorKind::FeedClosed)?;
        debug!("subscribed to changes of {pattern}");
        self.subscribers().push(Subscriber {
            pattern: pattern.to_string(),
            events: tx,
        });

        Ok(Subscription::new(rx, CancellationToken::new(), None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_are_counted() {
        let store = InMemoryStore::default();
        store.add_member("zones", "example.com.");
        store.put_field("example.com.", "@", "{}");

        assert_eq!(store.members("zones").await.unwrap(), vec!["example.com."]);
        assert_eq!(
            store.hash_get("example.com.", "@").await.unwrap().as_deref(),
            Some("{}")
        );
        assert_eq!(store.hash_get("example.com.", "www").await.unwrap(), None);
        assert_eq!(store.reads(), 3);

        store.hash_set("example.com.", "www", "{}").await.unwrap();
        assert_eq!(store.reads(), 3);
        assert_eq!(
            store.hash_field_names("example.com.").await.unwrap(),
            vec!["@", "www"]
        );
    }

    #[tokio::test]
    async fn test_unavailable_store_fails() {
        let store = InMemoryStore::default();
        store.set_unavailable(true);
        assert!(store.get("anything").await.is_err());
        store.set_unavailable(false);
        assert_eq!(store.get("anything").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_times_out() {
        let store = InMemoryStore::new(Duration::from_millis(50));
        store.set_latency(Some(Duration::from_millis(200)));
        let error = store.get("anything").await.unwrap_err();
        assert!(error.is_timeout());
    }

    #[tokio::test]
    async fn test_subscription_receives_matching_changes() {
        let store = InMemoryStore::default();
        let mut feed = store.subscribe("kvdns:zones").await.unwrap();
        assert!(matches!(feed.next().await, Some(StoreEvent::Connected)));

        store.set("kvdns:other", "x");
        store.add_member("kvdns:zones", "example.com.");
        match feed.next().await {
            Some(StoreEvent::Changed(key)) => assert_eq!(key, "kvdns:zones"),
            other => panic!("unexpected event: {other:?}"),
        }

        assert_eq!(store.active_subscriptions(), 1);
        feed.close().await;
        assert_eq!(store.active_subscriptions(), 0);
    }
}
