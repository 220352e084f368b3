// Copyright 2015-2021 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Background task keeping the zone index in sync with the store

use std::{sync::Arc, time::Duration};

use arc_swap::ArcSwap;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    error::StoreResult,
    store::{BackingStore, StoreEvent, StoreKeys, Subscription},
    zone::ZoneIndex,
};

/// Interval after which the zone set is reloaded even if no change was announced
pub const FORCED_RELOAD: Duration = Duration::from_secs(60 * 60);

/// Shortest accepted reload interval
pub const MIN_RELOAD: Duration = Duration::from_millis(100);

/// Rebuilds the [`ZoneIndex`] when the zone set changes.
///
/// Changes are learned from the store's change feed, which only marks the index as out of date;
/// the rebuild itself happens on the next reload tick, so bursts of changes cost one reload. Once
/// per [`FORCED_RELOAD`] the index is marked out of date regardless, which covers notifications
/// lost while the feed was down. The index starts out of date, so a refresher whose first load or
/// subscription failed retries on every reload tick.
pub struct ZoneRefresher {
    store: Arc<dyn BackingStore>,
    keys: StoreKeys,
    index: Arc<ArcSwap<ZoneIndex>>,
    reload: Duration,
    forced_reload: Duration,
}

impl ZoneRefresher {
    /// Creates a refresher that swaps rebuilt indexes into `index`.
    ///
    /// # Arguments
    ///
    /// * `store` - the backing store holding the zone set
    /// * `keys` - layout of the store
    /// * `index` - the index shared with readers
    /// * `reload` - interval between checks whether the index is out of date, at least
    ///   [`MIN_RELOAD`]
    pub fn new(
        store: Arc<dyn BackingStore>,
        keys: StoreKeys,
        index: Arc<ArcSwap<ZoneIndex>>,
        reload: Duration,
    ) -> Self {
        describe_counter!(
            "kvdns_zone_reloads_total",
            "Number of times the zone index was rebuilt"
        );
        describe_gauge!("kvdns_zones", "Number of zones in the zone index");

        Self {
            store,
            keys,
            index,
            reload: at_least_min("reload", reload),
            forced_reload: FORCED_RELOAD,
        }
    }

    /// Overrides the [`FORCED_RELOAD`] interval, at least [`MIN_RELOAD`]
    pub fn with_forced_reload(mut self, forced_reload: Duration) -> Self {
        self.forced_reload = at_least_min("forced reload", forced_reload);
        self
    }

    /// Reads the zone set and replaces the index, returning the number of zones
    pub async fn reload(&self) -> StoreResult<usize> {
        let zones = self.store.members(&self.keys.zone_set()).await?;
        let index = ZoneIndex::new(zones);
        let len = index.len();
        self.index.store(Arc::new(index));

        counter!("kvdns_zone_reloads_total").increment(1);
        gauge!("kvdns_zones").set(len as f64);
        Ok(len)
    }

    /// Runs the refresher on a new task until the returned handle is shut down
    pub fn spawn(self) -> RefresherHandle {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(self.run(shutdown.clone()));
        RefresherHandle { shutdown, task }
    }

    async fn run(self, shutdown: CancellationToken) {
        let mut modified = true;
        let mut feed = self.subscribe().await;

        let mut reload = interval_at(Instant::now() + self.reload, self.reload);
        reload.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut forced = interval_at(Instant::now() + self.forced_reload, self.forced_reload);
        forced.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("zone refresher started, reloading every {:?}", self.reload);
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                event = next_event(&mut feed) => match event {
                    Some(StoreEvent::Connected) => {
                        debug!("change feed connected");
                        modified = true;
                    }
                    Some(StoreEvent::Changed(key)) => {
                        debug!("{key} changed");
                        modified = true;
                    }
                    Some(StoreEvent::Error(error)) => warn!("change feed error: {error}"),
                    None => {
                        warn!("change feed closed, resubscribing on next forced reload");
                        feed = None;
                    }
                },

                _ = reload.tick() => {
                    if !modified {
                        continue;
                    }
                    match self.reload().await {
                        Ok(len) => {
                            info!("reloaded zone index with {len} zones");
                            modified = false;
                        }
                        Err(error) => error!("failed to reload zone index: {error}"),
                    }
                }

                _ = forced.tick() => {
                    debug!("forcing zone index reload");
                    modified = true;
                    if feed.is_none() {
                        feed = self.subscribe().await;
                    }
                }
            }
        }

        if let Some(feed) = feed {
            feed.close().await;
        }
        info!("zone refresher stopped");
    }

    async fn subscribe(&self) -> Option<Subscription> {
        let pattern = self.keys.zone_set();
        match self.store.subscribe(&pattern).await {
            Ok(feed) => Some(feed),
            Err(error) => {
                warn!("failed to subscribe to changes of {pattern}: {error}");
                None
            }
        }
    }
}

fn at_least_min(name: &str, interval: Duration) -> Duration {
    if interval < MIN_RELOAD {
        warn!("{name} interval {interval:?} is too short, using {MIN_RELOAD:?}");
        return MIN_RELOAD;
    }
    interval
}

/// Waits for the next event, forever if there is no feed
async fn next_event(feed: &mut Option<Subscription>) -> Option<StoreEvent> {
    match feed {
        Some(feed) => feed.next().await,
        None => std::future::pending().await,
    }
}

/// Controls a running [`ZoneRefresher`]
pub struct RefresherHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl RefresherHandle {
    /// Stops the refresher and waits until it has closed its change feed
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(error) = self.task.await {
            error!("zone refresher task failed: {error}");
        }
    }

    /// Returns true once the refresher task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn refresher(store: Arc<InMemoryStore>) -> (ZoneRefresher, Arc<ArcSwap<ZoneIndex>>) {
        let index = Arc::new(ArcSwap::from_pointee(ZoneIndex::default()));
        let refresher = ZoneRefresher::new(
            store,
            StoreKeys::default(),
            index.clone(),
            Duration::from_secs(1),
        );
        (refresher, index)
    }

    #[tokio::test]
    async fn test_reload_swaps_index() {
        let store = Arc::new(InMemoryStore::default());
        store.add_member("kvdns:zones", "example.com.");
        let (refresher, index) = refresher(store.clone());

        let old = index.load_full();
        assert_eq!(refresher.reload().await.unwrap(), 1);
        assert!(old.is_empty());
        assert_eq!(index.load().find("www.example.com."), Some("example.com."));
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_index() {
        let store = Arc::new(InMemoryStore::default());
        store.add_member("kvdns:zones", "example.com.");
        let (refresher, index) = refresher(store.clone());
        refresher.reload().await.unwrap();

        store.set_unavailable(true);
        assert!(refresher.reload().await.is_err());
        assert_eq!(index.load().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_is_applied_on_tick() {
        let store = Arc::new(InMemoryStore::default());
        let (refresher, index) = refresher(store.clone());
        let handle = refresher.spawn();

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        store.add_member("kvdns:zones", "example.com.");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(index.load().is_empty());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(index.load().find("example.com."), Some("example.com."));

        handle.shutdown().await;
        assert_eq!(store.active_subscriptions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_start_retries_on_reload_tick() {
        let store = Arc::new(InMemoryStore::default());
        store.add_member("kvdns:zones", "example.com.");
        store.set_unavailable(true);
        let (refresher, index) = refresher(store.clone());
        let handle = refresher.spawn();

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(index.load().is_empty());
        assert_eq!(store.active_subscriptions(), 0);

        store.set_unavailable(false);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(index.load().len(), 1);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_intervals_are_raised() {
        let store = Arc::new(InMemoryStore::default());
        store.add_member("kvdns:zones", "example.com.");
        let index = Arc::new(ArcSwap::from_pointee(ZoneIndex::default()));
        let refresher = ZoneRefresher::new(
            store.clone(),
            StoreKeys::default(),
            index.clone(),
            Duration::ZERO,
        )
        .with_forced_reload(Duration::ZERO);
        assert_eq!(refresher.reload, MIN_RELOAD);
        assert_eq!(refresher.forced_reload, MIN_RELOAD);

        let handle = refresher.spawn();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!handle.is_finished());
        assert_eq!(index.load().len(), 1);

        handle.shutdown().await;
        assert_eq!(store.active_subscriptions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_reload_resubscribes() {
        let store = Arc::new(InMemoryStore::default());
        store.set_unavailable(true);
        let (refresher, index) = refresher(store.clone());
        let handle = refresher
            .with_forced_reload(Duration::from_secs(10))
            .spawn();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.active_subscriptions(), 0);

        store.set_unavailable(false);
        store.add_member("kvdns:zones", "example.com.");
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(store.active_subscriptions(), 1);
        assert_eq!(index.load().len(), 1);

        handle.shutdown().await;
        assert_eq!(store.active_subscriptions(), 0);
    }
}
