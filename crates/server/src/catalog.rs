// Copyright 2015-2021 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The zone and record lookup interface for the request layer

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use tracing::{info, warn};

use crate::{
    cache::{CacheMetrics, ExpiringCache},
    clock::Clock,
    config::Config,
    error::{ConfigResult, ErrorKind, Result, StoreResult},
    record::{Record, RecordSets},
    refresher::{RefresherHandle, ZoneRefresher},
    store::{BackingStore, StoreKeys, APEX_LABEL},
    zone::{Zone, ZoneIndex},
};

/// Resolves names to zones and locations, hiding the latency of the backing store.
///
/// Zones and locations are cached for their configured lifetimes. Until [`Catalog::start`] has
/// been called the zone index is empty and [`Catalog::find_zone`] finds nothing.
pub struct Catalog {
    store: Arc<dyn BackingStore>,
    keys: StoreKeys,
    clock: Arc<dyn Clock>,
    index: Arc<ArcSwap<ZoneIndex>>,
    zones: ExpiringCache<Zone>,
    records: ExpiringCache<Record>,
    zone_reload: Duration,
    refresher: Mutex<Option<RefresherHandle>>,
}

impl Catalog {
    /// Creates a catalog over `store`, reporting cache metrics to the global recorder
    pub fn new(
        config: &Config,
        store: Arc<dyn BackingStore>,
        clock: Arc<dyn Clock>,
    ) -> ConfigResult<Self> {
        Self::with_metrics(
            config,
            store,
            clock,
            CacheMetrics::new("zone"),
            CacheMetrics::new("record"),
        )
    }

    /// Creates a catalog over `store` with the given cache metrics.
    ///
    /// Zones and locations are both served for the record cache lifetime before they are
    /// refetched. The zone cache lifetime bounds how long a zone that is not looked up stays
    /// cached, which also ends its use as a stale fallback.
    pub fn with_metrics(
        config: &Config,
        store: Arc<dyn BackingStore>,
        clock: Arc<dyn Clock>,
        zone_metrics: CacheMetrics,
        record_metrics: CacheMetrics,
    ) -> ConfigResult<Self> {
        config.validate()?;

        let zones = ExpiringCache::new(
            "zone cache",
            config.get_zone_cache_capacity(),
            config.get_record_cache_timeout(),
            Some(Duration::from_secs(config.get_zone_cache_timeout())),
            clock.clone(),
            zone_metrics,
        );
        let records = ExpiringCache::new(
            "record cache",
            config.get_record_cache_capacity(),
            config.get_record_cache_timeout(),
            None,
            clock.clone(),
            record_metrics,
        );

        Ok(Self {
            store,
            keys: config.get_store().get_keys(),
            clock,
            index: Arc::new(ArcSwap::from_pointee(ZoneIndex::default())),
            zones,
            records,
            zone_reload: config.get_zone_reload(),
            refresher: Mutex::new(None),
        })
    }

    /// Loads the zone index and starts keeping it up to date in the background.
    ///
    /// The refresher is started even if the initial load fails, in which case it retries on each
    /// reload tick until a load succeeds; the returned error only reports the failed initial
    /// load. Calling this on a
    /// started catalog does nothing.
    pub async fn start(&self) -> StoreResult<()> {
        if self.refresher_handle().is_some() {
            warn!("catalog already started");
            return Ok(());
        }

        let refresher = ZoneRefresher::new(
            self.store.clone(),
            self.keys.clone(),
            self.index.clone(),
            self.zone_reload,
        );
        let loaded = refresher.reload().await;
        match &loaded {
            Ok(len) => info!("loaded {len} zones"),
            Err(error) => warn!("initial zone load failed, will retry: {error}"),
        }

        let handle = refresher.spawn();
        let previous = self.refresher_handle().replace(handle);
        if let Some(previous) = previous {
            // lost a race with a concurrent start
            previous.shutdown().await;
        }

        loaded.map(|_| ())
    }

    /// Stops the background refresher and waits until it has closed its change feed
    pub async fn shutdown(&self) {
        let handle = self.refresher_handle().take();
        match handle {
            Some(handle) => handle.shutdown().await,
            None => warn!("catalog shut down before it was started"),
        }
    }

    /// Returns the most specific zone containing `qname`
    pub fn find_zone(&self, qname: &str) -> Option<String> {
        self.index.load().find(qname).map(str::to_string)
    }

    /// Returns the zone `name`, as listed in the zone set.
    ///
    /// `None` if the zone could not be loaded and no earlier copy is cached.
    pub async fn get_zone(&self, name: &str) -> Option<Arc<Zone>> {
        let Self {
            store, keys, clock, ..
        } = self;
        self.zones
            .get_or_fetch(name, move |expires_at| async move {
                Zone::load(store.as_ref(), keys, name, clock.now(), expires_at).await
            })
            .await
    }

    /// Returns the records of `location` in `zone`.
    ///
    /// `location` is a label relative to the zone, `@` or the zone name for the apex, or an
    /// absolute name inside the zone. An apex without records yields an empty record; any other
    /// location without records, or with records that cannot be decoded, yields `None` unless an
    /// earlier copy is cached.
    pub async fn get_location(&self, location: &str, zone: &Zone) -> Option<Arc<Record>> {
        let label = relative_label(location, zone.name());
        let cache_key = format!("{label}.{}", zone.name());
        let Self { store, keys, .. } = self;
        self.records
            .get_or_fetch(&cache_key, move |expires_at| async move {
                load_location(store.as_ref(), keys, &label, zone.name(), expires_at).await
            })
            .await
    }

    /// Stores the records of `location` in `zone`.
    ///
    /// Other readers see the change once their cached copy expires.
    pub async fn set_location(
        &self,
        location: &str,
        zone: &Zone,
        records: &RecordSets,
    ) -> Result<()> {
        let label = relative_label(location, zone.name());
        let value = serde_json::to_string(records).map_err(|source| ErrorKind::Encode {
            key: format!("{}/{label}", self.keys.zone(zone.name())),
            source,
        })?;
        self.store
            .hash_set(&self.keys.zone(zone.name()), &label, &value)
            .await?;
        Ok(())
    }

    /// The current zone index
    pub fn zone_index(&self) -> Arc<ZoneIndex> {
        self.index.load_full()
    }

    fn refresher_handle(&self) -> std::sync::MutexGuard<'_, Option<RefresherHandle>> {
        self.refresher.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn load_location(
    store: &dyn BackingStore,
    keys: &StoreKeys,
    label: &str,
    zone: &str,
    expires_at: u64,
) -> Result<Record> {
    let key = keys.zone(zone);
    let owner = owner_name(label, zone);
    match store.hash_get(&key, label).await? {
        Some(value) if !value.is_empty() => {
            let sets = serde_json::from_str::<RecordSets>(&value).map_err(|source| {
                ErrorKind::Decode {
                    key: format!("{key}/{label}"),
                    source,
                }
            })?;
            Ok(Record::new(owner, sets, expires_at))
        }
        _ if label == APEX_LABEL => Ok(Record::new(owner, RecordSets::default(), expires_at)),
        _ => Err(ErrorKind::Missing(owner).into()),
    }
}

/// The label of `location` as stored in the hash of `zone`
fn relative_label(location: &str, zone: &str) -> String {
    let location = location.trim_end_matches('.');
    let zone = zone.trim_end_matches('.');
    if location.is_empty() || location == APEX_LABEL || location.eq_ignore_ascii_case(zone) {
        return APEX_LABEL.to_string();
    }

    if let Some(split) = location.len().checked_sub(zone.len() + 1) {
        if location.is_char_boundary(split) {
            let (head, tail) = location.split_at(split);
            if tail.starts_with('.') && tail[1..].eq_ignore_ascii_case(zone) {
                return head.to_string();
            }
        }
    }
    location.to_string()
}

fn owner_name(label: &str, zone: &str) -> String {
    if label == APEX_LABEL {
        zone.to_string()
    } else {
        format!("{label}.{zone}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_label() {
        assert_eq!(relative_label("www", "example.com."), "www");
        assert_eq!(relative_label("@", "example.com."), "@");
        assert_eq!(relative_label("example.com.", "example.com."), "@");
        assert_eq!(relative_label("Example.COM", "example.com."), "@");
        assert_eq!(relative_label("www.example.com.", "example.com."), "www");
        assert_eq!(relative_label("a.b.Example.com.", "example.com."), "a.b");
        assert_eq!(relative_label("wwwexample.com.", "example.com."), "wwwexample.com");
    }

    #[test]
    fn test_owner_name() {
        assert_eq!(owner_name("@", "example.com."), "example.com.");
        assert_eq!(owner_name("www", "example.com."), "www.example.com.");
    }
}
