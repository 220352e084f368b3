// Copyright 2015-2021 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Zones materialized from the backing store

mod index;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use self::index::ZoneIndex;
use crate::{
    cache::Expiring,
    dnssec::{self, SignedKeySet, ZoneKey, ZoneSigning},
    error::{ErrorKind, Result},
    proto::rr::Name,
    store::{BackingStore, StoreKeys},
};

/// Zone configuration as stored
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    /// SOA fields, missing ones are derived from the zone name
    pub soa: SoaConfig,
    /// whether answers are signed
    pub dnssec: bool,
    /// whether CNAMEs at the apex are flattened into addresses
    pub cname_flattening: bool,
    /// opaque identifier of the zone's owner
    pub domain_id: String,
}

/// Stored SOA fields
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoaConfig {
    /// TTL of the SOA record
    pub ttl: Option<u32>,
    /// primary name server
    pub ns: Option<String>,
    /// mailbox of the responsible person
    pub mbox: Option<String>,
    /// refresh interval
    pub refresh: Option<u32>,
    /// retry interval
    pub retry: Option<u32>,
    /// expire limit
    pub expire: Option<u32>,
    /// negative caching TTL
    pub minimum: Option<u32>,
    /// serial number, defaults to the load time
    pub serial: Option<u32>,
}

impl SoaConfig {
    /// Fills every missing field for `zone`, loaded at `now`
    pub fn resolve(&self, zone: &str, now: u64) -> Soa {
        Soa {
            ttl: self.ttl.unwrap_or(300),
            ns: self.ns.clone().unwrap_or_else(|| format!("ns1.{zone}")),
            mbox: self
                .mbox
                .clone()
                .unwrap_or_else(|| format!("hostmaster.{zone}")),
            refresh: self.refresh.unwrap_or(44),
            retry: self.retry.unwrap_or(55),
            expire: self.expire.unwrap_or(66),
            minimum: self.minimum.unwrap_or(100),
            // serial arithmetic, RFC 1982
            serial: self.serial.unwrap_or((now & u64::from(u32::MAX)) as u32),
        }
    }
}

/// The SOA of a zone with every field filled
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Soa {
    /// TTL of the SOA record
    pub ttl: u32,
    /// primary name server
    pub ns: String,
    /// mailbox of the responsible person
    pub mbox: String,
    /// refresh interval
    pub refresh: u32,
    /// retry interval
    pub retry: u32,
    /// expire limit
    pub expire: u32,
    /// negative caching TTL
    pub minimum: u32,
    /// serial number
    pub serial: u32,
}

/// A zone as served: its locations, configuration and keys
#[derive(Debug)]
pub struct Zone {
    name: String,
    locations: Vec<String>,
    config: ZoneConfig,
    soa: Soa,
    signing: Option<ZoneSigning>,
    expires_at: u64,
}

impl Zone {
    /// Reads the zone `name` from `store`.
    ///
    /// If the configuration enables DNSSEC the keys are loaded and the DNSKEY set signed. Problems
    /// with the key material do not fail the load, the zone is served unsigned instead.
    ///
    /// # Arguments
    ///
    /// * `store` - the backing store
    /// * `keys` - layout of the zone in the store
    /// * `name` - the zone, as listed in the zone set
    /// * `now` - load time in epoch seconds
    /// * `expires_at` - epoch seconds until which the zone is served from cache
    pub async fn load(
        store: &dyn BackingStore,
        keys: &StoreKeys,
        name: &str,
        now: u64,
        expires_at: u64,
    ) -> Result<Self> {
        Name::from_ascii(name).map_err(|source| ErrorKind::Name {
            name: name.to_string(),
            source,
        })?;

        let mut locations = store.hash_field_names(&keys.zone(name)).await?;
        locations.sort();

        let config_key = keys.zone_config(name);
        let config = match store.get(&config_key).await? {
            Some(config) => serde_json::from_str::<ZoneConfig>(&config).map_err(|source| {
                ErrorKind::Decode {
                    key: config_key.clone(),
                    source,
                }
            })?,
            None if locations.is_empty() => return Err(ErrorKind::Missing(name.to_string()).into()),
            None => {
                debug!("{name} has no configuration, using defaults");
                ZoneConfig::default()
            }
        };

        let signing = if config.dnssec {
            match dnssec::materialize(store, keys, name, now).await {
                Ok(signing) => Some(signing),
                Err(error) => {
                    warn!("serving {name} unsigned, loading its DNSSEC keys failed: {error}");
                    None
                }
            }
        } else {
            None
        };

        let soa = config.soa.resolve(name, now);
        debug!(
            "loaded {name} with {} locations, dnssec: {}",
            locations.len(),
            signing.is_some()
        );
        Ok(Self {
            name: name.to_string(),
            locations,
            config,
            soa,
            signing,
            expires_at,
        })
    }

    /// The zone name, as listed in the zone set
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Labels of all locations in the zone, sorted; the apex is `@`
    pub fn locations(&self) -> &[String] {
        &self.locations
    }

    /// The stored configuration
    pub fn config(&self) -> &ZoneConfig {
        &self.config
    }

    /// The SOA with defaults applied
    pub fn soa(&self) -> &Soa {
        &self.soa
    }

    /// Returns true if answers from this zone are signed
    pub fn is_signed(&self) -> bool {
        self.signing.is_some()
    }

    /// The zone signing key
    pub fn zsk(&self) -> Option<&ZoneKey> {
        self.signing.as_ref().map(|s| &s.zsk)
    }

    /// The key signing key
    pub fn ksk(&self) -> Option<&ZoneKey> {
        self.signing.as_ref().map(|s| &s.ksk)
    }

    /// The DNSKEY set and its signature
    pub fn dnskey_set(&self) -> Option<&SignedKeySet> {
        self.signing.as_ref().map(|s| &s.key_set)
    }

    /// Epoch seconds until which this zone is served from cache
    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }
}

impl Expiring for Zone {
    fn expires_at(&self) -> u64 {
        self.expires_at
    }
}
