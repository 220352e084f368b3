// Copyright 2015-2023 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Record sets stored per location
//!
//! Every field is optional in the stored JSON. Missing address record policies decode to neutral
//! values, so a location without overrides behaves like one that states the defaults.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::cache::Expiring;

/// TTL of a record set that does not state one
pub const DEFAULT_TTL: u32 = 300;

/// All record sets of one location, as stored
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordSets {
    /// IPv4 addresses
    pub a: IpSet,
    /// IPv6 addresses
    pub aaaa: IpSet,
    /// canonical name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cname: Option<Cname>,
    /// text records
    pub txt: RrSet<Txt>,
    /// name servers
    pub ns: RrSet<Ns>,
    /// mail exchangers
    pub mx: RrSet<Mx>,
    /// services
    pub srv: RrSet<Srv>,
    /// certification authority authorization
    pub caa: RrSet<Caa>,
    /// reverse pointer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ptr: Option<Ptr>,
    /// TLS certificate associations
    pub tlsa: RrSet<Tlsa>,
    /// a location whose addresses are served in place of this one's
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aname: Option<Aname>,
}

impl RecordSets {
    /// Returns true if no record of any type is present
    pub fn is_empty(&self) -> bool {
        self.a.records.is_empty()
            && self.aaaa.records.is_empty()
            && self.cname.is_none()
            && self.txt.records.is_empty()
            && self.ns.records.is_empty()
            && self.mx.records.is_empty()
            && self.srv.records.is_empty()
            && self.caa.records.is_empty()
            && self.ptr.is_none()
            && self.tlsa.records.is_empty()
            && self.aname.is_none()
    }
}

/// A list of records of one type sharing a TTL
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RrSet<T> {
    /// time to live
    pub ttl: u32,
    /// the records
    pub records: Vec<T>,
}

impl<T> Default for RrSet<T> {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            records: Vec::new(),
        }
    }
}

/// Address records with their selection policy
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpSet {
    /// time to live
    pub ttl: u32,
    /// the addresses
    pub records: Vec<IpRecord>,
    /// how many and which addresses are answered
    pub filter: IpFilter,
    /// health check applied to the addresses
    pub health_check: IpHealthCheck,
}

impl Default for IpSet {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            records: Vec::new(),
            filter: IpFilter::default(),
            health_check: IpHealthCheck::default(),
        }
    }
}

/// One address
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpRecord {
    /// the address
    pub ip: IpAddr,
    /// ISO country codes this address serves
    #[serde(default)]
    pub country: Vec<String>,
    /// autonomous system number this address serves
    #[serde(default)]
    pub asn: u32,
    /// relative weight for weighted ordering
    #[serde(default)]
    pub weight: u32,
}

/// Selects the addresses of an [`IpSet`] that are answered
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpFilter {
    /// answer all or a single address
    pub count: FilterCount,
    /// order of the answered addresses
    pub order: FilterOrder,
    /// restricts addresses to the client's location
    pub geo_filter: GeoFilter,
}

/// Number of addresses answered
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterCount {
    /// every selected address
    #[default]
    Multi,
    /// only the first selected address
    Single,
}

/// Order of the answered addresses
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOrder {
    /// as stored
    #[default]
    None,
    /// randomized by weight
    Weighted,
    /// rotated per query
    Rr,
}

/// Location based restriction of answered addresses
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeoFilter {
    /// no restriction
    #[default]
    None,
    /// nearest addresses
    Location,
    /// addresses for the client's country
    Country,
    /// addresses for the client's autonomous system
    Asn,
}

/// Health check configuration of an [`IpSet`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpHealthCheck {
    /// probe protocol, e.g. `http`, `https` or `ping`
    pub protocol: String,
    /// path probed
    pub uri: String,
    /// port probed
    pub port: u16,
    /// probe timeout in milliseconds
    pub timeout: u32,
    /// consecutive successes before an address counts as up
    pub up_count: i32,
    /// consecutive failures before an address counts as down
    pub down_count: i32,
    /// whether unhealthy addresses are withheld
    pub enable: bool,
}

impl Default for IpHealthCheck {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            uri: "/".to_string(),
            port: 80,
            timeout: 1000,
            up_count: 3,
            down_count: -3,
            enable: false,
        }
    }
}

/// CNAME record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cname {
    /// time to live
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    /// target name
    pub host: String,
}

/// TXT record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Txt {
    /// the text
    pub text: String,
}

/// NS record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ns {
    /// name server
    pub host: String,
}

/// MX record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mx {
    /// mail exchanger
    pub host: String,
    /// preference, lower is preferred
    #[serde(default)]
    pub preference: u16,
}

/// SRV record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Srv {
    /// host providing the service
    pub target: String,
    /// port of the service
    pub port: u16,
    /// priority, lower is preferred
    #[serde(default)]
    pub priority: u16,
    /// weight among equal priorities
    #[serde(default)]
    pub weight: u16,
}

/// CAA record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caa {
    /// critical flag byte
    #[serde(default)]
    pub flag: u8,
    /// property tag, e.g. `issue`
    pub tag: String,
    /// property value
    pub value: String,
}

/// PTR record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ptr {
    /// time to live
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    /// target name
    pub domain: String,
}

/// TLSA record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tlsa {
    /// certificate usage
    pub usage: u8,
    /// selector
    pub selector: u8,
    /// matching type
    pub matching_type: u8,
    /// hex encoded certificate association data
    pub certificate: String,
}

/// ANAME, an alias resolved by the server and answered as addresses
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aname {
    /// the location whose addresses are answered
    pub location: String,
}

fn default_ttl() -> u32 {
    DEFAULT_TTL
}

/// The record sets of one location, materialized for serving
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    name: String,
    sets: RecordSets,
    expires_at: u64,
}

impl Record {
    /// Creates a record for the owner `name`
    pub fn new(name: impl Into<String>, sets: RecordSets, expires_at: u64) -> Self {
        Self {
            name: name.into(),
            sets,
            expires_at,
        }
    }

    /// Fully qualified owner name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The record sets
    pub fn sets(&self) -> &RecordSets {
        &self.sets
    }

    /// Epoch seconds until which this record is served from cache
    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }
}

impl Expiring for Record {
    fn expires_at(&self) -> u64 {
        self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_defaults() {
        let sets: RecordSets = serde_json::from_str("{}").unwrap();
        assert!(sets.is_empty());
        assert_eq!(sets, RecordSets::default());
        assert_eq!(sets.a.ttl, DEFAULT_TTL);
        assert!(!sets.a.health_check.enable);
        assert_eq!(sets.a.filter.count, FilterCount::Multi);
    }

    #[test]
    fn test_decode_location() {
        let sets: RecordSets = serde_json::from_str(
            r#"{
                "a": {
                    "ttl": 60,
                    "records": [{"ip": "192.0.2.1", "country": ["DE"], "weight": 10}],
                    "filter": {"count": "single", "order": "weighted", "geo_filter": "country"},
                    "health_check": {"protocol": "https", "enable": true}
                },
                "cname": {"host": "www.example.net."},
                "txt": {"records": [{"text": "hello"}]},
                "mx": {"ttl": 120, "records": [{"host": "mx.example.com.", "preference": 10}]},
                "caa": {"records": [{"tag": "issue", "value": "ca.example.net"}]}
            }"#,
        )
        .unwrap();

        assert_eq!(sets.a.ttl, 60);
        assert_eq!(sets.a.records[0].ip, "192.0.2.1".parse::<IpAddr>().unwrap());
        assert_eq!(sets.a.records[0].country, vec!["DE"]);
        assert_eq!(sets.a.filter.order, FilterOrder::Weighted);
        assert_eq!(sets.a.filter.geo_filter, GeoFilter::Country);
        assert_eq!(sets.a.health_check.protocol, "https");
        assert_eq!(sets.a.health_check.port, 80);
        assert!(sets.a.health_check.enable);
        assert_eq!(sets.cname.as_ref().unwrap().ttl, DEFAULT_TTL);
        assert_eq!(sets.txt.records[0].text, "hello");
        assert_eq!(sets.mx.records[0].preference, 10);
        assert_eq!(sets.caa.records[0].flag, 0);
        assert!(sets.aaaa.records.is_empty());
    }

    #[test]
    fn test_decode_rejects_bad_address() {
        let json = r#"{"a": {"records": [{"ip": "nope"}]}}"#;
        assert!(serde_json::from_str::<RecordSets>(json).is_err());
    }
}
