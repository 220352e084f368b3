// Copyright 2015-2018 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Configuration of the zone and record caches, the refresher and the backing store

#[cfg(feature = "toml")]
use std::fs::File;
#[cfg(feature = "toml")]
use std::io::Read;
#[cfg(feature = "toml")]
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{self, Deserialize};

use crate::error::{ConfigErrorKind, ConfigResult};
use crate::store::StoreKeys;

static DEFAULT_ZONE_CACHE_SIZE: u64 = 10_000;
static DEFAULT_ZONE_CACHE_TIMEOUT: u64 = 60;
static DEFAULT_ZONE_RELOAD: u64 = 60;
static DEFAULT_RECORD_CACHE_SIZE: u64 = 1_000_000;
static DEFAULT_RECORD_CACHE_TIMEOUT: u64 = 60;
static DEFAULT_STORE_ADDRESS: &str = "127.0.0.1:6379";
static DEFAULT_STORE_PREFIX: &str = "kvdns:";
static DEFAULT_CONNECT_TIMEOUT_MS: u64 = 500;
static DEFAULT_READ_TIMEOUT_MS: u64 = 500;
static DEFAULT_FULLY_DOWN_STATUS: i32 = -10;
static DEFAULT_FULLY_UP_STATUS: i32 = 10;

/// Top level configuration
#[derive(Deserialize, Debug, Default)]
pub struct Config {
    /// Level at which to log, default is INFO
    log_level: Option<String>,
    /// Cache of materialized zones
    #[serde(default)]
    zone_cache: CacheConfig,
    /// Cache of materialized location records
    #[serde(default)]
    record_cache: CacheConfig,
    /// Seconds between checks whether the zone set needs reloading
    zone_reload: Option<u64>,
    /// Connection to the backing store
    #[serde(default)]
    store: StoreConfig,
    /// Status bounds reported by the health checker
    #[serde(default)]
    health_check: HealthCheckConfig,
}

impl Config {
    /// read a Config file from the file specified at path.
    #[cfg(feature = "toml")]
    pub fn read_config(path: &Path) -> ConfigResult<Self> {
        let mut file = File::open(path)?;
        let mut toml = String::new();
        file.read_to_string(&mut toml)?;
        Self::from_toml(&toml)
    }

    /// Read a [`Config`] from the given TOML string.
    #[cfg(feature = "toml")]
    pub fn from_toml(toml: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(toml)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values that deserialize but cannot be used
    pub fn validate(&self) -> ConfigResult<()> {
        if self.get_zone_cache_capacity() == 0 {
            return Err(invalid("zone_cache.capacity", "must be positive"));
        }
        if self.get_record_cache_capacity() == 0 {
            return Err(invalid("record_cache.capacity", "must be positive"));
        }
        if self.get_zone_cache_timeout() == 0 {
            return Err(invalid("zone_cache.timeout", "must be positive"));
        }
        if self.get_zone_reload() == Duration::ZERO {
            return Err(invalid("zone_reload", "must be positive"));
        }
        if self.health_check.get_fully_down() >= self.health_check.get_fully_up() {
            return Err(invalid(
                "health_check",
                "fully_down must be lower than fully_up",
            ));
        }
        Ok(())
    }

    /// specify the log level which should be used, ["Trace", "Debug", "Info", "Warn", "Error"]
    pub fn get_log_level(&self) -> tracing::Level {
        if let Some(ref level_str) = self.log_level {
            tracing::Level::from_str(level_str).unwrap_or(tracing::Level::INFO)
        } else {
            tracing::Level::INFO
        }
    }

    /// maximum number of zones kept in memory
    pub fn get_zone_cache_capacity(&self) -> u64 {
        self.zone_cache.capacity.unwrap_or(DEFAULT_ZONE_CACHE_SIZE)
    }

    /// seconds a zone that is not looked up stays in memory, fresh or stale
    pub fn get_zone_cache_timeout(&self) -> u64 {
        self.zone_cache.timeout.unwrap_or(DEFAULT_ZONE_CACHE_TIMEOUT)
    }

    /// maximum number of locations kept in memory
    pub fn get_record_cache_capacity(&self) -> u64 {
        self.record_cache.capacity.unwrap_or(DEFAULT_RECORD_CACHE_SIZE)
    }

    /// seconds a materialized zone or location is served before it is refetched
    pub fn get_record_cache_timeout(&self) -> u64 {
        self.record_cache
            .timeout
            .unwrap_or(DEFAULT_RECORD_CACHE_TIMEOUT)
    }

    /// interval between zone set reload checks
    pub fn get_zone_reload(&self) -> Duration {
        Duration::from_secs(self.zone_reload.unwrap_or(DEFAULT_ZONE_RELOAD))
    }

    /// the backing store connection
    pub fn get_store(&self) -> &StoreConfig {
        &self.store
    }

    /// the health check status bounds
    pub fn get_health_check(&self) -> &HealthCheckConfig {
        &self.health_check
    }
}

fn invalid(field: &'static str, reason: &str) -> crate::error::ConfigError {
    ConfigErrorKind::Invalid {
        field,
        reason: reason.to_string(),
    }
    .into()
}

/// Size and entry lifetime of one cache
#[derive(Deserialize, PartialEq, Eq, Debug, Default)]
pub struct CacheConfig {
    /// maximum number of entries
    pub capacity: Option<u64>,
    /// entry lifetime in seconds, see [`Config::get_zone_cache_timeout`] and
    /// [`Config::get_record_cache_timeout`]
    pub timeout: Option<u64>,
}

/// Connection parameters of the backing store
#[derive(Deserialize, PartialEq, Eq, Debug, Default)]
pub struct StoreConfig {
    /// host:port of the server
    address: Option<String>,
    /// database number
    database: Option<i64>,
    /// password for AUTH
    password: Option<String>,
    /// prepended to every key
    prefix: Option<String>,
    /// appended to every key
    suffix: Option<String>,
    /// connection timeout in milliseconds
    connect_timeout: Option<u64>,
    /// per-command timeout in milliseconds
    read_timeout: Option<u64>,
}

impl StoreConfig {
    /// host:port of the server, defaults to `127.0.0.1:6379`
    pub fn get_address(&self) -> &str {
        self.address.as_deref().unwrap_or(DEFAULT_STORE_ADDRESS)
    }

    /// database number, defaults to 0
    pub fn get_database(&self) -> i64 {
        self.database.unwrap_or(0)
    }

    /// password, if the server requires one
    pub fn get_password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// the key layout using the configured prefix and suffix
    pub fn get_keys(&self) -> StoreKeys {
        StoreKeys::new(
            self.prefix.as_deref().unwrap_or(DEFAULT_STORE_PREFIX),
            self.suffix.as_deref().unwrap_or_default(),
        )
    }

    /// how long to wait for a connection
    pub fn get_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS))
    }

    /// how long to wait for a reply to a command
    pub fn get_read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout.unwrap_or(DEFAULT_READ_TIMEOUT_MS))
    }
}

/// The range of statuses the health checker assigns to an address
#[derive(Deserialize, PartialEq, Eq, Debug, Default, Clone, Copy)]
pub struct HealthCheckConfig {
    /// status at or below which an address is considered down
    fully_down: Option<i32>,
    /// status at or above which an address is considered up
    fully_up: Option<i32>,
}

impl HealthCheckConfig {
    /// Returns a config with the given bounds
    pub fn new(fully_down: i32, fully_up: i32) -> Self {
        Self {
            fully_down: Some(fully_down),
            fully_up: Some(fully_up),
        }
    }

    /// status at or below which an address is excluded, defaults to -10
    pub fn get_fully_down(&self) -> i32 {
        self.fully_down.unwrap_or(DEFAULT_FULLY_DOWN_STATUS)
    }

    /// status of a fully healthy address, defaults to 10
    pub fn get_fully_up(&self) -> i32 {
        self.fully_up.unwrap_or(DEFAULT_FULLY_UP_STATUS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        config.validate().unwrap();

        assert_eq!(config.get_log_level(), tracing::Level::INFO);
        assert_eq!(config.get_zone_cache_capacity(), 10_000);
        assert_eq!(config.get_zone_cache_timeout(), 60);
        assert_eq!(config.get_record_cache_capacity(), 1_000_000);
        assert_eq!(config.get_record_cache_timeout(), 60);
        assert_eq!(config.get_zone_reload(), Duration::from_secs(60));

        let store = config.get_store();
        assert_eq!(store.get_address(), "127.0.0.1:6379");
        assert_eq!(store.get_database(), 0);
        assert_eq!(store.get_password(), None);
        assert_eq!(store.get_keys(), StoreKeys::new("kvdns:", ""));
        assert_eq!(store.get_connect_timeout(), Duration::from_millis(500));
        assert_eq!(store.get_read_timeout(), Duration::from_millis(500));

        assert_eq!(config.get_health_check().get_fully_down(), -10);
        assert_eq!(config.get_health_check().get_fully_up(), 10);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let config: Config = serde_json::from_str(r#"{"zone_reload": 0}"#).unwrap();
        assert!(config.validate().is_err());

        let config: Config =
            serde_json::from_str(r#"{"record_cache": {"capacity": 0}}"#).unwrap();
        assert!(config.validate().is_err());

        let config: Config = serde_json::from_str(r#"{"zone_cache": {"timeout": 0}}"#).unwrap();
        assert!(config.validate().is_err());

        let config: Config =
            serde_json::from_str(r#"{"health_check": {"fully_down": 5, "fully_up": 5}}"#)
                .unwrap();
        assert!(config.validate().is_err());
    }
}
