// Copyright 2015-2023 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Health based filtering of address records

use std::net::IpAddr;

use tracing::debug;

use crate::{
    config::HealthCheckConfig,
    record::{IpRecord, IpSet},
};

/// Source of the current health of addresses
///
/// Statuses range from the configured "fully down" to the configured "fully up" value; the
/// checker decides how probe results move an address along that range.
pub trait HealthStatus: Send + Sync {
    /// The status of `ip` serving `owner`, `None` if it has not been checked
    fn status(&self, owner: &str, ip: IpAddr) -> Option<i32>;
}

impl<F> HealthStatus for F
where
    F: Fn(&str, IpAddr) -> Option<i32> + Send + Sync,
{
    fn status(&self, owner: &str, ip: IpAddr) -> Option<i32> {
        self(owner, ip)
    }
}

/// Returns the addresses of `set` that are healthy enough to answer with.
///
/// If the set's health check is disabled every address is returned. Otherwise addresses whose
/// status is unknown or at most the "fully down" bound are dropped, unless that would drop all of
/// them, in which case every address is returned.
pub fn filter_addresses<'a>(
    owner: &str,
    set: &'a IpSet,
    health: &dyn HealthStatus,
    config: &HealthCheckConfig,
) -> Vec<&'a IpRecord> {
    let all = set.records.iter().collect::<Vec<_>>();
    if !set.health_check.enable {
        return all;
    }

    let down = config.get_fully_down();
    let healthy = set
        .records
        .iter()
        .filter(|record| matches!(health.status(owner, record.ip), Some(status) if status > down))
        .collect::<Vec<_>>();

    if healthy.is_empty() && !all.is_empty() {
        debug!("no healthy address for {owner}, answering with all {}", all.len());
        return all;
    }
    healthy
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::record::IpHealthCheck;

    fn set(enable: bool) -> IpSet {
        IpSet {
            records: ["192.0.2.1", "192.0.2.2", "192.0.2.3"]
                .into_iter()
                .map(|ip| IpRecord {
                    ip: ip.parse().unwrap(),
                    country: Vec::new(),
                    asn: 0,
                    weight: 0,
                })
                .collect(),
            health_check: IpHealthCheck {
                enable,
                ..IpHealthCheck::default()
            },
            ..IpSet::default()
        }
    }

    fn ips(records: &[&IpRecord]) -> Vec<String> {
        records.iter().map(|r| r.ip.to_string()).collect()
    }

    #[test]
    fn test_unhealthy_and_unknown_are_dropped() {
        let mut statuses: HashMap<(String, IpAddr), i32> = HashMap::new();
        statuses.insert(("www.example.com.".to_string(), "192.0.2.1".parse().unwrap()), 10);
        statuses.insert(("www.example.com.".to_string(), "192.0.2.2".parse().unwrap()), -10);

        let health = move |owner: &str, ip: IpAddr| statuses.get(&(owner.to_string(), ip)).copied();
        let set = set(true);
        let config = HealthCheckConfig::default();
        let healthy = filter_addresses("www.example.com.", &set, &health, &config);
        assert_eq!(ips(&healthy), vec!["192.0.2.1"]);
    }

    #[test]
    fn test_partially_down_is_kept() {
        let set = set(true);
        let health = |_: &str, ip: IpAddr| (ip.to_string() == "192.0.2.3").then_some(-9);
        let config = HealthCheckConfig::default();
        let healthy = filter_addresses("www.example.com.", &set, &health, &config);
        assert_eq!(ips(&healthy), vec!["192.0.2.3"]);

        let strict = HealthCheckConfig::new(-5, 10);
        let healthy = filter_addresses("www.example.com.", &set, &health, &strict);
        assert_eq!(healthy.len(), 3);
    }

    #[test]
    fn test_fail_open_when_all_down() {
        let set = set(true);
        let health = |_: &str, _: IpAddr| Some(-10);
        let config = HealthCheckConfig::default();
        let healthy = filter_addresses("www.example.com.", &set, &health, &config);
        assert_eq!(healthy.len(), 3);
    }

    #[test]
    fn test_disabled_check_is_not_filtered() {
        let set = set(false);
        let health = |_: &str, _: IpAddr| -> Option<i32> { None };
        let config = HealthCheckConfig::default();
        let healthy = filter_addresses("www.example.com.", &set, &health, &config);
        assert_eq!(healthy.len(), 3);
    }
}
