// Copyright 2015-2026 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use metrics::{counter, describe_counter, Counter, Unit};

/// Counters reported by a zone or record cache
#[derive(Clone)]
pub struct CacheMetrics {
    pub(super) hits: Counter,
    pub(super) misses: Counter,
    pub(super) stale: Counter,
    pub(super) failures: Counter,
}

impl CacheMetrics {
    /// Registers the counters for the cache named `cache` with the global `metrics` recorder
    pub fn new(cache: &'static str) -> Self {
        let cache_key = "cache";
        let hits_name = "kvdns_cache_hits_total";
        let misses_name = "kvdns_cache_misses_total";
        let stale_name = "kvdns_cache_stale_total";
        let failures_name = "kvdns_cache_fetch_failures_total";

        let new = Self {
            hits: counter!(hits_name, cache_key => cache),
            misses: counter!(misses_name, cache_key => cache),
            stale: counter!(stale_name, cache_key => cache),
            failures: counter!(failures_name, cache_key => cache),
        };

        describe_counter!(
            hits_name,
            Unit::Count,
            "Number of lookups answered from a fresh entry."
        );
        describe_counter!(
            misses_name,
            Unit::Count,
            "Number of lookups that required a fetch."
        );
        describe_counter!(
            stale_name,
            Unit::Count,
            "Number of lookups answered from an expired entry after a failed fetch."
        );
        describe_counter!(
            failures_name,
            Unit::Count,
            "Number of failed fetches from the backing store."
        );
        new
    }

    /// Counters that record nothing
    pub fn noop() -> Self {
        Self {
            hits: Counter::noop(),
            misses: Counter::noop(),
            stale: Counter::noop(),
            failures: Counter::noop(),
        }
    }
}
