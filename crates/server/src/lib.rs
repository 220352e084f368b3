// Copyright 2015-2021 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

// LIBRARY WARNINGS
#![warn(
    clippy::default_trait_access,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::unimplemented,
    clippy::use_self,
    missing_copy_implementations,
    missing_docs,
    non_snake_case,
    non_upper_case_globals,
    rust_2018_idioms,
    unreachable_pub
)]
#![allow(clippy::upper_case_acronyms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! kvdns is the zone and record resolution core of an authoritative DNS server whose data lives
//! in a remote key-value store.
//!
//! # Goals
//!
//! * Only safe Rust
//! * All errors handled, store outages degrade to stale answers
//! * One store round-trip per cache key under concurrent load
//! * Zone set changes picked up without explicit invalidation
//! * DNSSEC keys materialized and signed on load
//!
//! The entry point is [`Catalog`], which ties the [`zone::ZoneIndex`], the zone and record caches
//! and the [`refresher::ZoneRefresher`] together over a [`store::BackingStore`].

pub use hickory_proto as proto;

mod cache;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod dnssec;
pub mod error;
pub mod health;
pub mod record;
pub mod refresher;
pub mod store;
pub mod zone;

pub use self::cache::CacheMetrics;
pub use self::catalog::Catalog;

/// Returns the current version of kvdns
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
