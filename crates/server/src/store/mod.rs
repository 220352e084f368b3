// Copyright 2015-2018 Benjamin Fry <benjaminfry -@- me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The key-value backing store behind all zones and records

mod in_memory;
mod keys;
#[cfg(feature = "redis")]
#[cfg_attr(docsrs, doc(cfg(feature = "redis")))]
pub mod redis;

use std::{future::Future, time::Duration};

use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub use self::in_memory::InMemoryStore;
pub use self::keys::{KeyHalf, KeyRole, StoreKeys, APEX_LABEL};
use crate::error::{StoreError, StoreErrorKind, StoreResult};

/// Operations the zone and record caches need from a key-value store
///
/// Implementations bound every operation by their configured timeouts; a timed out operation
/// fails with [`StoreErrorKind::Timeout`].
#[async_trait::async_trait]
pub trait BackingStore: Send + Sync + 'static {
    /// All members of the set stored at `key`, empty if there is no such set
    async fn members(&self, key: &str) -> StoreResult<Vec<String>>;

    /// All field names of the hash stored at `key`, empty if there is no such hash
    async fn hash_field_names(&self, key: &str) -> StoreResult<Vec<String>>;

    /// The string stored at `key`
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// The value of `field` in the hash stored at `key`
    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    /// Sets `field` in the hash stored at `key`
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> StoreResult<()>;

    /// Subscribes to change notifications for keys matching `pattern`.
    ///
    /// `*` in the pattern matches any sequence of characters. The returned subscription yields
    /// [`StoreEvent::Connected`] once the feed is established, then one
    /// [`StoreEvent::Changed`] for every create, update or delete of a matching key.
    async fn subscribe(&self, pattern: &str) -> StoreResult<Subscription>;
}

/// An event delivered on a change notification feed
#[derive(Debug)]
#[non_exhaustive]
pub enum StoreEvent {
    /// The feed is (re)connected; changes made before this point may have been missed
    Connected,
    /// A key matching the subscription pattern was written or deleted
    Changed(String),
    /// The feed failed
    Error(StoreError),
}

/// A live change notification feed
///
/// Dropping the subscription stops the feed; [`Subscription::close`] additionally waits until
/// the feed has been torn down.
pub struct Subscription {
    events: mpsc::Receiver<StoreEvent>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Wraps a feed.
    ///
    /// # Arguments
    ///
    /// * `events` - receiving half of the channel the feed delivers into
    /// * `shutdown` - cancelled when the subscription is closed or dropped
    /// * `task` - the task driving the feed, if any, awaited on close
    pub fn new(
        events: mpsc::Receiver<StoreEvent>,
        shutdown: CancellationToken,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            events,
            shutdown,
            task,
        }
    }

    /// Waits for the next event, `None` once the feed has ended
    pub async fn next(&mut self) -> Option<StoreEvent> {
        self.events.recv().await
    }

    /// Stops the feed and waits for it to be torn down
    pub async fn close(mut self) {
        self.shutdown.cancel();
        self.events.close();
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                warn!("change feed task failed during teardown: {error}");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Returns true if `key` matches the glob `pattern`, where `*` matches any sequence
pub fn pattern_matches(pattern: &str, key: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return key.is_empty();
    };
    let Some(mut rest) = key.strip_prefix(first) else {
        return false;
    };

    let mut parts = parts.peekable();
    if parts.peek().is_none() {
        return rest.is_empty();
    }

    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            return rest.ends_with(part);
        }
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }

    true
}

/// Runs `fut`, failing with [`StoreErrorKind::Timeout`] if it does not finish within `timeout`
pub(crate) async fn with_timeout<T, E, F>(timeout: Duration, fut: F) -> StoreResult<T>
where
    F: Future<Output = Result<T, E>>,
    StoreError: From<E>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(StoreError::from),
        Err(_) => Err(StoreErrorKind::Timeout(timeout).into()),
    }
}
