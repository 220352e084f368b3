// Copyright 2015-2021 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::{
    collections::HashMap,
    future::Future,
    hash::Hash,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::OnceCell;

/// Coalesces concurrent computations for the same key.
///
/// The first caller for a key runs the computation; callers arriving while it is in flight wait
/// for it and receive a clone of its outcome. Once the computation finishes the key is released,
/// so the next caller starts a fresh one. If the running caller is dropped before finishing, one
/// of the waiters takes over.
pub(crate) struct SingleFlight<K, T> {
    calls: Mutex<HashMap<K, Arc<OnceCell<T>>>>,
}

impl<K, T> SingleFlight<K, T>
where
    K: Hash + Eq + Clone,
    T: Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) async fn run<F, Fut>(&self, key: K, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let call = self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let outcome = call.get_or_init(f).await.clone();

        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        if calls
            .get(&key)
            .is_some_and(|current| Arc::ptr_eq(current, &call))
        {
            calls.remove(&key);
        }

        outcome
    }

    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use futures_util::future::join_all;

    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_call() {
        let group = Arc::new(SingleFlight::<String, usize>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks = (0..16).map(|_| {
            let group = group.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                group
                    .run("example.com.".to_string(), move || async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        calls.fetch_add(1, Ordering::SeqCst) + 1
                    })
                    .await
            })
        });

        for result in join_all(tasks).await {
            assert_eq!(result.unwrap(), 1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(group.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_key_released_after_completion() {
        let group = SingleFlight::<&'static str, u32>::new();

        assert_eq!(group.run("a", || async { 1 }).await, 1);
        assert_eq!(group.run("a", || async { 2 }).await, 2);
        assert_eq!(group.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_distinct_keys_run_independently() {
        let group = SingleFlight::<&'static str, u32>::new();

        let (a, b) = tokio::join!(
            group.run("a", || async { 1 }),
            group.run("b", || async { 2 }),
        );
        assert_eq!((a, b), (1, 2));
    }
}
