// Copyright 2015-2018 Benjamin Fry <benjaminfry -@- me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Redis backed store

use std::{future::Future, pin::pin, time::Duration};

use ::redis::{aio::ConnectionManager, aio::PubSub, AsyncCommands, Client, RedisResult};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::StoreConfig,
    error::{StoreErrorKind, StoreResult},
    store::{with_timeout, BackingStore, StoreEvent, Subscription},
};

const FEED_CAPACITY: usize = 64;

/// A [`BackingStore`] on a Redis server
///
/// Commands share one multiplexed connection that is re-established transparently after a
/// failure. Change notifications use Redis keyspace notifications, which this store enables on
/// the server when subscribing.
pub struct RedisStore {
    client: Client,
    connection: ConnectionManager,
    database: i64,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl RedisStore {
    /// Connects to the server described by `config`
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let url = match config.get_password() {
            Some(password) => format!(
                "redis://:{password}@{}/{}",
                config.get_address(),
                config.get_database()
            ),
            None => format!("redis://{}/{}", config.get_address(), config.get_database()),
        };

        let client = Client::open(url)?;
        let connect_timeout = config.get_connect_timeout();
        let connection =
            with_timeout(connect_timeout, ConnectionManager::new(client.clone())).await?;

        info!(
            "connected to redis at {} db {}",
            config.get_address(),
            config.get_database()
        );
        Ok(Self {
            client,
            connection,
            database: config.get_database(),
            connect_timeout,
            read_timeout: config.get_read_timeout(),
        })
    }

    async fn read<T>(&self, fut: impl Future<Output = RedisResult<T>>) -> StoreResult<T> {
        with_timeout(self.read_timeout, fut).await
    }

    fn keyspace_channel(&self, pattern: &str) -> String {
        format!("__keyspace@{}__:{pattern}", self.database)
    }
}

#[async_trait::async_trait]
impl BackingStore for RedisStore {
    async fn members(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.connection.clone();
        self.read(conn.smembers(key)).await
    }

    async fn hash_field_names(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.connection.clone();
        self.read(conn.hkeys(key)).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.connection.clone();
        self.read(conn.get(key)).await
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut conn = self.connection.clone();
        self.read(conn.hget(key, field)).await
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.connection.clone();
        self.read(conn.hset::<_, _, _, ()>(key, field, value)).await
    }

    async fn subscribe(&self, pattern: &str) -> StoreResult<Subscription> {
        let mut conn = self.connection.clone();
        let enabled: RedisResult<()> = ::redis::cmd("CONFIG")
            .arg("SET")
            .arg("notify-keyspace-events")
            .arg("KA")
            .query_async(&mut conn)
            .await;
        if let Err(error) = enabled {
            warn!("could not enable keyspace notifications, relying on polling: {error}");
        }

        let channel = self.keyspace_channel(pattern);
        let mut pubsub = with_timeout(self.connect_timeout, self.client.get_async_pubsub()).await?;
        with_timeout(self.connect_timeout, pubsub.psubscribe(&channel)).await?;
        debug!("subscribed to {channel}");

        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        let shutdown = CancellationToken::new();
        let prefix = format!("__keyspace@{}__:", self.database);
        let task = tokio::spawn(run_feed(pubsub, channel, prefix, tx, shutdown.clone()));

        Ok(Subscription::new(rx, shutdown, Some(task)))
    }
}

async fn run_feed(
    mut pubsub: PubSub,
    channel: String,
    prefix: String,
    events: mpsc::Sender<StoreEvent>,
    shutdown: CancellationToken,
) {
    if events.send(StoreEvent::Connected).await.is_err() {
        return;
    }

    {
        let mut messages = pin!(pubsub.on_message());
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                message = messages.next() => {
                    let Some(message) = message else {
                        let closed = StoreEvent::Error(StoreErrorKind::FeedClosed.into());
                        let _ = events.send(closed).await;
                        break;
                    };
                    let name = message.get_channel_name();
                    let key = name.strip_prefix(prefix.as_str()).unwrap_or(name).to_string();
                    if events.send(StoreEvent::Changed(key)).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    if let Err(error) = pubsub.punsubscribe(&channel).await {
        debug!("failed to unsubscribe from {channel}: {error}");
    }
    debug!("change feed for {channel} stopped");
}
