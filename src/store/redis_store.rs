//! Redis backend.
//!
//! Commands go through a shared `ConnectionManager`; change notifications use
//! a dedicated pub/sub connection subscribed to keyspace events.

use super::{DurableStore, KeyEvent, KeyEventKind, KeyTtl, StoreResult};
use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const NOTIFY_CONFIG_KEY: &str = "notify-keyspace-events";
/// K = keyspace channel, E = keyevent channel, A = all event classes
const NOTIFY_FLAGS: &str = "KEA";
const EVENT_BUFFER: usize = 1024;

pub struct RedisStore {
    client: redis::Client,
    conn: ConnectionManager,
    db: u32,
}

impl RedisStore {
    pub async fn connect(url: &str, db: u32) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { client, conn, db })
    }

    fn keyspace_channel_prefix(&self) -> String {
        format!("__keyspace@{}__:", self.db)
    }
}

/// True when the flags already cover keyspace events for string writes,
/// deletions and expirations.
fn notifications_enabled(flags: &str) -> bool {
    let keyspace = flags.contains('K');
    let all = flags.contains('A');
    let needed = flags.contains('$') && flags.contains('g') && flags.contains('x');
    keyspace && (all || needed)
}

fn expiry_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl DurableStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(expiry_secs(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        // Nil reply means the key already existed
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(expiry_secs(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(key).await?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl> {
        let mut conn = self.conn.clone();
        let secs: i64 = conn.ttl(key).await?;
        Ok(match secs {
            -2 => KeyTtl::Missing,
            -1 => KeyTtl::Persistent,
            s => KeyTtl::Remaining(Duration::from_secs(s.max(0) as u64)),
        })
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let pattern = format!("{prefix}*");
        let mut keys = Vec::new();
        let mut iter: redis::AsyncIter<String> = conn.scan_match(&pattern).await?;
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        Ok(keys)
    }

    async fn subscribe(&self, prefix: &str) -> StoreResult<mpsc::Receiver<KeyEvent>> {
        let channel_prefix = self.keyspace_channel_prefix();
        let pattern = format!("{channel_prefix}{prefix}*");

        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.psubscribe(&pattern).await?;
        info!(%pattern, "Subscribed to keyspace notifications");

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(msg) = messages.next().await {
                let channel = msg.get_channel_name();
                let key = channel.strip_prefix(&channel_prefix).unwrap_or(channel);
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(%key, error = %e, "Undecodable keyspace payload");
                        continue;
                    }
                };

                let event = KeyEvent::new(key, KeyEventKind::from_payload(&payload));
                if tx.send(event).await.is_err() {
                    debug!("Keyspace event receiver dropped");
                    return;
                }
            }
            warn!("Keyspace subscription stream ended");
        });

        Ok(rx)
    }

    async fn enable_notifications(&self) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let current: Vec<String> = redis::cmd("CONFIG")
            .arg("GET")
            .arg(NOTIFY_CONFIG_KEY)
            .query_async(&mut conn)
            .await?;

        let flags = current.get(1).map(String::as_str).unwrap_or_default();
        if notifications_enabled(flags) {
            info!(%flags, "Keyspace notifications already enabled");
            return Ok(false);
        }

        let _: () = redis::cmd("CONFIG")
            .arg("SET")
            .arg(NOTIFY_CONFIG_KEY)
            .arg(NOTIFY_FLAGS)
            .query_async(&mut conn)
            .await?;
        info!(previous = %flags, "Enabled keyspace notifications");
        Ok(true)
    }
}
