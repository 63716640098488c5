// src/storage/redis.rs

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, Script};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::config::RedisConfig;
use crate::error::{Result, StorageError, ThrottleError};
use crate::storage::EventStore;
use crate::store_op;

// KEYS[1] is the requestor index, KEYS[i] (i > 1) the event set of requestor ARGV[i].
// A requestor leaves the index only if its set is empty when the script runs.
const PRUNE_SCRIPT: &str = r#"
local removed = 0
for i = 2, #KEYS do
    removed = removed + redis.call('ZREMRANGEBYSCORE', KEYS[i], '-inf', ARGV[1])
    if redis.call('ZCARD', KEYS[i]) == 0 then
        redis.call('SREM', KEYS[1], ARGV[i])
    end
end
return removed
"#;

/// Redis-backed event log.
///
/// Each `(throttle, requestor)` pair owns a sorted set scored by timestamp.
/// Members are random UUIDs so two events in the same second stay distinct.
/// A per-throttle set indexes the requestors so pruning can reach every
/// pair of a throttle.
///
/// Commands are spread round-robin over `pool_size` connections.
pub struct RedisEventStore {
    client: Client,
    connections: Arc<Vec<tokio::sync::Mutex<ConnectionManager>>>,
    next: Arc<AtomicUsize>,
    prune_script: Script,
    config: RedisConfig,
}

// Manually implement Debug
impl fmt::Debug for RedisEventStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisEventStore")
            .field("url", &self.config.url)
            .field("key_prefix", &self.config.key_prefix)
            .field("pool_size", &self.connections.len())
            .finish()
    }
}

// Manually implement Clone
impl Clone for RedisEventStore {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            connections: Arc::clone(&self.connections),
            next: Arc::clone(&self.next),
            prune_script: self.prune_script.clone(),
            config: self.config.clone(),
        }
    }
}

fn command_error(e: redis::RedisError) -> ThrottleError {
    ThrottleError::from(e)
}

impl RedisEventStore {
    /// Connects to Redis, giving up after `connection_timeout`
    pub async fn new(config: RedisConfig) -> Result<Self> {
        // Open the client - this doesn't actually connect to Redis yet
        let client = Client::open(config.url.as_str()).map_err(|e| {
            ThrottleError::StoreUnavailable(StorageError::RedisConnection(e.to_string()))
        })?;

        let pool_size = config.pool_size.max(1) as usize;
        let connection_future = futures::future::try_join_all(
            (0..pool_size).map(|_| ConnectionManager::new(client.clone())),
        );

        let managers =
            match tokio::time::timeout(config.connection_timeout, connection_future).await {
                Ok(result) => result.map_err(|e| {
                    ThrottleError::StoreUnavailable(StorageError::RedisConnection(e.to_string()))
                })?,
                Err(_) => {
                    return Err(ThrottleError::StoreUnavailable(
                        StorageError::RedisConnection(format!(
                            "Connection to Redis at {} timed out after {:?}",
                            config.url, config.connection_timeout
                        )),
                    ));
                }
            };

        Ok(Self {
            client,
            connections: Arc::new(
                managers
                    .into_iter()
                    .map(tokio::sync::Mutex::new)
                    .collect(),
            ),
            next: Arc::new(AtomicUsize::new(0)),
            prune_script: Script::new(PRUNE_SCRIPT),
            config,
        })
    }

    /// Number of open connections
    pub fn pool_size(&self) -> usize {
        self.connections.len()
    }

    fn connection(&self) -> &tokio::sync::Mutex<ConnectionManager> {
        let slot = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        &self.connections[slot]
    }

    /// Ping Redis to check health with timeout
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().lock().await;

        let ping_future = redis::AsyncCommands::ping::<String>(&mut *conn);

        let result = match tokio::time::timeout(self.config.connection_timeout, ping_future).await
        {
            Ok(inner_result) => inner_result.map_err(command_error)?,
            Err(_) => {
                return Err(ThrottleError::StoreUnavailable(StorageError::Timeout(
                    format!(
                        "Redis PING operation timed out after {:?}",
                        self.config.connection_timeout
                    ),
                )));
            }
        };

        if result == "PONG" {
            Ok(())
        } else {
            Err(ThrottleError::StoreUnavailable(StorageError::RedisCommand(
                format!("Unexpected response from Redis PING: {}", result),
            )))
        }
    }

    /// Sorted set holding one pair's events. The throttle id is length-prefixed
    /// so ids containing ':' cannot collide.
    fn events_key(&self, throttle_id: &str, requestor_id: &str) -> String {
        format!(
            "{}:events:{}:{}:{}",
            self.config.key_prefix,
            throttle_id.len(),
            throttle_id,
            requestor_id
        )
    }

    /// Set of requestor ids that have events under a throttle
    fn requestors_key(&self, throttle_id: &str) -> String {
        format!("{}:requestors:{}", self.config.key_prefix, throttle_id)
    }

    /// Removes every key this store wrote for one throttle.
    pub async fn clear_throttle(&self, throttle_id: &str) -> Result<()> {
        let index = self.requestors_key(throttle_id);
        let mut conn = self.connection().lock().await;

        let requestors: Vec<String> = conn.smembers(&index).await.map_err(command_error)?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for requestor_id in &requestors {
            pipe.del(self.events_key(throttle_id, requestor_id)).ignore();
        }
        pipe.del(&index).ignore();
        let _: () = pipe.query_async(&mut *conn).await.map_err(command_error)?;

        Ok(())
    }

    async fn prune_locked(
        &self,
        conn: &mut ConnectionManager,
        throttle_id: &str,
        older_than: u64,
    ) -> Result<()> {
        let index = self.requestors_key(throttle_id);
        let requestors: Vec<String> = conn.smembers(&index).await.map_err(command_error)?;
        if requestors.is_empty() {
            return Ok(());
        }

        // Exclusive upper bound: events exactly at `older_than` survive
        let mut invocation = self.prune_script.prepare_invoke();
        invocation.key(&index).arg(format!("({}", older_than));
        for requestor_id in &requestors {
            invocation
                .key(self.events_key(throttle_id, requestor_id))
                .arg(requestor_id);
        }

        let removed: u64 = invocation.invoke_async(conn).await.map_err(command_error)?;
        if removed > 0 {
            debug!(throttle_id, removed, older_than, "Pruned stale events");
        }

        Ok(())
    }
}

#[async_trait]
impl EventStore for RedisEventStore {
    async fn prune(&self, throttle_id: &str, older_than: u64) -> Result<()> {
        let started = Instant::now();
        let mut conn = self.connection().lock().await;
        let result = self.prune_locked(&mut conn, throttle_id, older_than).await;
        store_op!("prune", throttle_id, result, started.elapsed().as_millis() as u64);

        result
    }

    async fn record(&self, throttle_id: &str, requestor_id: &str, at: u64) -> Result<()> {
        let started = Instant::now();
        let member = Uuid::new_v4().to_string();
        let mut conn = self.connection().lock().await;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .zadd(self.events_key(throttle_id, requestor_id), member, at)
            .ignore()
            .sadd(self.requestors_key(throttle_id), requestor_id)
            .ignore();
        let result: Result<()> = pipe.query_async(&mut *conn).await.map_err(command_error);
        store_op!("record", throttle_id, result, started.elapsed().as_millis() as u64);

        result
    }

    async fn count_since(
        &self,
        throttle_id: &str,
        requestor_id: &str,
        since: u64,
    ) -> Result<u64> {
        let started = Instant::now();
        let key = self.events_key(throttle_id, requestor_id);
        let mut conn = self.connection().lock().await;

        let result: Result<u64> = conn
            .zcount(&key, since, "+inf")
            .await
            .map_err(command_error);
        store_op!("count_since", throttle_id, result, started.elapsed().as_millis() as u64);

        result
    }
}
