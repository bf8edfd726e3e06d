//! Redis-backed execution store for multi-process deployments.
//!
//! Single-key commands are atomic in Redis already. The two compound
//! operations run as Lua scripts so they execute atomically on the server:
//!
//! - increment-with-initial: `SET key initial` when absent, `INCR` otherwise
//! - compare-and-set: `GET`, compare, `SET ... EX`
//!
//! Every key is namespaced with the configured prefix.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisError, Script};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::RedisConfig;
use crate::ports::{ExecutionStateStore, StateStoreError};

const INCREMENT_WITH_INITIAL: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  local v = redis.call('INCR', KEYS[1])
  redis.call('EXPIRE', KEYS[1], ARGV[2])
  return v
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[2])
return tonumber(ARGV[1])
"#;

const COMPARE_AND_SET: &str = r#"
local current = redis.call('GET', KEYS[1])
if ARGV[1] == '1' then
  if current ~= ARGV[2] then return 0 end
elseif current then
  return 0
end
redis.call('SET', KEYS[1], ARGV[3], 'EX', ARGV[4])
return 1
"#;

/// Redis-backed execution store.
///
/// Holds `pool_size` multiplexed connections and hands them out round-robin.
#[derive(Clone)]
pub struct RedisExecutionStore {
    conns: Arc<Vec<MultiplexedConnection>>,
    next: Arc<AtomicUsize>,
    prefix: String,
    increment_script: Arc<Script>,
    cas_script: Arc<Script>,
}

impl RedisExecutionStore {
    /// Open the configured number of connections.
    pub async fn connect(config: &RedisConfig) -> Result<Self, StateStoreError> {
        let client = redis::Client::open(config.url.as_str()).map_err(map_redis_error)?;

        let mut conns = Vec::with_capacity(config.pool_size as usize);
        for _ in 0..config.pool_size.max(1) {
            let conn = tokio::time::timeout(config.timeout(), client.get_multiplexed_tokio_connection())
                .await
                .map_err(|_| StateStoreError::Unavailable("connection timed out".to_string()))?
                .map_err(map_redis_error)?;
            conns.push(conn);
        }

        Ok(Self::from_connections(conns, &config.key_prefix))
    }

    /// Build a store over already-open connections.
    pub fn from_connections(conns: Vec<MultiplexedConnection>, prefix: &str) -> Self {
        Self {
            conns: Arc::new(conns),
            next: Arc::new(AtomicUsize::new(0)),
            prefix: prefix.to_string(),
            increment_script: Arc::new(Script::new(INCREMENT_WITH_INITIAL)),
            cas_script: Arc::new(Script::new(COMPARE_AND_SET)),
        }
    }

    fn conn(&self) -> Result<MultiplexedConnection, StateStoreError> {
        if self.conns.is_empty() {
            return Err(StateStoreError::Unavailable("no open connections".to_string()));
        }
        let slot = self.next.fetch_add(1, Ordering::Relaxed) % self.conns.len();
        Ok(self.conns[slot].clone())
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }
}

/// Redis rejects `EX 0`; sub-second lifetimes round up to one second.
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

fn map_redis_error(err: RedisError) -> StateStoreError {
    if err.code() == Some("WRONGTYPE") {
        return StateStoreError::WrongType {
            key: err.detail().unwrap_or_default().to_string(),
        };
    }
    if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout() {
        return StateStoreError::Unavailable(err.to_string());
    }
    StateStoreError::CommandFailed(err.to_string())
}

#[async_trait]
impl ExecutionStateStore for RedisExecutionStore {
    async fn increment(
        &self,
        key: &str,
        initial: i64,
        ttl: Duration,
    ) -> Result<Option<i64>, StateStoreError> {
        let mut conn = self.conn()?;
        self.increment_script
            .key(self.key(key))
            .arg(initial)
            .arg(ttl_secs(ttl))
            .invoke_async::<_, Option<i64>>(&mut conn)
            .await
            .map_err(map_redis_error)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StateStoreError> {
        let mut conn = self.conn()?;
        conn.get::<_, Option<String>>(self.key(key))
            .await
            .map_err(map_redis_error)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StateStoreError> {
        let mut conn = self.conn()?;
        redis::cmd("SET")
            .arg(self.key(key))
            .arg(value)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(map_redis_error)
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StateStoreError> {
        let mut conn = self.conn()?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key(key))
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(reply.is_some())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Duration,
    ) -> Result<bool, StateStoreError> {
        let mut conn = self.conn()?;
        let (has_expected, expected) = match expected {
            Some(value) => ("1", value),
            None => ("0", ""),
        };
        let swapped: i64 = self
            .cas_script
            .key(self.key(key))
            .arg(has_expected)
            .arg(expected)
            .arg(new)
            .arg(ttl_secs(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(swapped == 1)
    }

    async fn add_member(
        &self,
        key: &str,
        member: &str,
        ttl: Duration,
    ) -> Result<bool, StateStoreError> {
        let mut conn = self.conn()?;
        let key = self.key(key);
        let (added,): (i64,) = redis::pipe()
            .atomic()
            .cmd("SADD")
            .arg(&key)
            .arg(member)
            .cmd("EXPIRE")
            .arg(&key)
            .arg(ttl_secs(ttl))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(added == 1)
    }

    async fn remove_member(&self, key: &str, member: &str) -> Result<bool, StateStoreError> {
        let mut conn = self.conn()?;
        let removed: i64 = conn
            .srem(self.key(key), member)
            .await
            .map_err(map_redis_error)?;
        Ok(removed == 1)
    }

    async fn members(&self, key: &str) -> Result<Vec<String>, StateStoreError> {
        let mut conn = self.conn()?;
        conn.smembers::<_, Vec<String>>(self.key(key))
            .await
            .map_err(map_redis_error)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StateStoreError> {
        let mut conn = self.conn()?;
        let updated: i64 = redis::cmd("EXPIRE")
            .arg(self.key(key))
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(updated == 1)
    }

    async fn delete(&self, key: &str) -> Result<bool, StateStoreError> {
        let mut conn = self.conn()?;
        let removed: i64 = conn.del(self.key(key)).await.map_err(map_redis_error)?;
        Ok(removed == 1)
    }
}

impl std::fmt::Debug for RedisExecutionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisExecutionStore")
            .field("prefix", &self.prefix)
            .field("connections", &self.conns.len())
            .finish_non_exhaustive()
    }
}
