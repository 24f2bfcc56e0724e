//! Hot store: metadata records, work queue and recency index.
//!
//! The production backend is Redis. Every operation the façade needs maps to
//! one round trip:
//!
//! - metadata upsert and first-save enqueue run as one Lua script, so the
//!   "is this the record's first save" check and the queue push cannot race
//!   another writer
//! - dequeue uses `BRPOP`, whose pop is atomic across concurrent consumers
//!
//! `BRPOP` blocks the connection it runs on, so blocking pops use a small
//! pool of dedicated multiplexed connections instead of the shared
//! [`ConnectionManager`].

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::{AsyncCommands, Script};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StoreError;

/// Queue pushes that accompany the first write of a metadata record.
#[derive(Debug, Clone, Copy)]
pub struct Enqueue<'a> {
    /// Work queue list key.
    pub queue_key: &'a str,
    /// Recency index list key.
    pub recent_key: &'a str,
    /// Value pushed onto both lists.
    pub member: &'a str,
    /// Length the recency index is trimmed to.
    pub recent_capacity: usize,
}

/// Result of [`HotStore::upsert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upsert {
    /// The key did not exist; queue pushes (if any) were applied.
    Created,
    /// An existing value was replaced.
    Updated,
    /// Nothing was written: a pending record may not replace a stored record
    /// whose status is `current`.
    Rejected { current: String },
}

/// Key/value service with atomic list operations.
///
/// Lists are pushed on the left and popped on the right, so the queue is FIFO
/// and [`HotStore::range`] returns most recent first.
#[async_trait]
pub trait HotStore: Send + Sync {
    /// Connectivity probe.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes `value` at `key`.
    ///
    /// `enqueue` marks `value` as a pending record. Such a write is refused
    /// when the stored record's `status` field is anything but `pending`, and
    /// when the key did not exist the member is pushed onto the queue and the
    /// recency index. Check, write and pushes happen in one atomic step.
    async fn upsert(
        &self,
        key: &str,
        value: &str,
        enqueue: Option<Enqueue<'_>>,
    ) -> Result<Upsert, StoreError>;

    /// First `limit` elements of a list, left to right.
    async fn range(&self, key: &str, limit: usize) -> Result<Vec<String>, StoreError>;

    /// Pops the oldest element of a list, waiting up to `timeout`.
    async fn pop_blocking(&self, key: &str, timeout: Duration)
        -> Result<Option<String>, StoreError>;

    async fn len(&self, key: &str) -> Result<usize, StoreError>;
}

/// Status value a pending record carries.
pub(crate) const PENDING_STATUS: &str = "pending";

/// Replies `{1, ''}` created, `{0, ''}` updated, `{2, status}` rejected.
const UPSERT_SCRIPT: &str = r#"
local existing = redis.call('GET', KEYS[1])
if existing and ARGV[2] == '1' then
    local ok, record = pcall(cjson.decode, existing)
    if ok and type(record) == 'table' and type(record.status) == 'string'
        and record.status ~= 'pending' then
        return {2, record.status}
    end
end
redis.call('SET', KEYS[1], ARGV[1])
if existing then
    return {0, ''}
end
if ARGV[2] == '1' then
    redis.call('LPUSH', KEYS[2], ARGV[3])
    redis.call('LPUSH', KEYS[3], ARGV[3])
    redis.call('LTRIM', KEYS[3], 0, tonumber(ARGV[4]) - 1)
end
return {1, ''}
"#;

/// `LRANGE` stop index for the first `limit` elements, `None` for zero.
///
/// A stop of -1 means "everything", so zero is not expressible.
fn lrange_stop(limit: usize) -> Option<isize> {
    if limit == 0 {
        return None;
    }
    Some(isize::try_from(limit).unwrap_or(isize::MAX) - 1)
}

/// Redis-backed hot store.
pub struct RedisHotStore {
    /// Used to open dedicated connections for blocking pops.
    client: redis::Client,
    /// Shared connection for non-blocking commands (reconnects automatically).
    conn: ConnectionManager,
    /// Idle connections reserved for `BRPOP`.
    blocking: Mutex<Vec<MultiplexedConnection>>,
    upsert_script: Script,
}

impl RedisHotStore {
    /// Connects to Redis and verifies the server answers `PING`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::BackendUnavailable` if the URL is invalid or the
    /// server cannot be reached.
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url).map_err(|e| {
            StoreError::BackendUnavailable(format!("invalid redis url '{}': {}", redis_url, e))
        })?;

        let conn = ConnectionManager::new(client.clone()).await.map_err(|e| {
            StoreError::BackendUnavailable(format!(
                "failed to connect to redis at {}: {}",
                redis_url, e
            ))
        })?;

        let store = Self {
            client,
            conn,
            blocking: Mutex::new(Vec::new()),
            upsert_script: Script::new(UPSERT_SCRIPT),
        };
        store.ping().await?;

        debug!(redis_url = %redis_url, "Connected to hot store");
        Ok(store)
    }

    async fn blocking_connection(&self) -> Result<MultiplexedConnection, StoreError> {
        if let Some(conn) = self.blocking.lock().await.pop() {
            return Ok(conn);
        }
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl HotStore for RedisHotStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::BackendUnavailable(format!("redis ping failed: {}", e)))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn upsert(
        &self,
        key: &str,
        value: &str,
        enqueue: Option<Enqueue<'_>>,
    ) -> Result<Upsert, StoreError> {
        let mut conn = self.conn.clone();

        let mut invocation = self.upsert_script.prepare_invoke();
        invocation.key(key).arg(value);
        match enqueue {
            Some(enqueue) => {
                invocation
                    .key(enqueue.queue_key)
                    .key(enqueue.recent_key)
                    .arg(1)
                    .arg(enqueue.member)
                    .arg(enqueue.recent_capacity.max(1));
            }
            None => {
                invocation.arg(0);
            }
        }

        let (code, current): (i64, String) = invocation.invoke_async(&mut conn).await?;
        match code {
            1 => Ok(Upsert::Created),
            0 => Ok(Upsert::Updated),
            _ => Ok(Upsert::Rejected { current }),
        }
    }

    async fn range(&self, key: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        let Some(stop) = lrange_stop(limit) else {
            return Ok(Vec::new());
        };
        let mut conn = self.conn.clone();
        let values: Vec<String> = conn.lrange(key, 0, stop).await?;
        Ok(values)
    }

    async fn pop_blocking(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<Option<String>, StoreError> {
        let mut conn = self.blocking_connection().await?;
        let timeout_secs = timeout.as_secs().max(1);

        let result: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(key)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await?;

        // Only healthy connections go back to the pool
        self.blocking.lock().await.push(conn);
        Ok(result.map(|(_, value)| value))
    }

    async fn len(&self, key: &str) -> Result<usize, StoreError> {
        let mut conn = self.conn.clone();
        let len: usize = conn.llen(key).await?;
        Ok(len)
    }
}
