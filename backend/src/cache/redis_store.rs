//! Redis session store
//!
//! Distributed store for multi-instance deployments.
//!
//! ## Layout
//!
//! - `session:{user_id}:{session_id}` holds the JSON record, written with
//!   `SET .. EX` so Redis enforces the TTL.
//! - `sessions:{user_id}` is a set of the user's session ids. Members whose
//!   record has expired are pruned whenever the set is listed. Its expiry is
//!   only ever extended, so it outlives every record it indexes even when
//!   the session timeout is lowered between logins.

use crate::cache::{SessionRecord, SessionStore};
use crate::errors::{ServiceError, ServiceResult};
use async_trait::async_trait;
use redis::{AsyncCommands, Script};
use redis::aio::ConnectionManager;
use std::time::Duration;

/// Writes the record, indexes it and extends (never shortens) the index TTL.
///
/// KEYS: record key, index key. ARGV: record JSON, TTL seconds, session id.
/// `TTL` answers -1 for a key without expiry, so a fresh index always gets one.
const PUT_SESSION_SCRIPT: &str = r#"
redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[2])
redis.call('SADD', KEYS[2], ARGV[3])
local ttl = tonumber(ARGV[2])
if redis.call('TTL', KEYS[2]) < ttl then
    redis.call('EXPIRE', KEYS[2], ttl)
end
return 1
"#;

/// Redis-backed [`SessionStore`] sharing one multiplexed connection.
#[derive(Clone)]
pub struct RedisSessionStore {
    connection: ConnectionManager,
    put_script: Script,
}

impl RedisSessionStore {
    /// Connects to Redis, e.g. `redis://localhost:6379`.
    pub async fn connect(url: &str) -> ServiceResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| ServiceError::cache(format!("Failed to create Redis client: {}", e)))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| ServiceError::cache(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self {
            connection,
            put_script: Script::new(PUT_SESSION_SCRIPT),
        })
    }

    fn record_key(user_id: &str, session_id: &str) -> String {
        format!("session:{}:{}", user_id, session_id)
    }

    fn index_key(user_id: &str) -> String {
        format!("sessions:{}", user_id)
    }
}

fn ttl_seconds(ttl: Duration) -> u64 {
    // EX 0 is rejected by Redis.
    ttl.as_secs().max(1)
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn put(&self, record: &SessionRecord, ttl: Duration) -> ServiceResult<()> {
        let mut conn = self.connection.clone();
        let value = serde_json::to_string(record)?;

        let _: i64 = self
            .put_script
            .key(Self::record_key(&record.user_id, &record.session_id))
            .key(Self::index_key(&record.user_id))
            .arg(value)
            .arg(ttl_seconds(ttl))
            .arg(&record.session_id)
            .invoke_async(&mut conn)
            .await?;

        Ok(())
    }

    async fn get(&self, user_id: &str, session_id: &str) -> ServiceResult<Option<SessionRecord>> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn.get(Self::record_key(user_id, session_id)).await?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, user_id: &str, session_id: &str) -> ServiceResult<bool> {
        let mut conn = self.connection.clone();
        let (deleted, _): (i64, i64) = redis::pipe()
            .atomic()
            .cmd("DEL")
            .arg(Self::record_key(user_id, session_id))
            .cmd("SREM")
            .arg(Self::index_key(user_id))
            .arg(session_id)
            .query_async(&mut conn)
            .await?;

        Ok(deleted > 0)
    }

    async fn list(&self, user_id: &str) -> ServiceResult<Vec<SessionRecord>> {
        let mut conn = self.connection.clone();
        let index = Self::index_key(user_id);
        let session_ids: Vec<String> = conn.smembers(&index).await?;
        if session_ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = session_ids
            .iter()
            .map(|session_id| Self::record_key(user_id, session_id))
            .collect();
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await?;

        let mut records = Vec::with_capacity(values.len());
        let mut stale = Vec::new();
        for (session_id, value) in session_ids.into_iter().zip(values) {
            match value {
                Some(json) => records.push(serde_json::from_str::<SessionRecord>(&json)?),
                None => stale.push(session_id),
            }
        }

        if !stale.is_empty() {
            let _: () = conn.srem(&index, &stale).await?;
        }

        Ok(records)
    }

    async fn remove_all(&self, user_id: &str) -> ServiceResult<usize> {
        let mut conn = self.connection.clone();
        let index = Self::index_key(user_id);
        let session_ids: Vec<String> = conn.smembers(&index).await?;

        let mut keys: Vec<String> = session_ids
            .iter()
            .map(|session_id| Self::record_key(user_id, session_id))
            .collect();
        let live = if keys.is_empty() {
            0
        } else {
            let count: i64 = redis::cmd("EXISTS").arg(&keys).query_async(&mut conn).await?;
            count as usize
        };

        keys.push(index);
        let _: () = conn.del(&keys).await?;

        Ok(live)
    }

    fn store_name(&self) -> &'static str {
        "redis"
    }
}

impl std::fmt::Debug for RedisSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSessionStore").finish_non_exhaustive()
    }
}
