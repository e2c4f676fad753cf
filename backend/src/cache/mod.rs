//! Session cache: the only cross-request shared state of the service.
//!
//! Every successful login writes one [`SessionRecord`] with a TTL equal to the
//! session timeout. A token is only honoured while the session it is bound to
//! is still here, which is what makes logout, forced logout and concurrent
//! session limits work despite self-contained tokens.
//!
//! Storage is pluggable through [`SessionStore`]; [`SessionCache`] layers the
//! concurrency policy on top of any store.

use crate::errors::ServiceResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub mod memory;
pub mod redis_store;

pub use memory::MemorySessionStore;
pub use redis_store::RedisSessionStore;

/// One active login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Role names, most privileged first
    pub roles: Vec<String>,
    pub session_id: String,
    pub login_at: DateTime<Utc>,
}

/// Key/value storage for session records with per-record expiry.
///
/// All writes are whole-record upserts.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Upserts `record` under `(user_id, session_id)` for `ttl`.
    async fn put(&self, record: &SessionRecord, ttl: Duration) -> ServiceResult<()>;

    /// `None` when absent or expired.
    async fn get(&self, user_id: &str, session_id: &str) -> ServiceResult<Option<SessionRecord>>;

    /// Returns whether a live session was removed.
    async fn remove(&self, user_id: &str, session_id: &str) -> ServiceResult<bool>;

    /// All live sessions of a user, in no particular order.
    async fn list(&self, user_id: &str) -> ServiceResult<Vec<SessionRecord>>;

    /// Removes every session of a user and returns how many were live.
    async fn remove_all(&self, user_id: &str) -> ServiceResult<usize>;

    fn store_name(&self) -> &'static str;
}

/// Session operations used by login and the authorization middleware.
#[derive(Clone)]
pub struct SessionCache {
    store: Arc<dyn SessionStore>,
}

impl SessionCache {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub async fn put(&self, record: &SessionRecord, ttl: Duration) -> ServiceResult<()> {
        self.store.put(record, ttl).await
    }

    pub async fn get(&self, user_id: &str, session_id: &str) -> ServiceResult<Option<SessionRecord>> {
        self.store.get(user_id, session_id).await
    }

    pub async fn remove(&self, user_id: &str, session_id: &str) -> ServiceResult<bool> {
        self.store.remove(user_id, session_id).await
    }

    pub async fn remove_all(&self, user_id: &str) -> ServiceResult<usize> {
        self.store.remove_all(user_id).await
    }

    pub async fn active_sessions(&self, user_id: &str) -> ServiceResult<Vec<SessionRecord>> {
        let mut sessions = self.store.list(user_id).await?;
        sort_oldest_first(&mut sessions);
        Ok(sessions)
    }

    /// Evicts the oldest sessions so that, together with `new_session`, at
    /// most `max_sessions` remain. Returns the evicted session ids.
    ///
    /// Sessions are ranked by `login_at`, ties by session id; the lowest ranks
    /// go first. `new_session` itself is never evicted here, whether or not it
    /// has been written yet, so this may run concurrently with its `put`.
    /// Two racing logins can leave the user briefly over the limit; the next
    /// enforcement (or the TTL) brings it back down. `max_sessions` of 0 is
    /// treated as 1.
    pub async fn enforce_max_concurrency(
        &self,
        new_session: &SessionRecord,
        max_sessions: u32,
    ) -> ServiceResult<Vec<String>> {
        let allowed = max_sessions.max(1) as usize;
        let user_id = new_session.user_id.as_str();

        let mut ranked: Vec<SessionRecord> = self
            .store
            .list(user_id)
            .await?
            .into_iter()
            .filter(|session| session.session_id != new_session.session_id)
            .collect();
        ranked.push(new_session.clone());
        if ranked.len() <= allowed {
            return Ok(Vec::new());
        }

        sort_oldest_first(&mut ranked);
        let excess = ranked.len() - allowed;

        let mut evicted = Vec::with_capacity(excess);
        for session in ranked.into_iter().take(excess) {
            if session.session_id == new_session.session_id {
                // A newer login already landed; let it win.
                tracing::debug!(
                    "Session {} for user {} is not the newest, leaving it to the next eviction",
                    session.session_id,
                    user_id
                );
                continue;
            }
            evicted.push(session.session_id);
        }

        try_join_all(
            evicted
                .iter()
                .map(|session_id| self.store.remove(user_id, session_id)),
        )
        .await?;

        if !evicted.is_empty() {
            tracing::info!(
                "Evicted {} session(s) for user {} (limit {})",
                evicted.len(),
                user_id,
                allowed
            );
        }

        Ok(evicted)
    }
}

fn sort_oldest_first(sessions: &mut [SessionRecord]) {
    sessions.sort_by(|a, b| {
        a.login_at
            .cmp(&b.login_at)
            .then_with(|| a.session_id.cmp(&b.session_id))
    });
}
