//! In-process session store.
//!
//! Used when no Redis URL is configured (single-instance deployments) and by
//! the test suite. Expiry is checked on read. A read that hits an expired
//! record prunes that user, and writes sweep every user at most once per
//! sweep interval, so users who never come back do not pile up.

use crate::cache::{SessionRecord, SessionStore};
use crate::errors::ServiceResult;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct StoredSession {
    record: SessionRecord,
    expires_at: Instant,
}

impl StoredSession {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Sessions grouped per user so that listing a user's sessions is one lookup.
#[derive(Debug)]
pub struct MemorySessionStore {
    users: DashMap<String, HashMap<String, StoredSession>>,
    last_sweep: Mutex<Instant>,
    sweep_interval: Duration,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self {
            users: DashMap::new(),
            last_sweep: Mutex::new(Instant::now()),
            sweep_interval: SWEEP_INTERVAL,
        }
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the expired sessions of one user, and the user once empty.
    fn prune_user(&self, user_id: &str, now: Instant) {
        if let Some(mut sessions) = self.users.get_mut(user_id) {
            sessions.retain(|_, stored| stored.is_live(now));
        }
        self.users.remove_if(user_id, |_, sessions| sessions.is_empty());
    }

    /// Drops expired sessions of every user, at most once per sweep interval.
    fn sweep_if_due(&self, now: Instant) {
        // A sweep already running elsewhere covers this call.
        let Ok(mut last_sweep) = self.last_sweep.try_lock() else {
            return;
        };
        if now.saturating_duration_since(*last_sweep) < self.sweep_interval {
            return;
        }
        *last_sweep = now;

        self.users.retain(|_, sessions| {
            sessions.retain(|_, stored| stored.is_live(now));
            !sessions.is_empty()
        });
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, record: &SessionRecord, ttl: Duration) -> ServiceResult<()> {
        let now = Instant::now();
        self.sweep_if_due(now);

        let stored = StoredSession {
            record: record.clone(),
            expires_at: now + ttl,
        };
        self.users
            .entry(record.user_id.clone())
            .or_default()
            .insert(record.session_id.clone(), stored);

        Ok(())
    }

    async fn get(&self, user_id: &str, session_id: &str) -> ServiceResult<Option<SessionRecord>> {
        let now = Instant::now();
        let found = self
            .users
            .get(user_id)
            .and_then(|sessions| sessions.get(session_id).cloned());

        match found {
            Some(stored) if stored.is_live(now) => Ok(Some(stored.record)),
            Some(_) => {
                self.prune_user(user_id, now);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn remove(&self, user_id: &str, session_id: &str) -> ServiceResult<bool> {
        let now = Instant::now();
        let removed = self
            .users
            .get_mut(user_id)
            .and_then(|mut sessions| sessions.remove(session_id))
            .is_some_and(|stored| stored.is_live(now));
        self.users.remove_if(user_id, |_, sessions| sessions.is_empty());

        Ok(removed)
    }

    async fn list(&self, user_id: &str) -> ServiceResult<Vec<SessionRecord>> {
        self.prune_user(user_id, Instant::now());

        let records = self
            .users
            .get(user_id)
            .map(|sessions| sessions.values().map(|stored| stored.record.clone()).collect())
            .unwrap_or_default();

        Ok(records)
    }

    async fn remove_all(&self, user_id: &str) -> ServiceResult<usize> {
        let now = Instant::now();
        let removed = self
            .users
            .remove(user_id)
            .map(|(_, sessions)| sessions.values().filter(|s| s.is_live(now)).count())
            .unwrap_or(0);

        Ok(removed)
    }

    fn store_name(&self) -> &'static str {
        "memory"
    }
}
