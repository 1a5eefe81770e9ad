//! Session storage: trait and in-memory implementation.
//!
//! Each session sits behind its own async mutex. The outer map lock is only
//! held long enough to find or create the entry, so sessions are fully
//! independent of one another.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use graphrag_core::Turn;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{Session, SessionConfig};

/// Errors that can occur during session storage operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session store unavailable: {0}")]
    Unavailable(String),
}

/// Trait for session persistence backends.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Append a turn to a session, creating the session on first use.
    async fn append(&self, session_id: &str, turn: Turn) -> Result<(), SessionError>;

    /// The last `limit` turns of a session, oldest first.
    async fn history(&self, session_id: &str, limit: usize) -> Result<Vec<Turn>, SessionError>;
}

/// Process-local session store with a lock per session id.
pub struct InMemorySessionStore {
    config: SessionConfig,
    sessions: Mutex<HashMap<String, Arc<Mutex<Session>>>>,
}

impl InMemorySessionStore {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Take exclusive access to a session for a read-append-write cycle.
    ///
    /// Concurrent leases on the same id queue in FIFO order; the session is
    /// created on first use and reset if it has expired.
    pub async fn lease(&self, session_id: &str) -> SessionLease {
        let slot = {
            let mut sessions = self.sessions.lock().await;
            sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Session::new(session_id))))
                .clone()
        };

        let mut guard = slot.lock_owned().await;
        if guard.is_expired(self.config.ttl_hours, Utc::now()) {
            tracing::debug!(session_id = %session_id, "Session expired, starting fresh");
            *guard = Session::new(session_id);
        }

        SessionLease {
            guard,
            max_turns: self.config.max_turns,
        }
    }

    /// Remove every expired session that is not currently leased.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let ttl = self.config.ttl_hours;
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, slot| match slot.try_lock() {
            Ok(session) => !session.is_expired(ttl, now),
            Err(_) => true,
        });
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::info!(removed, "Purged expired sessions");
        }
        removed
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn append(&self, session_id: &str, turn: Turn) -> Result<(), SessionError> {
        let mut lease = self.lease(session_id).await;
        lease.append(turn);
        Ok(())
    }

    async fn history(&self, session_id: &str, limit: usize) -> Result<Vec<Turn>, SessionError> {
        let lease = self.lease(session_id).await;
        Ok(lease.history(limit))
    }
}

/// Exclusive handle on one session. Other writers wait until it is dropped.
pub struct SessionLease {
    guard: OwnedMutexGuard<Session>,
    max_turns: usize,
}

impl SessionLease {
    pub fn session_id(&self) -> &str {
        &self.guard.id
    }

    pub fn history(&self, limit: usize) -> Vec<Turn> {
        self.guard.recent(limit)
    }

    pub fn append(&mut self, turn: Turn) {
        self.guard.push(turn, self.max_turns);
    }

    pub fn len(&self) -> usize {
        self.guard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard.is_empty()
    }
}
