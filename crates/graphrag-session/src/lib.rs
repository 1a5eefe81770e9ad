//! GraphRAG Session: conversation history for multi-turn questions.
//!
//! A session is an ordered, bounded list of [`Turn`]s keyed by a session id.
//! Writers to the same session are serialized through a [`store::SessionLease`]
//! so turns land in the order requests complete; different sessions never
//! contend with each other.

pub mod context;
pub mod store;

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use graphrag_core::Turn;
use serde::{Deserialize, Serialize};

pub use context::format_history;
pub use store::{InMemorySessionStore, SessionError, SessionLease, SessionStore};

/// Generate a fresh session identifier.
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Session store limits.
///
/// Loaded from the `[session]` section or `GRAPHRAG__SESSION__*` variables.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Oldest turns are evicted beyond this many.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// Sessions older than this are treated as absent.
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: i64,
}

fn default_max_turns() -> usize {
    20
}

fn default_ttl_hours() -> i64 {
    24
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            ttl_hours: default_ttl_hours(),
        }
    }
}

/// Turn history for one session id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    turns: VecDeque<Turn>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            created_at: now,
            last_updated: now,
            turns: VecDeque::new(),
        }
    }

    /// Append a turn, evicting the oldest ones beyond `max_turns`.
    pub fn push(&mut self, turn: Turn, max_turns: usize) {
        self.turns.push_back(turn);
        while self.turns.len() > max_turns {
            self.turns.pop_front();
        }
        self.last_updated = Utc::now();
    }

    /// The last `limit` turns, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<Turn> {
        let skip = self.turns.len().saturating_sub(limit);
        self.turns.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn is_expired(&self, ttl_hours: i64, now: DateTime<Utc>) -> bool {
        now - self.created_at > Duration::hours(ttl_hours)
    }
}
