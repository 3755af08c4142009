//! Registry of running realtime sessions.
//!
//! Keyed by session token so the same installation is never connected twice.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub team_id: Option<String>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionInfo>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a session. Returns `false` if the token is already running.
    pub fn try_register(&self, token: &str) -> bool {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if sessions.contains_key(token) {
            return false;
        }
        sessions.insert(
            token.to_string(),
            SessionInfo {
                team_id: None,
                started_at: Utc::now(),
            },
        );
        true
    }

    /// Attach the team once the session has authenticated.
    pub fn set_team(&self, token: &str, team_id: Option<String>) {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(info) = sessions.get_mut(token) {
            info.team_id = team_id;
        }
    }

    /// Forget a session after it disconnected for good.
    pub fn remove(&self, token: &str) -> Option<SessionInfo> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
