//! # Sessions
//!
//! A [`Session`] is the explicit caller context handed to every engine
//! operation that acts on behalf of a user. The [`SessionRegistry`] maps
//! opaque bearer tokens to sessions for transports that need one (the HTTP
//! node); the engine itself never looks sessions up.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::ids::new_id;

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque bearer token.
    pub token: String,
    pub account_id: String,
    pub vault_id: String,
    pub issued_at: DateTime<Utc>,
}

impl Session {
    /// Opens a new session for `account`.
    pub fn open(account: &Account, now: DateTime<Utc>) -> Self {
        Self {
            token: new_id(),
            account_id: account.id.clone(),
            vault_id: account.vault_id.clone(),
            issued_at: now,
        }
    }
}

/// Concurrent token → session map.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Session) {
        self.sessions.insert(session.token.clone(), session);
    }

    pub fn get(&self, token: &str) -> Option<Session> {
        self.sessions.get(token).map(|s| s.value().clone())
    }

    /// Ends a session. Returns it if it existed.
    pub fn revoke(&self, token: &str) -> Option<Session> {
        self.sessions.remove(token).map(|(_, s)| s)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
