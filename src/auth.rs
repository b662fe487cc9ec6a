//! Password hashing and cookie sessions.
//!
//! Sessions live in memory and are keyed by a random token stored in the
//! `token` cookie. Each session carries its own CSRF token which every form
//! POST must echo back in `_csrf`.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;
use sha2::{Digest, Sha256};

/// Cookie holding the session token
pub const SESSION_COOKIE: &str = "token";

/// Hash a password with a per-user salt
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn verify_password(password: &str, salt: &str, expected_hash: &str) -> bool {
    !expected_hash.is_empty() && hash_password(password, salt) == expected_hash
}

/// Fresh random salt for a new password
pub fn generate_salt() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// A signed-in browser session
#[derive(Clone, Debug)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    pub csrf_token: String,
    pub expires_at: SystemTime,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        SystemTime::now() > self.expires_at
    }
}

/// In-memory session store
pub struct AuthManager {
    sessions: RwLock<HashMap<String, Session>>,
    session_duration: Duration,
}

impl AuthManager {
    pub fn new(session_duration: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            session_duration,
        }
    }

    /// Start a session for a user who has already been authenticated
    pub fn create_session(&self, user_id: i64) -> Session {
        let session = Session {
            token: uuid::Uuid::new_v4().to_string(),
            user_id,
            csrf_token: uuid::Uuid::new_v4().simple().to_string(),
            expires_at: SystemTime::now() + self.session_duration,
        };
        self.sessions
            .write()
            .insert(session.token.clone(), session.clone());
        tracing::debug!("Created session for user {}", user_id);
        session
    }

    /// Look up a live session; expired sessions are dropped on access
    pub fn get_session(&self, token: &str) -> Option<Session> {
        let session = self.sessions.read().get(token).cloned()?;
        if session.is_expired() {
            self.sessions.write().remove(token);
            return None;
        }
        Some(session)
    }

    pub fn remove_session(&self, token: &str) {
        self.sessions.write().remove(token);
    }

    /// Drop every expired session
    pub fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired());
        before - sessions.len()
    }
}
