//! Server-side session table.
//!
//! Each logged-in browser owns one [`Session`]: the identity it
//! authenticated as and its own copy of the feedback mapping. The cookie
//! only carries the session id; everything else lives here, behind a
//! per-session mutex so one interaction finishes before the next starts.

use std::collections::HashMap;
use std::sync::Arc;

use panel_core::FeedbackMapping;
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

#[derive(Debug)]
pub struct Session {
    pub username: String,
    pub is_admin: bool,
    pub feedback: FeedbackMapping,
}

pub type SessionHandle = Arc<Mutex<Session>>;

#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session and return its new id.
    pub async fn create(&self, session: Session) -> String {
        let session_id = Uuid::new_v4().to_string();
        info!("Created session for '{}'", session.username);
        self.insert(session_id.clone(), session).await;
        session_id
    }

    /// Register a session under a known id (used to restore sessions whose
    /// cookie outlived a restart).
    pub async fn insert(&self, session_id: String, session: Session) -> SessionHandle {
        let handle = Arc::new(Mutex::new(session));
        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id, handle.clone());
        handle
    }

    pub async fn get(&self, session_id: &str) -> Option<SessionHandle> {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).cloned()
    }

    pub async fn remove(&self, session_id: &str) -> Option<SessionHandle> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
