//! The authoritative map of live sessions.
//!
//! Constructed once per process (or per test) and shared by handle. The
//! reader/writer lock covers map operations only and is never held across
//! I/O.

use super::Session;
use crate::messages::{SessionStatus, SessionSummary};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. Returns `false` without inserting when the id is
    /// already taken by a live session.
    pub async fn create(&self, session: Arc<Session>) -> bool {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return false;
        }
        info!(session_id = %session.id, program = %session.program, "session created");
        sessions.insert(session.id.clone(), session);
        true
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Remove a session, returning whether it was present. Safe to call from
    /// both cleanup paths; the second caller is a no-op.
    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            info!(session_id = %id, "session removed");
        }
        removed
    }

    /// Snapshot of every registered session's summary fields. Stopped
    /// sessions stay listed until their delayed removal fires.
    pub async fn list_active(&self) -> Vec<SessionSummary> {
        self.sessions
            .read()
            .await
            .values()
            .map(|s| s.summary())
            .collect()
    }

    /// Sessions that have not reached `Stopped` yet.
    pub async fn running(&self) -> Vec<Arc<Session>> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.status() == SessionStatus::Running)
            .cloned()
            .collect()
    }

    /// Drop every entry. Used by the forced shutdown path after all
    /// sessions have been terminated.
    pub async fn clear(&self) {
        self.sessions.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
