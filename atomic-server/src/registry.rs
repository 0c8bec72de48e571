//! Live session registry
//!
//! Tracks every connected session so the server can list users and close
//! them all on shutdown. Sessions are added by the connection handler and
//! removed when their reader stops.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::session::Session;

/// Thread-safe for concurrent access from connection tasks
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<Uuid, Arc<Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session: Arc<Session>) {
        let id = session.id();
        self.sessions.insert(id, session);
        debug!(session_id = %id, total = self.sessions.len(), "Session registered");
    }

    pub fn unregister(&self, id: Uuid) -> Option<Arc<Session>> {
        let removed = self.sessions.remove(&id).map(|(_, session)| session);
        if removed.is_some() {
            debug!(session_id = %id, total = self.sessions.len(), "Session unregistered");
        }
        removed
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Nicknames of everyone online, sorted
    pub fn nicknames(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .sessions
            .iter()
            .map(|entry| entry.value().identity().nickname.clone())
            .collect();
        names.sort();
        names
    }

    /// Say goodbye to every session
    pub fn shutdown_all(&self) {
        let sessions: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        if !sessions.is_empty() {
            info!(count = sessions.len(), "Closing all sessions");
        }
        for session in sessions {
            session.shutdown();
        }
    }
}
