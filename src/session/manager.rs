use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use super::handle::CopilotSession;

type SessionMap = HashMap<String, CopilotSession>;

/// Live sessions on one client, keyed by session id
#[derive(Clone, Default)]
pub(crate) struct SessionManager {
    sessions: Arc<Mutex<SessionMap>>,
}

/// Non-owning handle so sessions can deregister themselves
#[derive(Clone, Default)]
pub(crate) struct WeakSessionManager {
    sessions: Weak<Mutex<SessionMap>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn downgrade(&self) -> WeakSessionManager {
        WeakSessionManager {
            sessions: Arc::downgrade(&self.sessions),
        }
    }

    /// Register a session, replacing any stale entry with the same id
    pub fn add_session(&self, session: CopilotSession) -> Option<CopilotSession> {
        self.sessions
            .lock()
            .ok()?
            .insert(session.id().to_string(), session)
    }

    pub fn get_by_id(&self, id: &str) -> Option<CopilotSession> {
        self.sessions.lock().ok()?.get(id).cloned()
    }

    /// Remove and return every session
    pub fn drain(&self) -> Vec<CopilotSession> {
        match self.sessions.lock() {
            Ok(mut sessions) => sessions.drain().map(|(_, s)| s).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.sessions
            .lock()
            .map(|sessions| sessions.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl WeakSessionManager {
    /// Deregister `session` unless its id now belongs to a newer handle
    pub fn remove(&self, session: &CopilotSession) {
        if let Some(sessions) = self.sessions.upgrade() {
            if let Ok(mut sessions) = sessions.lock() {
                if sessions.get(session.id()).is_some_and(|live| live.ptr_eq(session)) {
                    sessions.remove(session.id());
                }
            }
        }
    }
}
