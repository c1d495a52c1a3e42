//! Sessions owned by a client or a connection factory.
//!
//! Registration is bookkeeping for shutdown ordering only; it has no effect on
//! flow control.

use std::sync::Arc;

use parking_lot::Mutex;
use sluicestream::Session;

/// The open sessions of one owner.
#[derive(Default)]
pub struct ManagedSessions {
    sessions: Mutex<Vec<Arc<Session>>>,
}

impl ManagedSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// On-connect hook: start tracking `session`.
    pub fn register(&self, session: Arc<Session>) {
        let mut sessions = self.sessions.lock();
        if !sessions.iter().any(|s| Arc::ptr_eq(s, &session)) {
            sessions.push(session);
            tracing::debug!(count = sessions.len(), "session registered");
        }
    }

    /// On-disconnect hook: stop tracking `session`. Returns whether it was
    /// tracked.
    pub fn deregister(&self, session: &Arc<Session>) -> bool {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|s| !Arc::ptr_eq(s, session));
        let removed = sessions.len() != before;
        if removed {
            tracing::debug!(count = sessions.len(), "session deregistered");
        }
        removed
    }

    pub fn contains(&self, session: &Arc<Session>) -> bool {
        self.sessions.lock().iter().any(|s| Arc::ptr_eq(s, session))
    }

    /// Snapshot of the tracked sessions, in registration order.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
