//! Session bookkeeping for the gateway. One registry per gateway, owned
//! by the transport layer; the engine never sees it.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use ferret_engine::agent::CancelHandle;

pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, CancelHandle>>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        SessionRegistry {
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a running session and hand back its identifier.
    pub fn create(&self, cancel: CancelHandle) -> String {
        let seq = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session_id = format!("session-{seq}");
        self.sessions
            .lock()
            .expect("registry lock poisoned")
            .insert(session_id.clone(), cancel);
        session_id
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions
            .lock()
            .expect("registry lock poisoned")
            .contains_key(session_id)
    }

    /// Ask a session to stop between cycles. Returns false for unknown
    /// ids; the entry stays registered until its loop reports completion.
    pub fn cancel(&self, session_id: &str) -> bool {
        let sessions = self.sessions.lock().expect("registry lock poisoned");
        match sessions.get(session_id) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop a finished session. Returns false if it was never registered
    /// or already removed.
    pub fn destroy(&self, session_id: &str) -> bool {
        self.sessions
            .lock()
            .expect("registry lock poisoned")
            .remove(session_id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
