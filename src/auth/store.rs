//! Collaborators the auth interceptor reads from and reports to.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

/// Read-only view of a session-scoped key/value store.
///
/// The interceptor looks up a single JSON entry (by default under `"auth"`)
/// before every outgoing request. Implementations should return the current
/// value each time; nothing is cached on the client side.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// In-process session store.
///
/// Clones share the same entries, so the login flow can update the
/// credential while clients hold their own handle to the store.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.write().insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.entries.write().remove(key)
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }
}

/// Navigation hook owned by the application layer.
///
/// The interceptor never routes by itself; it asks this collaborator where
/// the user currently is and requests the session-expired page through it.
pub trait Navigator: Send + Sync {
    fn current_location(&self) -> String;

    fn navigate_to_session_expired(&self, path: &str);
}

/// Navigator that only records what it was asked to do.
#[derive(Debug, Clone, Default)]
pub struct RecordingNavigator {
    location: Arc<Mutex<String>>,
    redirects: Arc<Mutex<Vec<String>>>,
}

impl RecordingNavigator {
    pub fn at(location: impl Into<String>) -> Self {
        Self {
            location: Arc::new(Mutex::new(location.into())),
            redirects: Arc::default(),
        }
    }

    pub fn set_location(&self, location: impl Into<String>) {
        *self.location.lock() = location.into();
    }

    /// Paths navigated to, oldest first.
    pub fn redirects(&self) -> Vec<String> {
        self.redirects.lock().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn current_location(&self) -> String {
        self.location.lock().clone()
    }

    fn navigate_to_session_expired(&self, path: &str) {
        self.redirects.lock().push(path.to_string());
        *self.location.lock() = path.to_string();
    }
}
