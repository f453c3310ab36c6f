//! Session storage abstraction.
//!
//! Records are stored as JSON strings under fixed keys. Any medium with
//! get/set/remove semantics (browser local storage, server session, cookie
//! jar) can back a session by implementing `SessionStore`.

use std::collections::HashMap;

use crate::SessionError;

/// Key of the captured `AttributionData`.
pub const ATTRIBUTION_KEY: &str = "m5max-attribution";

/// Key of the latest `TriageData`.
pub const TRIAGE_KEY: &str = "m5max-triage";

/// Key of the visitor's `ConsentPreferences`.
pub const CONSENT_KEY: &str = "m5max-consent";

pub const ALL_KEYS: [&str; 3] = [ATTRIBUTION_KEY, TRIAGE_KEY, CONSENT_KEY];

/// Trait for session storage backends.
pub trait SessionStore {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&mut self, key: &str, value: String) -> Result<(), SessionError>;

    fn remove(&mut self, key: &str);
}

/// In-memory store, one per session.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), SessionError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }
}
