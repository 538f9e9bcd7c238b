//! Per-user conversational session state.
//!
//! Sessions gate short guided flows only; they are process-lifetime and
//! deliberately not persisted. The backing store sits behind a trait so
//! tests can inject a fake and a persistent store could be swapped in
//! without touching the router.

use std::collections::HashMap;

/// Which guided flow the user is currently inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Plain conversation, no command expectation.
    Chat,
    /// Manual IoT control flow.
    IotManual,
}

/// Pending input expectation within a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    /// Waiting for a `<device> <on|off>` command.
    IotManual,
}

/// Conversational state for one user. Absence of an entry means idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionState {
    pub mode: SessionMode,
    pub expecting: Option<Expectation>,
}

impl SessionState {
    /// State entered when the user picks plain chat.
    #[must_use]
    pub fn chat() -> Self {
        Self {
            mode: SessionMode::Chat,
            expecting: None,
        }
    }

    /// State entered when the user picks manual IoT control.
    #[must_use]
    pub fn iot_manual() -> Self {
        Self {
            mode: SessionMode::IotManual,
            expecting: Some(Expectation::IotManual),
        }
    }
}

/// Session storage keyed by user identifier. Last write wins; the bridge
/// mutates sessions only from its single cooperative task.
pub trait SessionStore: Send {
    fn get(&self, user_id: &str) -> Option<SessionState>;
    fn set(&mut self, user_id: &str, state: SessionState);
    fn delete(&mut self, user_id: &str);
}

/// Default in-memory store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: HashMap<String, SessionState>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, user_id: &str) -> Option<SessionState> {
        self.sessions.get(user_id).copied()
    }

    fn set(&mut self, user_id: &str, state: SessionState) {
        self.sessions.insert(user_id.to_owned(), state);
    }

    fn delete(&mut self, user_id: &str) {
        self.sessions.remove(user_id);
    }
}
