use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::storage::KeyValueStore;
use crate::constants::{ACTIVE_SESSION_STORAGE_KEY, SESSIONS_STORAGE_KEY};
use crate::models::{Message, Sender, Session, Settings, SettingsPatch};
use crate::utils::{ChatError, ChatResult};

/// Every session plus which one is active
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    /// Newest first
    pub sessions: Vec<Session>,
    pub active_session_id: Option<String>,
}

impl StoreState {
    pub fn session(&self, id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn active(&self) -> Option<&Session> {
        self.active_session_id.as_deref().and_then(|id| self.session(id))
    }

    fn session_mut(&mut self, id: &str) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    /// Drop the active session if it has no messages yet
    fn prune_active_if_empty(&mut self) {
        if let Some(active) = self.active_session_id.clone() {
            let before = self.sessions.len();
            self.sessions.retain(|s| s.id != active || !s.is_empty());
            if self.sessions.len() != before {
                debug!("Pruned empty session {}", active);
            }
        }
    }

    fn insert_fresh(&mut self, settings: Settings) -> String {
        let session = Session::new(settings);
        let id = session.id.clone();
        self.sessions.insert(0, session);
        self.active_session_id = Some(id.clone());
        id
    }
}

/// Versioned, immutable view of the store
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Bumped on every successful mutation
    pub version: u64,
    pub state: Arc<StoreState>,
}

/// Ordered collection of chat sessions
///
/// Each mutation builds a new [`StoreState`] and swaps it in whole, so
/// readers see either the previous or the next state. Observers get the new
/// snapshot through [`SessionStore::subscribe`]. After every mutation the
/// state is written to the backing [`KeyValueStore`]; write failures are
/// logged and otherwise ignored.
pub struct SessionStore {
    tx: watch::Sender<Snapshot>,
    storage: Arc<dyn KeyValueStore>,
    defaults: Settings,
    /// Version of the last state written out
    persisted: Mutex<u64>,
}

impl SessionStore {
    /// Restore prior state from `storage`, or start with one fresh session
    pub fn load(storage: Arc<dyn KeyValueStore>, defaults: Settings) -> Self {
        let state = match restore(storage.as_ref()) {
            Ok(Some(state)) => {
                debug!("Restored {} sessions", state.sessions.len());
                state
            }
            Ok(None) => fresh_state(&defaults),
            Err(e) => {
                warn!("Failed to load sessions, starting fresh: {}", e);
                fresh_state(&defaults)
            }
        };

        let snapshot = Snapshot {
            version: 1,
            state: Arc::new(state),
        };
        let store = Self {
            tx: watch::channel(snapshot.clone()).0,
            storage,
            defaults,
            persisted: Mutex::new(0),
        };
        store.persist(&snapshot);
        store
    }

    /// Read previously saved state without creating or writing anything
    pub fn read_saved(storage: &dyn KeyValueStore) -> ChatResult<Option<StoreState>> {
        restore(storage)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.tx.borrow().clone()
    }

    pub fn state(&self) -> Arc<StoreState> {
        Arc::clone(&self.tx.borrow().state)
    }

    /// Receive every replaced snapshot
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    pub fn active_session_id(&self) -> Option<String> {
        self.tx.borrow().state.active_session_id.clone()
    }

    pub fn active_session(&self) -> Option<Session> {
        self.tx.borrow().state.active().cloned()
    }

    /// Settings new sessions start with
    pub fn defaults(&self) -> &Settings {
        &self.defaults
    }

    /// Replace the active session with a fresh one at the front.
    /// The departing session is pruned if it is empty.
    pub fn new_session(&self) -> String {
        let defaults = self.defaults.clone();
        self.update(|state| {
            state.prune_active_if_empty();
            Some(state.insert_fresh(defaults))
        })
        .unwrap_or_default()
    }

    /// Make `id` active, pruning the departing session if it is empty.
    /// Unknown ids are ignored. Returns whether the active session changed.
    pub fn switch_to(&self, id: &str) -> bool {
        self.update(|state| {
            if state.session(id).is_none() {
                debug!("Ignoring switch to unknown session {}", id);
                return None;
            }
            if state.active_session_id.as_deref() == Some(id) {
                return None;
            }
            state.prune_active_if_empty();
            state.active_session_id = Some(id.to_string());
            Some(())
        })
        .is_some()
    }

    /// Remove a session. Deleting the active one activates the first
    /// remaining session, or a fresh one when none remain.
    pub fn delete(&self, id: &str) -> bool {
        let defaults = self.defaults.clone();
        self.update(|state| {
            let position = state.sessions.iter().position(|s| s.id == id)?;
            state.sessions.remove(position);

            if state.active_session_id.as_deref() == Some(id) {
                match state.sessions.first() {
                    Some(first) => state.active_session_id = Some(first.id.clone()),
                    None => {
                        state.insert_fresh(defaults);
                    }
                }
            }
            Some(())
        })
        .is_some()
    }

    /// Empty a session's history, keeping the session
    pub fn clear(&self, id: &str) -> bool {
        self.update(|state| {
            state.session_mut(id)?.messages.clear();
            Some(())
        })
        .is_some()
    }

    /// Merge `patch` into the session's settings, unvalidated
    pub fn update_settings(&self, id: &str, patch: &SettingsPatch) -> bool {
        self.update(|state| {
            state.session_mut(id)?.settings.apply(patch);
            Some(())
        })
        .is_some()
    }

    /// Append messages to a session's history
    pub fn push_messages(&self, session_id: &str, messages: Vec<Message>) -> bool {
        self.update(|state| {
            state.session_mut(session_id)?.messages.extend(messages);
            Some(())
        })
        .is_some()
    }

    /// Fold a streamed chunk into a message. The first chunk of a session's
    /// first reply also sets its title from the first user message.
    ///
    /// Returns false when the session or message no longer exists.
    pub fn append_chunk(&self, session_id: &str, message_id: &str, chunk: &str) -> bool {
        self.update(|state| {
            let session = state.session_mut(session_id)?;
            session.message_mut(message_id)?.text.push_str(chunk);
            session.derive_title();
            Some(())
        })
        .is_some()
    }

    /// Replace a message's text and flag it as failed
    pub fn fail_message(&self, session_id: &str, message_id: &str, text: &str) -> bool {
        self.update(|state| {
            let message = state.session_mut(session_id)?.message_mut(message_id)?;
            message.text = text.to_string();
            message.error = true;
            Some(())
        })
        .is_some()
    }

    /// Drop the last user turn and everything after it (its reply and any
    /// error-flagged messages), returning that turn's text for replay
    pub fn take_last_turn(&self, session_id: &str) -> Option<String> {
        self.update(|state| {
            let session = state.session_mut(session_id)?;
            let index = session
                .messages
                .iter()
                .rposition(|m| m.sender == Sender::User)?;
            let turn = session.messages.drain(index..).next()?;
            Some(turn.text)
        })
    }

    /// Apply `change` to a copy of the state; `None` means nothing changed
    fn update<R>(&self, change: impl FnOnce(&mut StoreState) -> Option<R>) -> Option<R> {
        let mut outcome = None;
        let mut replaced = None;

        self.tx.send_if_modified(|snapshot| {
            let mut next = StoreState::clone(&snapshot.state);
            match change(&mut next) {
                Some(result) => {
                    outcome = Some(result);
                    snapshot.version += 1;
                    snapshot.state = Arc::new(next);
                    replaced = Some(snapshot.clone());
                    true
                }
                None => false,
            }
        });

        if let Some(snapshot) = replaced {
            self.persist(&snapshot);
        }
        outcome
    }

    fn persist(&self, snapshot: &Snapshot) {
        let mut persisted = self.persisted.lock();
        if *persisted >= snapshot.version {
            return;
        }
        match write_state(self.storage.as_ref(), &snapshot.state) {
            Ok(()) => *persisted = snapshot.version,
            Err(e) => warn!("Failed to save sessions: {}", e),
        }
    }
}

fn fresh_state(defaults: &Settings) -> StoreState {
    let mut state = StoreState::default();
    state.insert_fresh(defaults.clone());
    state
}

fn restore(storage: &dyn KeyValueStore) -> ChatResult<Option<StoreState>> {
    let Some(raw) = storage.get(SESSIONS_STORAGE_KEY)? else {
        return Ok(None);
    };
    let sessions: Vec<Session> = serde_json::from_str(&raw)
        .map_err(|e| ChatError::Persistence(format!("Stored sessions are unreadable: {}", e)))?;
    let Some(first) = sessions.first() else {
        return Ok(None);
    };

    let stored_active = storage.get(ACTIVE_SESSION_STORAGE_KEY)?;
    let active = match stored_active {
        Some(id) if sessions.iter().any(|s| s.id == id) => id,
        _ => first.id.clone(),
    };
    Ok(Some(StoreState {
        active_session_id: Some(active),
        sessions,
    }))
}

fn write_state(storage: &dyn KeyValueStore, state: &StoreState) -> ChatResult<()> {
    let sessions = serde_json::to_string(&state.sessions)
        .map_err(|e| ChatError::Persistence(e.to_string()))?;
    storage.set(SESSIONS_STORAGE_KEY, &sessions)?;
    if let Some(active) = &state.active_session_id {
        storage.set(ACTIVE_SESSION_STORAGE_KEY, active)?;
    }
    Ok(())
}
