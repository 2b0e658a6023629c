//! Live sessions keyed by id.

use crate::backends::Backends;
use crate::session::config::SessionConfig;
use crate::session::state::SessionState;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Cloneable reference to one registered session.
///
/// The mutex is held by the connection task for the whole connection; the
/// token is cancelled when the session is deleted out from under it.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    pub state: Arc<Mutex<SessionState>>,
    pub cancel: CancellationToken,
}

/// Row of `GET /sessions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts_engine: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turns: Option<usize>,
}

pub struct SessionRegistry {
    sessions: DashMap<Uuid, SessionHandle>,
    backends: Arc<Backends>,
    defaults: SessionConfig,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .field("backends", &self.backends)
            .finish()
    }
}

impl SessionRegistry {
    pub fn new(backends: Arc<Backends>, defaults: SessionConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            backends,
            defaults,
        }
    }

    pub fn defaults(&self) -> &SessionConfig {
        &self.defaults
    }

    pub fn backends(&self) -> &Arc<Backends> {
        &self.backends
    }

    fn build(&self, id: Uuid, config: SessionConfig) -> SessionHandle {
        SessionHandle {
            id,
            state: Arc::new(Mutex::new(SessionState::new(
                id,
                config,
                Arc::clone(&self.backends),
            ))),
            cancel: CancellationToken::new(),
        }
    }

    /// Register a new session with `config` and return its id.
    pub fn create(&self, config: SessionConfig) -> Uuid {
        let id = Uuid::new_v4();
        self.sessions.insert(id, self.build(id, config));
        tracing::info!(session = %id, "Session created");
        id
    }

    /// Look up `id`, registering it with default settings if unknown.
    ///
    /// Returns the handle and whether it was just created.
    pub fn get_or_create(&self, id: Uuid) -> (SessionHandle, bool) {
        let mut created = false;
        let handle = self
            .sessions
            .entry(id)
            .or_insert_with(|| {
                created = true;
                self.build(id, self.defaults.clone())
            })
            .clone();
        if created {
            tracing::info!(session = %id, "Session auto-created on connect");
        }
        (handle, created)
    }

    pub fn get(&self, id: Uuid) -> Option<SessionHandle> {
        self.sessions.get(&id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Remove a session and cancel any live connection on it.
    pub fn remove(&self, id: Uuid) -> bool {
        match self.sessions.remove(&id) {
            Some((_, handle)) => {
                handle.cancel.cancel();
                tracing::info!(session = %id, "Session removed");
                true
            }
            None => false,
        }
    }

    /// Remove `handle`'s session only if it is still the registered one.
    pub fn remove_handle(&self, handle: &SessionHandle) -> bool {
        self.sessions
            .remove_if(&handle.id, |_, current| {
                Arc::ptr_eq(&current.state, &handle.state)
            })
            .is_some()
    }

    /// Snapshot of every session. Sessions held by a live connection report
    /// `connected` without details.
    pub fn list(&self) -> Vec<SessionSummary> {
        let mut rows: Vec<SessionSummary> = self
            .sessions
            .iter()
            .map(|entry| match entry.state.try_lock() {
                Ok(state) => SessionSummary {
                    session_id: entry.id.to_string(),
                    connected: false,
                    voice_id: Some(state.config().voice_id.clone()),
                    user_id: Some(state.config().user_id.clone()),
                    tts_engine: Some(state.config().tts_engine.to_string()),
                    turns: Some(state.history().len() - 1),
                },
                Err(_) => SessionSummary {
                    session_id: entry.id.to_string(),
                    connected: true,
                    voice_id: None,
                    user_id: None,
                    tts_engine: None,
                    turns: None,
                },
            })
            .collect();
        rows.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        rows
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Cancel and drop every session.
    pub fn shutdown(&self) {
        for entry in self.sessions.iter() {
            entry.cancel.cancel();
        }
        self.sessions.clear();
    }
}
