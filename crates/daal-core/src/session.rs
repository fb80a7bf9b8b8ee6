//! Authentication session state shared by every adapter.
//!
//! ```text
//!  ┌─────────────────┐   SignedIn    ┌─────────────────┐
//!  │ Unauthenticated │ ────────────► │  Authenticated  │ ◄─┐ SignedIn
//!  └─────────────────┘ ◄──────────── └─────────────────┘ ──┘ (re-login)
//!                       SignedOut /
//!                       AuthRejected
//! ```
//!
//! Each adapter owns one [`SessionTracker`]; trackers never share state.

use crate::{DaalError, DaalResult};
use chrono::{DateTime, Utc};
use daal_storage::SessionStore;
use parking_lot::Mutex;
use rust_fsm::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Unauthenticated)

    Unauthenticated => {
        SignedIn => Authenticated
    },
    Authenticated => {
        SignedIn => Authenticated,
        SignedOut => Unauthenticated,
        AuthRejected => Unauthenticated
    }
}

pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Externally visible session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
}

impl From<&SessionMachineState> for SessionState {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::Unauthenticated => SessionState::Unauthenticated,
            SessionMachineState::Authenticated => SessionState::Authenticated,
        }
    }
}

/// Token plus the principal it authenticates.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    /// Backend-specific user record.
    pub principal: Value,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(token: impl Into<String>, principal: Value) -> Self {
        Self {
            token: token.into(),
            principal,
            created_at: Utc::now(),
        }
    }

    pub fn user_id(&self) -> Option<String> {
        match self.principal.get("id")? {
            Value::String(id) => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }

    pub fn email(&self) -> Option<&str> {
        self.principal.get("email").and_then(Value::as_str)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"[redacted]")
            .field("user_id", &self.user_id())
            .field("created_at", &self.created_at)
            .finish()
    }
}

struct TrackerInner {
    fsm: SessionMachine,
    session: Option<Session>,
}

/// Current-session holder for one adapter, optionally persisted.
pub struct SessionTracker {
    inner: Mutex<TrackerInner>,
    store: Option<SessionStore>,
}

impl SessionTracker {
    /// Process-local tracker.
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(TrackerInner {
                fsm: SessionMachine::new(),
                session: None,
            }),
            store: None,
        }
    }

    /// Tracker mirrored to `store`; the stored session is picked up lazily.
    pub fn persisted(store: SessionStore) -> Self {
        Self {
            store: Some(store),
            ..Self::in_memory()
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from(self.inner.lock().fsm.state())
    }

    fn transition(inner: &mut TrackerInner, input: SessionMachineInput) -> DaalResult<SessionState> {
        let old_state = SessionState::from(inner.fsm.state());
        inner.fsm.consume(&input).map_err(|_| {
            DaalError::Auth(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                inner.fsm.state()
            ))
        })?;
        let new_state = SessionState::from(inner.fsm.state());
        if old_state != new_state {
            debug!(old_state = ?old_state, new_state = ?new_state, "Session state transition");
        }
        Ok(new_state)
    }

    /// Record a successful sign-in or sign-up, replacing any previous session.
    pub fn establish(&self, session: Session) -> DaalResult<()> {
        let mut inner = self.inner.lock();
        if let Some(store) = &self.store {
            store.save(&session)?;
        }
        Self::transition(&mut inner, SessionMachineInput::SignedIn)?;
        inner.session = Some(session);
        Ok(())
    }

    /// Drop the session after the backend rejected `rejected`, the token the
    /// failed request carried. A session established since then is kept.
    pub fn invalidate(&self, rejected: Option<&str>, reason: &str) {
        let mut inner = self.inner.lock();
        let held = inner.session.as_ref().map(|s| s.token.as_str());
        if held != rejected {
            debug!(reason = reason, "Ignoring rejection of a superseded session");
            return;
        }
        let _ = Self::transition(&mut inner, SessionMachineInput::AuthRejected);
        inner.session = None;
        if let Some(store) = &self.store {
            if let Err(e) = store.clear() {
                warn!(error = %e, "Failed to clear stored session");
            }
        }
        debug!(reason = reason, "Session invalidated");
    }

    /// Explicit sign-out. Returns true if a session was active.
    pub fn sign_out(&self) -> DaalResult<bool> {
        let had_session = {
            let mut inner = self.inner.lock();
            let _ = Self::transition(&mut inner, SessionMachineInput::SignedOut);
            inner.session.take().is_some()
        };
        let had_stored = match &self.store {
            Some(store) => store.clear()?,
            None => false,
        };
        Ok(had_session || had_stored)
    }

    /// Load the persisted session if none is held yet. Idempotent.
    pub fn reload_from_store(&self) -> DaalResult<bool> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        let mut inner = self.inner.lock();
        if inner.session.is_some() {
            return Ok(true);
        }
        match store.load::<Session>()? {
            Some(session) => {
                Self::transition(&mut inner, SessionMachineInput::SignedIn)?;
                debug!(user_id = ?session.user_id(), "Restored stored session");
                inner.session = Some(session);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Current session, lazily restored from the store.
    pub fn current(&self) -> Option<Session> {
        if let Err(e) = self.reload_from_store() {
            warn!(error = %e, "Failed to restore stored session");
        }
        self.inner.lock().session.clone()
    }

    pub fn token(&self) -> Option<String> {
        self.current().map(|s| s.token)
    }

    pub fn is_authenticated(&self) -> bool {
        self.current().is_some()
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl std::fmt::Debug for SessionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTracker")
            .field("state", &self.state())
            .field("store", &self.store)
            .finish()
    }
}
