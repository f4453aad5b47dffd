//! Session state tracking with FSM-validated transitions.
//!
//! [`SessionTracker`] is the single owner of the current [`SessionState`].
//! The coordinator, client, and facade all drive it through [`Transition`]s;
//! each change is published on a broadcast channel.

use crate::auth_fsm::{accepts, SessionMachine, SessionState, Transition};
use crate::events::{self, SessionEvent};
use crate::{SessionError, SessionResult};
use credential_store::SessionUser;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

struct Inner {
    machine: SessionMachine,
    state: SessionState,
    /// User of the current session, kept while `Refreshing` has no payload.
    user: Option<SessionUser>,
}

pub struct SessionTracker {
    inner: Mutex<Inner>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTracker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                machine: SessionMachine::new(),
                state: SessionState::Anonymous,
                user: None,
            }),
            events: events::channel(),
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.inner.lock().state.clone()
    }

    /// Whether `transition` would be accepted right now.
    pub fn can_apply(&self, transition: &Transition) -> bool {
        accepts(self.inner.lock().machine.state(), &transition.input())
    }

    /// Listen for state changes and session notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Publish a notification. Having no listeners is not an error.
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// Apply a transition and publish the new state if it changed.
    pub fn apply(&self, transition: Transition) -> SessionResult<SessionState> {
        self.apply_after(transition, || Ok(()))
    }

    /// Run `effect` and apply `transition` with no other transition in
    /// between. `effect` runs only when the transition is legal; if it fails
    /// the state is left alone.
    pub fn apply_after<F>(&self, transition: Transition, effect: F) -> SessionResult<SessionState>
    where
        F: FnOnce() -> SessionResult<()>,
    {
        let mut inner = self.inner.lock();
        if !accepts(inner.machine.state(), &transition.input()) {
            return Err(illegal(&inner, &transition));
        }
        effect()?;
        let (old_state, new_state) = advance(&mut inner, transition)?;
        drop(inner);

        self.publish(&old_state, &new_state);
        Ok(new_state)
    }

    /// Run `effect`, then apply `transition` if it fits the current state,
    /// both under the same lock. `effect` runs either way.
    pub fn apply_if_valid_after<T, F>(&self, transition: Transition, effect: F) -> T
    where
        F: FnOnce() -> T,
    {
        let mut inner = self.inner.lock();
        let result = effect();
        match advance(&mut inner, transition) {
            Ok((old_state, new_state)) => {
                drop(inner);
                self.publish(&old_state, &new_state);
            }
            Err(e) => debug!(error = %e, "Ignoring session transition"),
        }
        result
    }

    fn publish(&self, old_state: &SessionState, new_state: &SessionState) {
        if old_state != new_state {
            debug!(
                old_state = old_state.name(),
                new_state = new_state.name(),
                "Session state transition"
            );
            self.emit(SessionEvent::StateChanged(new_state.clone()));
        }
    }

    /// Apply a transition that may not fit the current state. Illegal
    /// transitions are logged and leave the state unchanged.
    pub fn apply_if_valid(&self, transition: Transition) -> SessionState {
        match self.apply(transition) {
            Ok(state) => state,
            Err(e) => {
                debug!(error = %e, "Ignoring session transition");
                self.state()
            }
        }
    }
}

fn illegal(inner: &Inner, transition: &Transition) -> SessionError {
    SessionError::InvalidStateTransition(format!(
        "Cannot apply {:?} in state {:?}",
        transition.input(),
        inner.machine.state()
    ))
}

/// Consume the input and compute the payload state. Returns (old, new).
fn advance(inner: &mut Inner, transition: Transition) -> SessionResult<(SessionState, SessionState)> {
    let old_state = inner.state.clone();
    if inner.machine.consume(&transition.input()).is_err() {
        return Err(illegal(inner, &transition));
    }

    let new_state = match transition {
        Transition::OtpSent { email } => {
            inner.user = None;
            SessionState::OtpRequested { email }
        }
        Transition::VerifyRejected => old_state.clone(),
        Transition::Verified { user }
        | Transition::SessionRestored { user }
        | Transition::ProfileLoaded { user } => {
            inner.user = Some(user.clone());
            SessionState::Authenticated { user }
        }
        Transition::RefreshStarted => SessionState::Refreshing,
        Transition::RefreshSucceeded => match inner.user.clone() {
            Some(user) => SessionState::Authenticated { user },
            None => SessionState::Refreshing,
        },
        Transition::RefreshFailed => {
            inner.user = None;
            SessionState::Expired
        }
        Transition::EmailChangeRequested
        | Transition::ValidationFailed
        | Transition::LogoutRequested
        | Transition::Acknowledged => {
            inner.user = None;
            SessionState::Anonymous
        }
    };

    inner.state = new_state.clone();
    Ok((old_state, new_state))
}
