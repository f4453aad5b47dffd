//! Session notifications fanned out to any number of listeners.

use crate::auth_fsm::SessionState;
use tokio::sync::broadcast;

/// Capacity of the notification channel. Slow listeners see `Lagged`.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The session state changed.
    StateChanged(SessionState),
    /// A refresh failed and credentials were cleared; the UI should route to login.
    /// Emitted once per failed refresh, however many requests were waiting on it.
    SessionInvalidated,
    /// The user logged out.
    LoggedOut,
}

pub fn channel() -> broadcast::Sender<SessionEvent> {
    let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    tx
}
