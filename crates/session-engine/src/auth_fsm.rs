//! Session state machine using rust-fsm.
//!
//! The machine owns which transitions are legal. Payloads (the email an OTP
//! was sent to, the authenticated user) ride alongside in [`SessionState`].
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐  OtpSent   ┌─────────────────┐
//! │    Anonymous    │ ─────────► │  OtpRequested   │ ◄─┐ OtpSent / VerifyRejected
//! └─────────────────┘            └────────┬────────┘ ──┘
//!     ▲    │ SessionRestored              │ Verified
//!     │    ▼                              ▼
//!     │  ┌──────────────────────────────────────┐ ◄─┐ ProfileLoaded
//!     │  │            Authenticated             │ ──┘
//!     │  └──────┬───────────────────────▲───────┘
//!     │         │ RefreshStarted        │ RefreshSucceeded
//!     │         ▼                       │
//!     │  ┌──────────────────────────────┴───────┐
//!     │  │             Refreshing               │
//!     │  └──────────────────┬───────────────────┘
//!     │                     │ RefreshFailed (also from Authenticated)
//!     │ Acknowledged        ▼
//!     │              ┌─────────────────┐
//!     └───────────── │     Expired     │
//!                    └─────────────────┘
//! ```
//!
//! `LogoutRequested` leads back to `Anonymous` from every other state.

use credential_store::SessionUser;
use rust_fsm::*;
use serde::Serialize;

state_machine! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub session_machine(Anonymous)

    Anonymous => {
        OtpSent => OtpRequested,
        SessionRestored => Authenticated
    },
    OtpRequested => {
        OtpSent => OtpRequested,
        VerifyRejected => OtpRequested,
        Verified => Authenticated,
        EmailChangeRequested => Anonymous,
        LogoutRequested => Anonymous
    },
    Authenticated => {
        ProfileLoaded => Authenticated,
        RefreshStarted => Refreshing,
        // No refresh token on hand: straight to Expired
        RefreshFailed => Expired,
        ValidationFailed => Anonymous,
        LogoutRequested => Anonymous
    },
    Refreshing => {
        RefreshSucceeded => Authenticated,
        RefreshFailed => Expired,
        LogoutRequested => Anonymous
    },
    Expired => {
        Acknowledged => Anonymous,
        OtpSent => OtpRequested,
        LogoutRequested => Anonymous
    }
}

pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Whether `input` is accepted in `state`, without consuming it.
pub fn accepts(state: &SessionMachineState, input: &SessionMachineInput) -> bool {
    <session_machine::Impl as StateMachineImpl>::transition(state, input).is_some()
}

/// Session state as seen by the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// No session.
    Anonymous,
    /// An OTP was sent to `email` and the user has not verified it yet.
    OtpRequested { email: String },
    /// Valid session for `user`.
    Authenticated { user: SessionUser },
    /// A token refresh is in flight.
    Refreshing,
    /// Refresh failed; the user must log in again.
    Expired,
}

impl SessionState {
    /// True in `Authenticated` and `Refreshing`; a refresh keeps the session.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated { .. } | SessionState::Refreshing)
    }

    pub fn user(&self) -> Option<&SessionUser> {
        match self {
            SessionState::Authenticated { user } => Some(user),
            _ => None,
        }
    }

    /// Short name for logs and the CLI.
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Anonymous => "anonymous",
            SessionState::OtpRequested { .. } => "otp_requested",
            SessionState::Authenticated { .. } => "authenticated",
            SessionState::Refreshing => "refreshing",
            SessionState::Expired => "expired",
        }
    }
}

/// A transition request together with the data the target state carries.
#[derive(Debug, Clone)]
pub enum Transition {
    OtpSent { email: String },
    Verified { user: SessionUser },
    VerifyRejected,
    EmailChangeRequested,
    SessionRestored { user: SessionUser },
    ProfileLoaded { user: SessionUser },
    ValidationFailed,
    RefreshStarted,
    RefreshSucceeded,
    RefreshFailed,
    LogoutRequested,
    Acknowledged,
}

impl Transition {
    pub fn input(&self) -> SessionMachineInput {
        match self {
            Transition::OtpSent { .. } => SessionMachineInput::OtpSent,
            Transition::Verified { .. } => SessionMachineInput::Verified,
            Transition::VerifyRejected => SessionMachineInput::VerifyRejected,
            Transition::EmailChangeRequested => SessionMachineInput::EmailChangeRequested,
            Transition::SessionRestored { .. } => SessionMachineInput::SessionRestored,
            Transition::ProfileLoaded { .. } => SessionMachineInput::ProfileLoaded,
            Transition::ValidationFailed => SessionMachineInput::ValidationFailed,
            Transition::RefreshStarted => SessionMachineInput::RefreshStarted,
            Transition::RefreshSucceeded => SessionMachineInput::RefreshSucceeded,
            Transition::RefreshFailed => SessionMachineInput::RefreshFailed,
            Transition::LogoutRequested => SessionMachineInput::LogoutRequested,
            Transition::Acknowledged => SessionMachineInput::Acknowledged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn drive(inputs: &[SessionMachineInput]) -> SessionMachine {
        let mut machine = SessionMachine::new();
        for input in inputs {
            machine.consume(input).unwrap();
        }
        machine
    }

    #[test]
    fn test_initial_state_is_anonymous() {
        let machine = SessionMachine::new();
        assert_eq!(*machine.state(), SessionMachineState::Anonymous);
    }

    #[test]
    fn test_otp_login_flow() {
        let mut machine = SessionMachine::new();

        machine.consume(&SessionMachineInput::OtpSent).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::OtpRequested);

        // Wrong code keeps the user on the code screen
        machine.consume(&SessionMachineInput::VerifyRejected).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::OtpRequested);

        // Resend
        machine.consume(&SessionMachineInput::OtpSent).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::OtpRequested);

        machine.consume(&SessionMachineInput::Verified).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Authenticated);
    }

    #[test]
    fn test_change_email_returns_to_anonymous() {
        let mut machine = drive(&[SessionMachineInput::OtpSent]);
        machine
            .consume(&SessionMachineInput::EmailChangeRequested)
            .unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Anonymous);
    }

    #[test]
    fn test_cannot_verify_without_otp() {
        let mut machine = SessionMachine::new();
        assert!(machine.consume(&SessionMachineInput::Verified).is_err());
        assert_eq!(*machine.state(), SessionMachineState::Anonymous);
    }

    #[test]
    fn test_refresh_success_returns_to_authenticated() {
        let mut machine = drive(&[
            SessionMachineInput::OtpSent,
            SessionMachineInput::Verified,
            SessionMachineInput::RefreshStarted,
        ]);
        assert_eq!(*machine.state(), SessionMachineState::Refreshing);

        machine.consume(&SessionMachineInput::RefreshSucceeded).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Authenticated);
    }

    #[test]
    fn test_refresh_failure_expires_session() {
        let mut machine = drive(&[
            SessionMachineInput::SessionRestored,
            SessionMachineInput::RefreshStarted,
        ]);
        machine.consume(&SessionMachineInput::RefreshFailed).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Expired);

        machine.consume(&SessionMachineInput::Acknowledged).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Anonymous);
    }

    #[test]
    fn test_missing_refresh_token_expires_without_refreshing() {
        let mut machine = drive(&[SessionMachineInput::SessionRestored]);
        machine.consume(&SessionMachineInput::RefreshFailed).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Expired);
    }

    #[test]
    fn test_expired_can_request_new_otp() {
        let mut machine = drive(&[
            SessionMachineInput::SessionRestored,
            SessionMachineInput::RefreshFailed,
        ]);
        machine.consume(&SessionMachineInput::OtpSent).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::OtpRequested);
    }

    #[test]
    fn test_restore_validation_failure_downgrades() {
        let mut machine = drive(&[SessionMachineInput::SessionRestored]);
        machine
            .consume(&SessionMachineInput::ValidationFailed)
            .unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Anonymous);
    }

    #[test]
    fn test_logout_from_every_state_but_anonymous() {
        let paths: [&[SessionMachineInput]; 4] = [
            &[SessionMachineInput::OtpSent],
            &[SessionMachineInput::SessionRestored],
            &[
                SessionMachineInput::SessionRestored,
                SessionMachineInput::RefreshStarted,
            ],
            &[
                SessionMachineInput::SessionRestored,
                SessionMachineInput::RefreshFailed,
            ],
        ];
        for path in paths {
            let mut machine = drive(path);
            machine.consume(&SessionMachineInput::LogoutRequested).unwrap();
            assert_eq!(*machine.state(), SessionMachineState::Anonymous);
        }

        let mut machine = SessionMachine::new();
        assert!(machine
            .consume(&SessionMachineInput::LogoutRequested)
            .is_err());
    }

    #[test]
    fn test_invalid_transition_returns_error() {
        let mut machine = SessionMachine::new();

        // Nothing to refresh
        assert!(machine.consume(&SessionMachineInput::RefreshStarted).is_err());
        assert!(machine.consume(&SessionMachineInput::RefreshFailed).is_err());

        // Already logged in: no new OTP
        let mut machine = drive(&[SessionMachineInput::SessionRestored]);
        assert!(machine.consume(&SessionMachineInput::OtpSent).is_err());
        assert_eq!(*machine.state(), SessionMachineState::Authenticated);
    }

    #[test]
    fn test_accepts_does_not_consume() {
        let machine = SessionMachine::new();
        assert!(accepts(machine.state(), &SessionMachineInput::OtpSent));
        assert!(!accepts(machine.state(), &SessionMachineInput::Verified));
        assert_eq!(*machine.state(), SessionMachineState::Anonymous);
    }

    #[test]
    fn test_session_state_is_authenticated() {
        let user: SessionUser =
            serde_json::from_value(json!({"id": 1, "email": "a@b.com"})).unwrap();

        assert!(!SessionState::Anonymous.is_authenticated());
        assert!(!SessionState::OtpRequested {
            email: "a@b.com".to_string()
        }
        .is_authenticated());
        assert!(SessionState::Authenticated { user }.is_authenticated());
        assert!(SessionState::Refreshing.is_authenticated());
        assert!(!SessionState::Expired.is_authenticated());
    }

    #[test]
    fn test_session_state_serializes_with_tag() {
        let state = SessionState::OtpRequested {
            email: "a@b.com".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&state).unwrap(),
            json!({"state": "otp_requested", "email": "a@b.com"})
        );
        assert_eq!(
            serde_json::to_value(SessionState::Expired).unwrap(),
            json!({"state": "expired"})
        );
    }

    #[test]
    fn test_transition_maps_to_machine_input() {
        assert_eq!(
            Transition::OtpSent {
                email: "a@b.com".to_string()
            }
            .input(),
            SessionMachineInput::OtpSent
        );
        assert_eq!(
            Transition::RefreshFailed.input(),
            SessionMachineInput::RefreshFailed
        );
    }
}
