//! Session engine for the ERP API client.
//!
//! This crate provides:
//! - An authenticated request client that refreshes on 401 and replays once
//! - Single-flight token refresh shared by every concurrent caller
//! - An explicit FSM for the OTP login and session lifecycle
//! - A facade for UI code (OTP login, logout, profile, restore)

mod auth_fsm;
mod client;
mod envelope;
mod error;
mod events;
mod facade;
mod refresh;
mod session;
mod transport;

pub use auth_fsm::session_machine;
pub use auth_fsm::{
    SessionMachine, SessionMachineInput, SessionMachineState, SessionState, Transition,
};
pub use client::ApiClient;
pub use envelope::{decode_payload, Envelope, ErrorInfo};
pub use error::{SessionError, SessionResult};
pub use events::SessionEvent;
pub use facade::{
    AuthFacade, OtpChallenge, CURRENT_USER_PATH, DEFAULT_OTP_VALIDITY, LOGOUT_PATH,
    REQUEST_OTP_PATH, VERIFY_OTP_PATH,
};
pub use refresh::{RefreshCoordinator, RefreshFailure, REFRESH_PATH};
pub use session::SessionTracker;
pub use transport::{ClientOptions, PendingRequest};

pub use credential_store::{CredentialStore, SessionUser, TokenPair, UserId, UserRole};
pub use reqwest::Method;
