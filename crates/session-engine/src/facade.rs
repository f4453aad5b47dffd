//! Public surface for UI code: OTP login, logout, profile, session restore.
//!
//! The facade drives the [`SessionTracker`] from login outcomes and writes
//! credentials directly. All network I/O goes through [`ApiClient`].

use crate::auth_fsm::{SessionState, Transition};
use crate::client::{with_body, ApiClient};
use crate::envelope::decode_payload;
use crate::events::SessionEvent;
use crate::session::SessionTracker;
use crate::transport::{ClientOptions, PendingRequest};
use crate::{SessionError, SessionResult};
use client_config_and_utils::{Config, Paths};
use credential_store::{open_file_store, CredentialStore, SessionUser, TokenPair};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const REQUEST_OTP_PATH: &str = "/auth/request-otp/";
pub const VERIFY_OTP_PATH: &str = "/auth/verify-otp/";
pub const LOGOUT_PATH: &str = "/auth/logout/";
pub const CURRENT_USER_PATH: &str = "/users/me/";

pub const OTP_LENGTH: usize = 6;

/// Validity assumed when the server does not say.
pub const DEFAULT_OTP_VALIDITY: Duration = Duration::from_secs(5 * 60);

/// Result of a successful OTP request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OtpChallenge {
    pub email: String,
    pub valid_for: Duration,
}

#[derive(Debug, Default, Deserialize)]
struct OtpChallengeBody {
    #[serde(default, alias = "expires_in")]
    otp_valid_for: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct VerifyOtpBody {
    access: String,
    refresh: String,
    user: SessionUser,
}

#[derive(Clone)]
pub struct AuthFacade {
    client: ApiClient,
    store: Arc<CredentialStore>,
    session: Arc<SessionTracker>,
}

impl AuthFacade {
    pub fn new(store: Arc<CredentialStore>, options: &ClientOptions) -> SessionResult<Self> {
        let session = Arc::new(SessionTracker::new());
        let client = ApiClient::new(options, store.clone(), session.clone())?;
        Ok(Self {
            client,
            store,
            session,
        })
    }

    /// Build a facade backed by the credential file under `paths`.
    pub fn from_config(config: &Config, paths: &Paths) -> SessionResult<Self> {
        paths.ensure_dirs()?;
        let store = open_file_store(&paths.credentials_file(), &config.storage_namespace)?;
        Self::new(Arc::new(store), &ClientOptions::from_config(config)?)
    }

    /// Client for domain API calls; shares this facade's session.
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.session.subscribe()
    }

    /// True when a session is held and a token is stored.
    pub fn is_authenticated(&self) -> bool {
        self.session.state().is_authenticated() && self.store.has_token().unwrap_or(false)
    }

    /// Cached user, possibly stale until the next `get_current_user`.
    pub fn get_stored_user(&self) -> SessionResult<Option<SessionUser>> {
        Ok(self.store.get_user()?)
    }

    /// Send a login code to `email`.
    pub async fn request_otp(&self, email: &str) -> SessionResult<OtpChallenge> {
        let email = validate_email(email)?;
        let transition = Transition::OtpSent {
            email: email.clone(),
        };
        self.ensure_allowed(&transition)?;

        let request =
            PendingRequest::new(Method::POST, REQUEST_OTP_PATH).json(json!({ "email": email }));
        let body: OtpChallengeBody = decode_payload(self.client.request_anonymous(request).await?)?;

        self.session.apply(transition)?;
        info!(email = %email, "Login code sent");

        Ok(OtpChallenge {
            email,
            valid_for: body
                .otp_valid_for
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_OTP_VALIDITY),
        })
    }

    /// Send another code to the email of the pending OTP login.
    pub async fn resend_otp(&self) -> SessionResult<OtpChallenge> {
        match self.session.state() {
            SessionState::OtpRequested { email } => self.request_otp(&email).await,
            other => Err(SessionError::InvalidStateTransition(format!(
                "No pending login code to resend in state {}",
                other.name()
            ))),
        }
    }

    /// Abandon the pending OTP login so a different email can be entered.
    pub fn change_email(&self) -> SessionResult<SessionState> {
        self.session.apply(Transition::EmailChangeRequested)
    }

    /// Exchange a login code for a session.
    pub async fn verify_otp(&self, email: &str, code: &str) -> SessionResult<SessionUser> {
        let email = validate_email(email)?;
        let code = validate_otp(code)?;
        self.ensure_allowed(&Transition::VerifyRejected)?;

        let request = PendingRequest::new(Method::POST, VERIFY_OTP_PATH)
            .json(json!({ "email": email, "otp": code }));

        let body: VerifyOtpBody = match self.client.request_anonymous(request).await {
            Ok(value) => decode_payload(value)?,
            Err(e) => {
                debug!(error = %e, "Login code rejected");
                self.session.apply_if_valid(Transition::VerifyRejected);
                return Err(e);
            }
        };

        // The login may have been abandoned while the call was in flight;
        // tokens are only written if the session can still accept them.
        let pair = TokenPair::new(body.access, body.refresh);
        self.session.apply_after(
            Transition::Verified {
                user: body.user.clone(),
            },
            || Ok(self.store.set(&pair, &body.user)?),
        )?;

        info!(user_id = %body.user.id, role = ?body.user.role, "Logged in");
        Ok(body.user)
    }

    /// End the session. The server is told on a best-effort basis; local
    /// credentials are always cleared.
    pub async fn logout(&self) -> SessionResult<()> {
        match self.store.refresh_token() {
            Ok(Some(refresh)) => {
                let request = PendingRequest::new(Method::POST, LOGOUT_PATH)
                    .json(json!({ "refresh": refresh }));
                if let Err(e) = self.client.request_once(request).await {
                    warn!(error = %e, "Server logout failed, clearing local session anyway");
                }
            }
            Ok(None) => debug!("No refresh token, skipping server logout"),
            Err(e) => warn!(error = %e, "Could not read refresh token for logout"),
        }

        let cleared = self
            .session
            .apply_if_valid_after(Transition::LogoutRequested, || self.store.clear());
        self.session.emit(SessionEvent::LoggedOut);
        info!("Logged out");

        Ok(cleared?)
    }

    /// Fetch the profile of the logged-in user and refresh the cached copy.
    pub async fn get_current_user(&self) -> SessionResult<SessionUser> {
        let user: SessionUser = self.client.get(CURRENT_USER_PATH).await?;
        self.remember_user(&user)?;
        Ok(user)
    }

    /// Update profile fields and cache the server's answer.
    pub async fn update_current_user<P>(&self, patch: &P) -> SessionResult<SessionUser>
    where
        P: Serialize + ?Sized,
    {
        let request = with_body(Method::PATCH, CURRENT_USER_PATH, patch)?;
        let user: SessionUser = self.client.request(request).await?;
        self.remember_user(&user)?;
        Ok(user)
    }

    /// Leave the `Expired` screen.
    pub fn acknowledge_expired(&self) -> SessionResult<SessionState> {
        self.session.apply(Transition::Acknowledged)
    }

    /// Load a stored session at startup. With a token and cached user the
    /// session is assumed valid until [`validate_session`](Self::validate_session)
    /// says otherwise.
    pub fn restore_session(&self) -> SessionResult<SessionState> {
        let state = self.session.state();
        if !matches!(state, SessionState::Anonymous) {
            return Ok(state);
        }

        let user = match self.store.get_user() {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Cached user is unreadable, discarding stored session");
                self.store.clear()?;
                return Ok(state);
            }
        };

        match (self.store.has_token()?, user) {
            (true, Some(user)) => {
                debug!(user_id = %user.id, "Restoring stored session");
                self.session.apply(Transition::SessionRestored { user })
            }
            (true, None) => {
                warn!("Stored token has no cached user, discarding");
                self.store.clear()?;
                Ok(state)
            }
            _ => Ok(state),
        }
    }

    /// Confirm a restored session with the server.
    ///
    /// A rejected refresh has already moved the session to `Expired`. Any
    /// other failure drops back to `Anonymous` and clears credentials.
    pub async fn validate_session(&self) -> SessionResult<SessionState> {
        if !self.session.state().is_authenticated() {
            return Ok(self.session.state());
        }

        match self.get_current_user().await {
            Ok(_) => Ok(self.session.state()),
            Err(SessionError::SessionExpired) => Ok(self.session.state()),
            Err(e) => {
                warn!(error = %e, "Stored session failed validation");
                self.store.clear()?;
                self.session.apply_if_valid(Transition::ValidationFailed);
                Err(e)
            }
        }
    }

    /// Restore and validate in the background.
    pub fn spawn_restore(&self) -> SessionResult<JoinHandle<SessionResult<SessionState>>> {
        self.restore_session()?;
        let facade = self.clone();
        Ok(tokio::spawn(async move { facade.validate_session().await }))
    }

    fn remember_user(&self, user: &SessionUser) -> SessionResult<()> {
        if self.store.has_token()? {
            self.store.set_user(user)?;
        }
        self.session.apply_if_valid(Transition::ProfileLoaded { user: user.clone() });
        Ok(())
    }

    fn ensure_allowed(&self, transition: &Transition) -> SessionResult<()> {
        if self.session.can_apply(transition) {
            return Ok(());
        }
        Err(SessionError::InvalidStateTransition(format!(
            "{:?} not allowed in state {}",
            transition.input(),
            self.session.state().name()
        )))
    }
}

fn validate_email(email: &str) -> SessionResult<String> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(SessionError::Validation {
            message: "Please enter a valid email address".to_string(),
            details: None,
        });
    }
    Ok(email.to_string())
}

fn validate_otp(code: &str) -> SessionResult<String> {
    let code = code.trim();
    if code.len() != OTP_LENGTH || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SessionError::Validation {
            message: format!("Login code must be {} digits", OTP_LENGTH),
            details: None,
        });
    }
    Ok(code.to_string())
}
