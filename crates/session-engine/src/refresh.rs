//! Single-flight access token refresh.
//!
//! At most one refresh call is outstanding per process. The first caller
//! installs a shared future in the in-flight slot; everyone arriving before
//! it resolves awaits that same future. The slot lock is never held across
//! an await. The future is also spawned so it completes even if every
//! waiter is cancelled.

use crate::auth_fsm::Transition;
use crate::envelope::decode_payload;
use crate::events::SessionEvent;
use crate::session::SessionTracker;
use crate::transport::{PendingRequest, Transport};
use crate::{SessionError, SessionResult};
use credential_store::{CredentialStore, TokenPair};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

pub const REFRESH_PATH: &str = "/auth/refresh/";

/// Why a refresh did not produce a token. Waiters all see `SessionExpired`;
/// the reason is for logs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RefreshFailure {
    #[error("no refresh token stored")]
    MissingRefreshToken,
    #[error("refresh rejected with status {status}")]
    Rejected { status: u16 },
    #[error("refresh request failed: {0}")]
    Transport(String),
    #[error("refresh response unreadable: {0}")]
    InvalidResponse(String),
    #[error("credential storage failed: {0}")]
    Storage(String),
    #[error("session cleared while refreshing")]
    Superseded,
}

type RefreshOutcome = Result<String, RefreshFailure>;
type InFlightRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
    /// Present only when the server rotates refresh tokens.
    #[serde(default)]
    refresh: Option<String>,
}

struct Inner {
    transport: Transport,
    store: Arc<CredentialStore>,
    session: Arc<SessionTracker>,
    in_flight: Mutex<Option<InFlightRefresh>>,
}

#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        transport: Transport,
        store: Arc<CredentialStore>,
        session: Arc<SessionTracker>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                store,
                session,
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Whether a refresh call is outstanding.
    pub fn is_refreshing(&self) -> bool {
        self.inner.in_flight.lock().is_some()
    }

    /// Obtain a fresh access token, joining the in-flight refresh if any.
    pub async fn ensure_fresh(&self) -> SessionResult<String> {
        self.refresh_after(None).await
    }

    /// Like [`ensure_fresh`](Self::ensure_fresh), for a caller whose request
    /// was rejected while carrying `rejected`. If the stored access token has
    /// already moved on, it is returned without another refresh.
    pub async fn refresh_after(&self, rejected: Option<&str>) -> SessionResult<String> {
        let refresh = {
            let mut slot = self.inner.in_flight.lock();
            match slot.as_ref() {
                Some(existing) => {
                    debug!("Joining in-flight token refresh");
                    existing.clone()
                }
                None => {
                    if let Some(rejected) = rejected {
                        if let Some(current) = self.inner.store.access_token()? {
                            if current != rejected {
                                debug!("Access token already rotated, skipping refresh");
                                return Ok(current);
                            }
                        }
                    }

                    let refresh = run(self.inner.clone()).boxed().shared();
                    *slot = Some(refresh.clone());
                    // Without a runtime the waiters drive it; dropping all of
                    // them then abandons the refresh.
                    if let Ok(handle) = Handle::try_current() {
                        handle.spawn(refresh.clone());
                    }
                    refresh
                }
            }
        };

        refresh.await.map_err(|_| SessionError::SessionExpired)
    }
}

async fn run(inner: Arc<Inner>) -> RefreshOutcome {
    let outcome = inner.refresh().await;

    match &outcome {
        Ok(_) => {
            inner.session.apply_if_valid(Transition::RefreshSucceeded);
            info!("Access token refreshed");
        }
        Err(RefreshFailure::Superseded) => {
            debug!("Session ended during refresh, discarding new tokens");
        }
        Err(failure) => inner.invalidate(failure),
    }

    inner.in_flight.lock().take();
    outcome
}

impl Inner {
    async fn refresh(&self) -> RefreshOutcome {
        let refresh_token = self
            .store
            .refresh_token()
            .map_err(|e| RefreshFailure::Storage(e.to_string()))?
            .ok_or(RefreshFailure::MissingRefreshToken)?;

        self.session.apply_if_valid(Transition::RefreshStarted);
        debug!(path = REFRESH_PATH, "Refreshing access token");

        let request =
            PendingRequest::new(Method::POST, REFRESH_PATH).json(json!({ "refresh": refresh_token }));
        let response = self
            .transport
            .send(&request, None)
            .await
            .map_err(|e| RefreshFailure::Transport(e.to_string()))?;

        if !response.status.is_success() {
            return Err(RefreshFailure::Rejected {
                status: response.status.as_u16(),
            });
        }

        let payload: RefreshResponse = response
            .json()
            .and_then(decode_payload::<RefreshResponse>)
            .map_err(|e| RefreshFailure::InvalidResponse(e.to_string()))?;

        let pair = TokenPair::new(
            payload.access,
            payload.refresh.unwrap_or_else(|| refresh_token.clone()),
        );

        let rotated = self
            .store
            .rotate_tokens(&refresh_token, &pair)
            .map_err(|e| RefreshFailure::Storage(e.to_string()))?;
        if rotated {
            return Ok(pair.access);
        }

        // Logged out, or logged in again, while the call was in flight
        match self.store.access_token() {
            Ok(Some(current)) => Ok(current),
            _ => Err(RefreshFailure::Superseded),
        }
    }

    fn invalidate(&self, failure: &RefreshFailure) {
        warn!(reason = %failure, "Token refresh failed, clearing session");

        let had_session =
            self.store.has_token().unwrap_or(true) || self.session.state().is_authenticated();

        if let Err(e) = self.store.clear() {
            error!(error = %e, "Failed to clear credentials after refresh failure");
        }
        self.session.apply_if_valid(Transition::RefreshFailed);

        if had_session {
            self.session.emit(SessionEvent::SessionInvalidated);
        }
    }
}
