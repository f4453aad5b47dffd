//! Authenticated request client.
//!
//! Every API call goes through [`ApiClient`]. Requests carry the stored
//! access token; a 401 triggers one shared refresh and one replay with the
//! new token. A second 401 is returned to the caller as-is.

use crate::envelope::{decode_payload, ErrorInfo};
use crate::refresh::RefreshCoordinator;
use crate::session::SessionTracker;
use crate::transport::{ClientOptions, PendingRequest, RawResponse, Transport};
use crate::{SessionError, SessionResult};
use credential_store::CredentialStore;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// HTTP goes through reqwest, so requests must be polled inside a Tokio
/// runtime. Refreshes are spawned onto the current runtime when there is one.
#[derive(Clone)]
pub struct ApiClient {
    transport: Transport,
    store: Arc<CredentialStore>,
    refresher: RefreshCoordinator,
}

impl ApiClient {
    pub fn new(
        options: &ClientOptions,
        store: Arc<CredentialStore>,
        session: Arc<SessionTracker>,
    ) -> SessionResult<Self> {
        let transport = Transport::new(options)?;
        let refresher = RefreshCoordinator::new(transport.clone(), store.clone(), session);
        Ok(Self {
            transport,
            store,
            refresher,
        })
    }

    pub fn refresher(&self) -> &RefreshCoordinator {
        &self.refresher
    }

    /// Send an authenticated request and decode the payload into `T`.
    pub async fn request<T: DeserializeOwned>(&self, request: PendingRequest) -> SessionResult<T> {
        decode_payload(self.request_value(request).await?)
    }

    /// Send an authenticated request, refreshing and replaying once on 401.
    /// Returns the raw JSON body.
    pub async fn request_value(&self, request: PendingRequest) -> SessionResult<Value> {
        let token = self.store.access_token()?;
        let response = self.transport.send(&request, token.as_deref()).await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return into_result(response);
        }

        debug!(method = %request.method, path = %request.path, "Unauthorized, refreshing access token");
        let fresh = self.refresher.refresh_after(token.as_deref()).await?;

        let replay = self.transport.send(&request, Some(&fresh)).await?;
        if replay.status == StatusCode::UNAUTHORIZED {
            warn!(
                method = %request.method,
                path = %request.path,
                "Still unauthorized after token refresh"
            );
        }
        into_result(replay)
    }

    /// Send with the stored token attached but without refresh on 401.
    pub async fn request_once(&self, request: PendingRequest) -> SessionResult<Value> {
        let token = self.store.access_token()?;
        into_result(self.transport.send(&request, token.as_deref()).await?)
    }

    /// Send without credentials. Client errors come back as `Validation`,
    /// which is how the OTP endpoints report bad input.
    pub async fn request_anonymous(&self, request: PendingRequest) -> SessionResult<Value> {
        let response = self.transport.send(&request, None).await?;
        if response.status.is_client_error() {
            return Err(ErrorInfo::from_body(response.status.as_u16(), &response.body).into_validation());
        }
        into_result(response)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> SessionResult<T> {
        self.request(PendingRequest::new(Method::GET, path)).await
    }

    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> SessionResult<T> {
        let request = query
            .iter()
            .fold(PendingRequest::new(Method::GET, path), |req, (k, v)| {
                req.query(*k, *v)
            });
        self.request(request).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> SessionResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(with_body(Method::POST, path, body)?).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> SessionResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(with_body(Method::PUT, path, body)?).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> SessionResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(with_body(Method::PATCH, path, body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> SessionResult<T> {
        self.request(PendingRequest::new(Method::DELETE, path)).await
    }
}

pub(crate) fn with_body<B: Serialize + ?Sized>(
    method: Method,
    path: &str,
    body: &B,
) -> SessionResult<PendingRequest> {
    let body = serde_json::to_value(body).map_err(|e| SessionError::Encoding(e.to_string()))?;
    Ok(PendingRequest::new(method, path).json(body))
}

fn into_result(response: RawResponse) -> SessionResult<Value> {
    if response.status.is_success() {
        return response.json();
    }
    let status = response.status.as_u16();
    Err(ErrorInfo::from_body(status, &response.body).into_request_failed(status))
}
