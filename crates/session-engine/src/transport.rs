//! Thin HTTP layer shared by the request client and the refresh coordinator.

use crate::{SessionError, SessionResult};
use client_config_and_utils::Config;
use reqwest::header::ACCEPT;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::trace;
use url::Url;

/// Base URL and timeout for talking to the API.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: Url,
    pub timeout: Duration,
}

impl ClientOptions {
    pub fn new(base_url: &str, timeout: Duration) -> SessionResult<Self> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            timeout,
        })
    }

    pub fn from_config(config: &Config) -> SessionResult<Self> {
        Ok(Self {
            base_url: config.api_base_url()?,
            timeout: config.request_timeout(),
        })
    }
}

/// A request that can be sent more than once.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
}

impl PendingRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Status and body of a completed exchange.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Parse the body as JSON. An empty body reads as `null`.
    pub fn json(&self) -> SessionResult<Value> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&self.body).map_err(|e| SessionError::InvalidResponse(e.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct Transport {
    http: Client,
    base_url: String,
}

impl Transport {
    pub fn new(options: &ClientOptions) -> SessionResult<Self> {
        let http = Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| SessionError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: options.base_url.as_str().trim_end_matches('/').to_string(),
        })
    }

    /// Absolute URL for an API path such as `/users/me/`.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send `request` once, attaching `bearer` when given.
    ///
    /// Only transport failures are errors; any status comes back as a
    /// [`RawResponse`].
    pub async fn send(
        &self,
        request: &PendingRequest,
        bearer: Option<&str>,
    ) -> SessionResult<RawResponse> {
        let url = self.url(&request.path);
        trace!(method = %request.method, url = %url, "Sending request");

        let mut builder = self
            .http
            .request(request.method.clone(), &url)
            .header(ACCEPT, "application/json");
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(SessionError::from_transport)?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(SessionError::from_transport)?
            .to_vec();

        trace!(status = %status, bytes = body.len(), "Received response");
        Ok(RawResponse { status, body })
    }
}
