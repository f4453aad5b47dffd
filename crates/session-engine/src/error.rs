//! Session error types.

use serde_json::Value;
use thiserror::Error;

/// Error returned by every client, coordinator, and facade operation.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Non-2xx response other than a recoverable 401, or a 401 after replay
    #[error("{message}")]
    RequestFailed {
        status: u16,
        message: String,
        code: Option<String>,
        details: Option<Value>,
    },

    /// Refresh token missing or refresh rejected; credentials have been cleared
    #[error("Session expired. Please login again.")]
    SessionExpired,

    /// No response at all (DNS, connect, reset)
    #[error("Network error: {0}")]
    Network(String),

    /// Primary call exceeded the configured bound
    #[error("Request timed out")]
    Timeout,

    /// OTP flow rejection or local input validation failure
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<Value>,
    },

    /// 2xx body that could not be decoded
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Request body could not be serialized
    #[error("Failed to encode request body: {0}")]
    Encoding(String),

    /// Operation not allowed in the current session state
    #[error("Invalid session state transition: {0}")]
    InvalidStateTransition(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] credential_store::StorageError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl SessionError {
    /// Returns true if the operation may succeed when retried by the caller.
    ///
    /// Transient errors include network failures, timeouts, and 5xx responses.
    pub fn is_transient(&self) -> bool {
        match self {
            SessionError::Network(_) | SessionError::Timeout => true,
            SessionError::RequestFailed { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            SessionError::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Text suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Network(_) => "Network error occurred".to_string(),
            SessionError::Storage(_)
            | SessionError::Config(_)
            | SessionError::InvalidUrl(_)
            | SessionError::Encoding(_) => "An unexpected error occurred".to_string(),
            other => other.to_string(),
        }
    }

    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_builder() {
            // Malformed request (e.g. a bad header name); nothing was sent.
            SessionError::Encoding(err.to_string())
        } else if err.is_timeout() {
            SessionError::Timeout
        } else {
            SessionError::Network(err.to_string())
        }
    }
}

impl From<client_config_and_utils::CoreError> for SessionError {
    fn from(err: client_config_and_utils::CoreError) -> Self {
        match err {
            client_config_and_utils::CoreError::InvalidUrl(e) => SessionError::InvalidUrl(e),
            other => SessionError::Config(other.to_string()),
        }
    }
}

/// Result type alias using SessionError.
pub type SessionResult<T> = Result<T, SessionError>;
