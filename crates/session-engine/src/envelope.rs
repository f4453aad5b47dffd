//! Response body shapes.
//!
//! The API answers either with an envelope `{"success": true, "data": ...}`
//! or with the payload itself. Errors carry their message in one of
//! `error.message`, `message`, or `detail`.

use crate::SessionError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

/// A decoded success body.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope<T> {
    /// Payload found under a non-null `data` key.
    Wrapped(T),
    /// The body itself is the payload.
    Bare(T),
}

impl<T: DeserializeOwned> Envelope<T> {
    /// Decode `body`, preferring the `data` field when it holds a `T`.
    pub fn decode(body: Value) -> Result<Self, serde_json::Error> {
        if let Some(data) = body.get("data").filter(|data| !data.is_null()) {
            if let Ok(payload) = T::deserialize(data) {
                return Ok(Envelope::Wrapped(payload));
            }
        }
        serde_json::from_value(body).map(Envelope::Bare)
    }
}

impl<T> Envelope<T> {
    pub fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped(payload) | Envelope::Bare(payload) => payload,
        }
    }
}

/// Decode a success body into `T`, unwrapping the envelope if present.
pub fn decode_payload<T: DeserializeOwned>(body: Value) -> Result<T, SessionError> {
    Envelope::decode(body)
        .map(Envelope::into_inner)
        .map_err(|e| SessionError::InvalidResponse(e.to_string()))
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<ErrorField>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorField {
    Detail(ErrorDetail),
    Text(String),
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<Value>,
}

/// Message, code, and details pulled from an error body.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorInfo {
    pub message: String,
    pub code: Option<String>,
    pub details: Option<Value>,
}

impl ErrorInfo {
    /// Extract error information from a raw body. Bodies that are empty or
    /// not JSON fall back to a generic message naming the status.
    pub fn from_body(status: u16, body: &[u8]) -> Self {
        let parsed: ErrorBody = serde_json::from_slice(body).unwrap_or_default();

        let (code, nested_message, details) = match parsed.error {
            Some(ErrorField::Detail(detail)) => (detail.code, detail.message, detail.details),
            Some(ErrorField::Text(text)) => (None, Some(text), None),
            None => (None, None, None),
        };

        let message = [nested_message, parsed.message, parsed.detail]
            .into_iter()
            .flatten()
            .find(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("Request failed with status {}", status));

        Self {
            message,
            code,
            details,
        }
    }

    pub fn into_request_failed(self, status: u16) -> SessionError {
        SessionError::RequestFailed {
            status,
            message: self.message,
            code: self.code,
            details: self.details,
        }
    }

    pub fn into_validation(self) -> SessionError {
        SessionError::Validation {
            message: self.message,
            details: self.details,
        }
    }
}
