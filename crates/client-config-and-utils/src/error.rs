//! Error type shared by configuration, path resolution and logging setup.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// A config value failed validation.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// `api_base_url` is not an absolute URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The config file is not valid JSON for `Config`.
    #[error("Malformed config file: {0}")]
    Json(#[from] serde_json::Error),

    /// Neither `ERP_HOME` nor a home directory is available.
    #[error("Could not determine home directory; set ERP_HOME")]
    NoHomeDir,

    /// A global tracing subscriber is already installed.
    #[error("Logging already initialized: {0}")]
    Logging(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
