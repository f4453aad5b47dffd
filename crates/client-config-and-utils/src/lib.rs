//! Core types, configuration, and utilities for the ERP session client.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_API_BASE_URL, DEFAULT_LOG_LEVEL, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_STORAGE_NAMESPACE,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_with, parse_level, LogFormat};
pub use paths::{Paths, HOME_ENV_VAR};
