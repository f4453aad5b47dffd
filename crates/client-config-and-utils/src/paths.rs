//! Locations of the client's config, credentials and logs.

use crate::{CoreError, CoreResult};
use std::path::{Path, PathBuf};

/// Overrides the base directory, mainly for tests and multiple profiles.
pub const HOME_ENV_VAR: &str = "ERP_HOME";

const BASE_DIR_NAME: &str = ".erp";
const CONFIG_FILE_NAME: &str = "config.json";
const CREDENTIALS_FILE_NAME: &str = "credentials.json";
const LOGS_DIR_NAME: &str = "logs";
const LOG_FILE_NAME: &str = "client.jsonl";

/// Layout of the client's files under one base directory.
///
/// ```text
/// <base>/config.json
/// <base>/credentials.json
/// <base>/logs/client.jsonl
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    base_dir: PathBuf,
}

impl Paths {
    /// `$ERP_HOME` if set, otherwise `~/.erp`.
    pub fn new() -> CoreResult<Self> {
        Self::resolve(|name| std::env::var(name).ok(), dirs::home_dir())
    }

    /// Resolve the base directory from an env lookup and a home directory.
    pub fn resolve<F>(lookup: F, home: Option<PathBuf>) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(HOME_ENV_VAR).filter(|v| !v.trim().is_empty()) {
            return Ok(Self::with_base_dir(PathBuf::from(dir.trim())));
        }
        home.map(|home| Self::with_base_dir(home.join(BASE_DIR_NAME)))
            .ok_or(CoreError::NoHomeDir)
    }

    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join(CONFIG_FILE_NAME)
    }

    /// Where the file-backed credential store persists the session.
    pub fn credentials_file(&self) -> PathBuf {
        self.base_dir.join(CREDENTIALS_FILE_NAME)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join(LOGS_DIR_NAME)
    }

    /// JSON-lines log written when `ERP_LOG_FORMAT=json`.
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join(LOG_FILE_NAME)
    }

    /// Create the base and logs directories. Safe to call repeatedly.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
