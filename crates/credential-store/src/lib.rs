//! Credential storage for the ERP session client.
//!
//! This crate is pure storage: it persists the access token, refresh token,
//! and cached user profile, and knows nothing about HTTP or session policy.
//!
//! Backends:
//! - [`MemoryStore`]: in-process map
//! - [`FileStore`]: single JSON document, replaced atomically on every write

mod credentials;
mod file;
mod keys;
mod memory;
mod traits;

pub use credentials::{CredentialStore, SessionUser, TokenPair, UserId, UserRole};
pub use file::FileStore;
pub use keys::StorageKeys;
pub use memory::MemoryStore;
pub use traits::KeyValueStore;

use std::path::Path;
use thiserror::Error;

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "erp";

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// A stored value or the backing document could not be (de)serialized.
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Open a file-backed credential store under the given namespace.
pub fn open_file_store(path: &Path, namespace: &str) -> StorageResult<CredentialStore> {
    let backend = FileStore::open(path)?;
    Ok(CredentialStore::with_keys(
        Box::new(backend),
        StorageKeys::new(namespace),
    ))
}

/// Create an in-memory credential store with the default namespace.
pub fn memory_store() -> CredentialStore {
    CredentialStore::new(Box::new(MemoryStore::new()))
}
