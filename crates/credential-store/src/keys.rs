//! Storage key names.

/// Keys for the three persisted session values, scoped by a namespace so
/// several environments can share one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    access_token: String,
    refresh_token: String,
    user: String,
}

impl StorageKeys {
    /// Build the key set for a namespace, e.g. `erp` → `erp_access_token`.
    pub fn new(namespace: &str) -> Self {
        Self {
            access_token: format!("{}_access_token", namespace),
            refresh_token: format!("{}_refresh_token", namespace),
            user: format!("{}_user", namespace),
        }
    }

    /// Access token key
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Refresh token key
    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    /// Cached user profile key (JSON)
    pub fn user(&self) -> &str {
        &self.user
    }
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self::new(crate::DEFAULT_NAMESPACE)
    }
}
