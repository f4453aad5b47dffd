//! Typed credential storage on top of a [`KeyValueStore`].

use crate::{KeyValueStore, StorageError, StorageKeys, StorageResult};
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::{debug, warn};

/// Access and refresh token issued together by the auth endpoints.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

impl TokenPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

/// Server-side user identifier. The API has used both numeric and string ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Number(i64),
    Text(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Number(id) => write!(f, "{}", id),
            UserId::Text(id) => f.write_str(id),
        }
    }
}

/// Role attached to a user account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    SuperAdmin,
    Admin,
    Staff,
    Vendor,
    Customer,
    DeliveryAgent,
    Warehouse,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Missing, `null` and unrecognized roles all read as `Unknown`.
fn role_or_unknown<'de, D>(deserializer: D) -> Result<UserRole, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<UserRole>::deserialize(deserializer)?.unwrap_or_default())
}

/// Cached profile of the logged-in user.
///
/// Fields the client does not interpret are kept in `profile` so writing the
/// user back to storage does not drop them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: UserId,
    pub email: String,
    #[serde(default, deserialize_with = "role_or_unknown")]
    pub role: UserRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}

impl SessionUser {
    /// "First Last", falling back to the email when no name is set.
    pub fn display_name(&self) -> String {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if name.is_empty() {
            self.email.clone()
        } else {
            name
        }
    }
}

/// Sole owner of the persisted token pair and cached user.
///
/// Every compound read and write goes through one reader/writer lock, so a
/// reader never observes an access token without its refresh token.
pub struct CredentialStore {
    storage: Box<dyn KeyValueStore>,
    keys: StorageKeys,
    lock: RwLock<()>,
}

impl CredentialStore {
    /// Create a credential store with the default key namespace.
    pub fn new(storage: Box<dyn KeyValueStore>) -> Self {
        Self::with_keys(storage, StorageKeys::default())
    }

    /// Create a credential store with explicit keys.
    pub fn with_keys(storage: Box<dyn KeyValueStore>, keys: StorageKeys) -> Self {
        Self {
            storage,
            keys,
            lock: RwLock::new(()),
        }
    }

    /// Current token pair. Returns `None` when either half is missing.
    pub fn get(&self) -> StorageResult<Option<TokenPair>> {
        let _guard = self.lock.read();
        let access = self.storage.get(self.keys.access_token())?;
        let refresh = self.storage.get(self.keys.refresh_token())?;

        match (access, refresh) {
            (Some(access), Some(refresh)) => Ok(Some(TokenPair { access, refresh })),
            (None, None) => Ok(None),
            (access, refresh) => {
                warn!(
                    has_access = access.is_some(),
                    has_refresh = refresh.is_some(),
                    "Stored token pair is incomplete"
                );
                Ok(None)
            }
        }
    }

    /// Replace tokens and cached user in one write.
    pub fn set(&self, pair: &TokenPair, user: &SessionUser) -> StorageResult<()> {
        let user_json = encode_user(user)?;
        let _guard = self.lock.write();
        self.storage.set_many(&[
            (self.keys.access_token(), &pair.access),
            (self.keys.refresh_token(), &pair.refresh),
            (self.keys.user(), &user_json),
        ])?;
        debug!(user_id = %user.id, "Stored session credentials");
        Ok(())
    }

    /// Replace both tokens, leaving the cached user untouched.
    pub fn set_tokens(&self, pair: &TokenPair) -> StorageResult<()> {
        let _guard = self.lock.write();
        self.storage.set_many(&[
            (self.keys.access_token(), &pair.access),
            (self.keys.refresh_token(), &pair.refresh),
        ])
    }

    /// Replace both tokens only while the stored refresh token is still
    /// `expected`. Returns false and writes nothing if the session was
    /// cleared or replaced in the meantime.
    pub fn rotate_tokens(&self, expected: &str, pair: &TokenPair) -> StorageResult<bool> {
        let _guard = self.lock.write();
        if self.storage.get(self.keys.refresh_token())?.as_deref() != Some(expected) {
            return Ok(false);
        }
        self.storage.set_many(&[
            (self.keys.access_token(), &pair.access),
            (self.keys.refresh_token(), &pair.refresh),
        ])?;
        Ok(true)
    }

    /// Replace the cached user, leaving the tokens untouched.
    pub fn set_user(&self, user: &SessionUser) -> StorageResult<()> {
        let user_json = encode_user(user)?;
        let _guard = self.lock.write();
        self.storage.set(self.keys.user(), &user_json)
    }

    /// Remove tokens and user. The access token goes first so it never
    /// outlives the refresh token.
    pub fn clear(&self) -> StorageResult<()> {
        let _guard = self.lock.write();
        self.storage.delete_many(&[
            self.keys.access_token(),
            self.keys.user(),
            self.keys.refresh_token(),
        ])?;
        debug!("Cleared session credentials");
        Ok(())
    }

    /// Cached user profile, if any.
    pub fn get_user(&self) -> StorageResult<Option<SessionUser>> {
        let _guard = self.lock.read();
        match self.storage.get(self.keys.user())? {
            Some(json) => {
                let user = serde_json::from_str(&json)
                    .map_err(|e| StorageError::Encoding(e.to_string()))?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    /// Whether an access token is stored.
    pub fn has_token(&self) -> StorageResult<bool> {
        let _guard = self.lock.read();
        self.storage.has(self.keys.access_token())
    }

    pub fn access_token(&self) -> StorageResult<Option<String>> {
        let _guard = self.lock.read();
        self.storage.get(self.keys.access_token())
    }

    pub fn refresh_token(&self) -> StorageResult<Option<String>> {
        let _guard = self.lock.read();
        self.storage.get(self.keys.refresh_token())
    }
}

fn encode_user(user: &SessionUser) -> StorageResult<String> {
    serde_json::to_string(user).map_err(|e| StorageError::Encoding(e.to_string()))
}
