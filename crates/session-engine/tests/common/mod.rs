//! Shared fixtures for session engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use credential_store::{memory_store, KeyValueStore, MemoryStore, StorageKeys};
use serde_json::{json, Value};
use session_engine::{
    AuthFacade, ClientOptions, CredentialStore, SessionEvent, SessionUser, TokenPair,
};
use tokio::sync::broadcast;
use wiremock::MockServer;

pub const API_PREFIX: &str = "/api/v1";

/// Path on the mock server for an API path.
pub fn api(path: &str) -> String {
    format!("{}{}", API_PREFIX, path)
}

pub fn options(server: &MockServer, timeout: Duration) -> ClientOptions {
    ClientOptions::new(&format!("{}{}", server.uri(), API_PREFIX), timeout)
        .expect("valid mock server url")
}

pub fn facade_with_store(
    server: &MockServer,
    store: CredentialStore,
    timeout: Duration,
) -> AuthFacade {
    AuthFacade::new(Arc::new(store), &options(server, timeout)).expect("build facade")
}

pub fn facade(server: &MockServer) -> AuthFacade {
    facade_with_store(server, memory_store(), Duration::from_secs(5))
}

pub fn user_json(id: i64) -> Value {
    json!({
        "id": id,
        "email": "a@b.com",
        "role": "staff",
        "first_name": "Ada",
        "last_name": "Lovelace"
    })
}

pub fn user(id: i64) -> SessionUser {
    serde_json::from_value(user_json(id)).expect("valid user")
}

/// Facade whose store already holds a session with the given tokens.
pub fn logged_in(server: &MockServer, access: &str, refresh: &str) -> AuthFacade {
    let facade = facade(server);
    facade
        .store()
        .set(&TokenPair::new(access, refresh), &user(1))
        .expect("seed store");
    facade.restore_session().expect("restore");
    facade
}

/// Store holding an access token and cached user but no refresh token.
pub fn store_without_refresh_token(access: &str) -> CredentialStore {
    let keys = StorageKeys::default();
    let backend = MemoryStore::new();
    backend.set(keys.access_token(), access).expect("seed access");
    backend
        .set(keys.user(), &user_json(1).to_string())
        .expect("seed user");
    CredentialStore::new(Box::new(backend))
}

pub fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn invalidations(events: &[SessionEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, SessionEvent::SessionInvalidated))
        .count()
}

pub fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}
