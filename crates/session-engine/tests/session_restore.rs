//! Integration tests for restoring a stored session at startup.

mod common;

use std::time::Duration;

use common::{
    api, can_bind_localhost, drain, facade, facade_with_store, invalidations,
    store_without_refresh_token, user_json,
};
use serde_json::json;
use session_engine::{AuthFacade, SessionError, SessionState, TokenPair};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_no_stored_token_is_anonymous() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let facade = facade(&server);
    assert_eq!(facade.restore_session().unwrap(), SessionState::Anonymous);
    assert_eq!(facade.validate_session().await.unwrap(), SessionState::Anonymous);
    assert!(!facade.is_authenticated());
}

#[tokio::test]
async fn test_stored_token_without_refresh_token_expires() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(api("/users/me/")))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(api("/auth/refresh/")))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let facade = facade_with_store(
        &server,
        store_without_refresh_token("stale"),
        Duration::from_secs(5),
    );
    let mut events = facade.subscribe();

    // Optimistic until the server says otherwise
    let state = facade.restore_session().unwrap();
    assert!(matches!(state, SessionState::Authenticated { .. }));

    assert_eq!(facade.validate_session().await.unwrap(), SessionState::Expired);
    assert!(!facade.store().has_token().unwrap());
    assert_eq!(facade.get_stored_user().unwrap(), None);
    assert_eq!(invalidations(&drain(&mut events)), 1);

    assert_eq!(facade.acknowledge_expired().unwrap(), SessionState::Anonymous);
}

#[tokio::test]
async fn test_validation_refreshes_cached_user() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;

    let mut fresh = user_json(1);
    fresh["first_name"] = json!("Grace");
    fresh["phone"] = json!("+15550100");

    Mock::given(method("GET"))
        .and(path(api("/users/me/")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": fresh})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let facade = common::logged_in(&server, "access-1", "refresh-1");
    let handle = facade.spawn_restore().unwrap();
    let state = handle.await.unwrap().unwrap();

    let user = state.user().unwrap();
    assert_eq!(user.first_name.as_deref(), Some("Grace"));

    let cached = facade.get_stored_user().unwrap().unwrap();
    assert_eq!(cached.profile.get("phone"), Some(&json!("+15550100")));
}

#[tokio::test]
async fn test_validation_failure_downgrades_to_anonymous() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(api("/users/me/")))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({"detail": "Account disabled"})),
        )
        .mount(&server)
        .await;

    let facade = common::logged_in(&server, "access-1", "refresh-1");
    let err = facade.validate_session().await.unwrap_err();

    assert!(matches!(err, SessionError::RequestFailed { status: 403, .. }));
    assert_eq!(facade.state(), SessionState::Anonymous);
    assert_eq!(facade.store().get().unwrap(), None);
}

#[tokio::test]
async fn test_update_current_user() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;

    let mut updated = user_json(1);
    updated["last_name"] = json!("Byron");

    Mock::given(method("PATCH"))
        .and(path(api("/users/me/")))
        .and(body_json(json!({"last_name": "Byron"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(updated))
        .expect(1)
        .mount(&server)
        .await;

    let facade = common::logged_in(&server, "access-1", "refresh-1");
    let user = facade
        .update_current_user(&json!({"last_name": "Byron"}))
        .await
        .unwrap();

    assert_eq!(user.display_name(), "Ada Byron");
    assert_eq!(
        facade.get_stored_user().unwrap().unwrap().last_name.as_deref(),
        Some("Byron")
    );
    assert_eq!(facade.state().user(), Some(&user));
}

#[tokio::test]
async fn test_file_store_session_survives_restart() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    let options = common::options(&server, Duration::from_secs(5));

    {
        let store = credential_store::open_file_store(&path, "erp").unwrap();
        store
            .set(&TokenPair::new("access-1", "refresh-1"), &common::user(1))
            .unwrap();
    }

    let store = credential_store::open_file_store(&path, "erp").unwrap();
    let facade = AuthFacade::new(std::sync::Arc::new(store), &options).unwrap();
    let state = facade.restore_session().unwrap();
    assert_eq!(state.user().map(|u| u.email.as_str()), Some("a@b.com"));
    assert!(facade.is_authenticated());
}
