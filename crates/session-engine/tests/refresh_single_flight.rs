//! Integration tests for single-flight token refresh.
//!
//! Concurrent 401s must share one refresh call and all see its outcome.

mod common;

use std::time::Duration;

use common::{api, can_bind_localhost, drain, invalidations, logged_in};
use serde_json::{json, Value};
use session_engine::{SessionError, SessionState};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONCURRENT_REQUESTS: usize = 10;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_401s_share_one_refresh() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(api("/orders/")))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "detail": "Given token not valid for any token type"
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(api("/auth/refresh/")))
        .and(body_json(json!({"refresh": "refresh-1"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": true, "data": {"access": "access-2"}}))
                .set_delay(Duration::from_millis(50)),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(api("/orders/")))
        .and(header("authorization", "Bearer access-2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": [{"id": 1}]})),
        )
        .expect(CONCURRENT_REQUESTS as u64)
        .mount(&server)
        .await;

    let facade = logged_in(&server, "access-1", "refresh-1");

    let handles: Vec<_> = (0..CONCURRENT_REQUESTS)
        .map(|_| {
            let client = facade.client().clone();
            tokio::spawn(async move { client.get::<Vec<Value>>("/orders/").await })
        })
        .collect();

    for handle in handles {
        let orders = handle.await.unwrap().unwrap();
        assert_eq!(orders, vec![json!({"id": 1})]);
    }

    let stored = facade.store().get().unwrap().unwrap();
    assert_eq!(stored.access, "access-2");
    // Server did not rotate, so the refresh token is kept
    assert_eq!(stored.refresh, "refresh-1");
    assert!(matches!(facade.state(), SessionState::Authenticated { .. }));
    assert!(!facade.client().refresher().is_refreshing());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_401s_share_one_failure() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(api("/orders/")))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(api("/auth/refresh/")))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"detail": "Token is blacklisted"}))
                .set_delay(Duration::from_millis(50)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let facade = logged_in(&server, "access-1", "refresh-1");
    let mut events = facade.subscribe();

    let handles: Vec<_> = (0..CONCURRENT_REQUESTS)
        .map(|_| {
            let client = facade.client().clone();
            tokio::spawn(async move { client.get::<Value>("/orders/").await })
        })
        .collect();

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, SessionError::SessionExpired), "got {:?}", err);
    }

    assert_eq!(facade.state(), SessionState::Expired);
    assert_eq!(facade.store().get().unwrap(), None);
    assert_eq!(facade.store().get_user().unwrap(), None);
    assert_eq!(invalidations(&drain(&mut events)), 1);
}

#[tokio::test]
async fn test_rotated_refresh_token_is_stored() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(api("/users/me/")))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(api("/auth/refresh/")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access": "access-2", "refresh": "refresh-2"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(api("/users/me/")))
        .and(header("authorization", "Bearer access-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::user_json(1)))
        .mount(&server)
        .await;

    let facade = logged_in(&server, "access-1", "refresh-1");
    let mut events = facade.subscribe();

    let user = facade.get_current_user().await.unwrap();
    assert_eq!(user.email, "a@b.com");

    let stored = facade.store().get().unwrap().unwrap();
    assert_eq!(stored.access, "access-2");
    assert_eq!(stored.refresh, "refresh-2");

    // Authenticated -> Refreshing -> Authenticated
    let states: Vec<_> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            session_engine::SessionEvent::StateChanged(state) => Some(state.name()),
            _ => None,
        })
        .collect();
    assert_eq!(states, vec!["refreshing", "authenticated"]);
}

#[tokio::test]
async fn test_refresh_timeout_expires_session() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(api("/orders/")))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(api("/auth/refresh/")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access": "late"}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let store = credential_store::memory_store();
    store
        .set(
            &session_engine::TokenPair::new("access-1", "refresh-1"),
            &common::user(1),
        )
        .unwrap();
    let facade = common::facade_with_store(&server, store, Duration::from_millis(200));
    facade.restore_session().unwrap();

    let err = facade.client().get::<Value>("/orders/").await.unwrap_err();
    assert!(matches!(err, SessionError::SessionExpired));
    assert_eq!(facade.state(), SessionState::Expired);
    assert!(!facade.store().has_token().unwrap());
}

#[tokio::test]
async fn test_logout_during_refresh_does_not_resurrect_session() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(api("/orders/")))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(api("/auth/refresh/")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access": "access-2", "refresh": "refresh-2"}))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(api("/auth/logout/")))
        .respond_with(ResponseTemplate::new(205))
        .mount(&server)
        .await;

    let facade = logged_in(&server, "access-1", "refresh-1");
    let client = facade.client().clone();
    let pending = tokio::spawn(async move { client.get::<Value>("/orders/").await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    facade.logout().await.unwrap();

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, SessionError::SessionExpired));
    assert_eq!(facade.store().get().unwrap(), None);
    assert_eq!(facade.state(), SessionState::Anonymous);
}
