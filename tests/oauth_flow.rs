//! End-to-end sign-in tests against an in-process identity provider
//!
//! Covers:
//! - CSRF mismatch fails before any exchange and creates no session
//! - Successful exchange establishes a session
//! - Replayed and expired state values are rejected
//! - Provider errors surface as exchange failures

mod common;

use std::sync::Arc;
use std::time::Duration;

use asha_core::error::AuthError;
use asha_core::oauth::CallbackParams;
use asha_core::storage::MemoryStore;

use common::{
    GOOD_CODE, ScriptedBackend, callback, config_for, memory_service, service, sign_in, spawn,
    spawn_identity_provider,
};

/// Wrong state is a CSRF mismatch and leaves no session behind
#[tokio::test]
async fn test_wrong_state_is_rejected_without_session() {
    let service = memory_service(ScriptedBackend::new(vec![])).await;
    let (_, _issued) = service.authorization_url(None);

    let err = service
        .login(callback("abc", "wrong"), None)
        .await
        .unwrap_err();

    assert_eq!(err, AuthError::CsrfMismatch);
    assert_eq!(service.live_sessions(), 0);
}

/// A valid state and code produce a session for the provider's identity
#[tokio::test]
async fn test_successful_login_establishes_session() {
    let service = memory_service(ScriptedBackend::new(vec![])).await;

    let outcome = sign_in(&service).await;

    assert_eq!(outcome.identity.subject_email(), "meera@example.org");
    assert_eq!(outcome.identity.display_name(), "Meera Iyer");
    assert!(outcome.identity.avatar_ref().is_some());
    assert_eq!(outcome.active_thread_id, None);
    assert_eq!(service.live_sessions(), 1);

    let session = service.session(&outcome.session_id).unwrap();
    assert_eq!(session.subject(), "meera@example.org");
}

/// The same state value can never complete two sign-ins
#[tokio::test]
async fn test_state_is_single_use() {
    let service = memory_service(ScriptedBackend::new(vec![])).await;
    let (_, state) = service.authorization_url(None);

    service
        .login(callback(GOOD_CODE, &state.value), None)
        .await
        .unwrap();
    let replay = service
        .login(callback(GOOD_CODE, &state.value), None)
        .await
        .unwrap_err();

    assert_eq!(replay, AuthError::CsrfMismatch);
    assert_eq!(service.live_sessions(), 1);
}

/// A state older than the TTL is rejected as expired
#[tokio::test]
async fn test_expired_state_is_rejected() {
    let idp = spawn_identity_provider("meera@example.org").await;
    let mut config = config_for(idp);
    config.state.ttl = Duration::from_millis(20);
    let service = service(
        &config,
        Arc::new(MemoryStore::new()),
        ScriptedBackend::new(vec![]),
    );

    let (_, state) = service.authorization_url(None);
    tokio::time::sleep(Duration::from_millis(60)).await;

    let err = service
        .login(callback(GOOD_CODE, &state.value), None)
        .await
        .unwrap_err();
    assert_eq!(err, AuthError::Expired);
    assert_eq!(service.live_sessions(), 0);
}

/// A code the provider refuses is an exchange failure
#[tokio::test]
async fn test_rejected_code_is_exchange_failure() {
    let service = memory_service(ScriptedBackend::new(vec![])).await;
    let (_, state) = service.authorization_url(None);

    let err = service
        .login(callback("stolen-code", &state.value), None)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::ExchangeFailed(ref detail) if detail.contains("400")));
    assert_eq!(service.live_sessions(), 0);
}

/// An `error` callback fails the attempt and burns its state
#[tokio::test]
async fn test_provider_error_consumes_state() {
    let service = memory_service(ScriptedBackend::new(vec![])).await;
    let (_, state) = service.authorization_url(None);

    let denied = CallbackParams {
        state: Some(state.value.clone()),
        error: Some("access_denied".to_string()),
        error_description: Some("User cancelled".to_string()),
        ..CallbackParams::default()
    };
    let err = service.login(denied, None).await.unwrap_err();
    assert!(matches!(err, AuthError::ExchangeFailed(_)));

    let retry = service
        .login(callback(GOOD_CODE, &state.value), None)
        .await
        .unwrap_err();
    assert_eq!(retry, AuthError::CsrfMismatch);
}

/// A refused connection to the provider is an exchange failure
#[tokio::test]
async fn test_unreachable_provider_is_exchange_failure() {
    let mut config = asha_core::config::Config::default();
    config.oauth.token_endpoint = "http://127.0.0.1:9/token".to_string();
    config.oauth.exchange_timeout = Duration::from_secs(2);
    let service = service(
        &config,
        Arc::new(MemoryStore::new()),
        ScriptedBackend::new(vec![]),
    );
    let (_, state) = service.authorization_url(None);

    let err = service
        .login(callback(GOOD_CODE, &state.value), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ExchangeFailed(_)));
    assert_eq!(service.live_sessions(), 0);
}

/// A provider that stops answering is cut off at the exchange timeout
#[tokio::test]
async fn test_stalled_provider_times_out_without_session() {
    let stalled = spawn(axum::Router::new().route(
        "/token",
        axum::routing::post(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            "{}"
        }),
    ))
    .await;

    let mut config = config_for(stalled);
    config.oauth.exchange_timeout = Duration::from_millis(200);
    let service = service(
        &config,
        Arc::new(MemoryStore::new()),
        ScriptedBackend::new(vec![]),
    );
    let (_, state) = service.authorization_url(None);

    let started = std::time::Instant::now();
    let err = service
        .login(callback(GOOD_CODE, &state.value), None)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        AuthError::ExchangeFailed("identity provider timed out".to_string())
    );
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(service.live_sessions(), 0);
}

/// Concurrent sign-ins with distinct states all succeed
#[tokio::test]
async fn test_concurrent_logins_are_independent() {
    let service = Arc::new(memory_service(ScriptedBackend::new(vec![])).await);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { sign_in(&service).await.session_id })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert_eq!(service.live_sessions(), 8);
}
