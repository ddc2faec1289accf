//! Shared fixtures: in-process fake identity provider, fake generative
//! backends, and a ready-to-use service.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Form, Json, Router,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use tokio::net::TcpListener;

use asha_core::config::Config;
use asha_core::dispatch::{GenerativeBackend, Prompt};
use asha_core::error::{DispatchError, StoreError};
use asha_core::oauth::CallbackParams;
use asha_core::service::{ChatService, LoginOutcome};
use asha_core::storage::{MemoryStore, Persistence};

/// Authorization code the fake provider accepts
pub const GOOD_CODE: &str = "good-code";

/// Access token the fake provider issues
const ACCESS_TOKEN: &str = "fake-access-token";

/// Serve `app` on an ephemeral local port
pub async fn spawn(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Fake identity provider with token and user-info endpoints
pub async fn spawn_identity_provider(email: &'static str) -> SocketAddr {
    async fn token(Form(form): Form<HashMap<String, String>>) -> impl IntoResponse {
        if form.get("grant_type").map(String::as_str) == Some("authorization_code")
            && form.get("code").map(String::as_str) == Some(GOOD_CODE)
        {
            (
                StatusCode::OK,
                Json(json!({ "access_token": ACCESS_TOKEN, "token_type": "Bearer" })),
            )
        } else {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid_grant" })),
            )
        }
    }

    let userinfo = move |headers: HeaderMap| async move {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            == Some(&format!("Bearer {ACCESS_TOKEN}")[..]);
        if authorized {
            (
                StatusCode::OK,
                Json(json!({
                    "email": email,
                    "name": "Meera Iyer",
                    "picture": "https://example.org/meera.png"
                })),
            )
        } else {
            (StatusCode::UNAUTHORIZED, Json(json!({})))
        }
    };

    spawn(
        Router::new()
            .route("/token", post(token))
            .route("/userinfo", get(userinfo)),
    )
    .await
}

/// Configuration pointing the OAuth client at a fake provider
pub fn config_for(idp: SocketAddr) -> Config {
    let mut config = Config::default();
    config.oauth.client_id = "client-123".to_string();
    config.oauth.client_secret = "secret".to_string();
    config.oauth.token_endpoint = format!("http://{idp}/token");
    config.oauth.userinfo_endpoint = format!("http://{idp}/userinfo");
    config.oauth.exchange_timeout = Duration::from_secs(5);
    config.dispatch.retry.initial_backoff = Duration::from_millis(1);
    config.dispatch.retry.max_backoff = Duration::from_millis(5);
    config
}

/// Backend that replays a script and records every prompt
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<Vec<Result<String, DispatchError>>>,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Result<String, DispatchError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, DispatchError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            Ok("Happy to help with your career!".to_string())
        } else {
            script.remove(0)
        }
    }
}

/// Backend that never answers
pub struct StalledBackend;

#[async_trait]
impl GenerativeBackend for StalledBackend {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn generate(&self, _prompt: &Prompt) -> Result<String, DispatchError> {
        std::future::pending().await
    }
}

/// Persistence whose writes always fail
#[derive(Default)]
pub struct FailingStore {
    pub attempts: AtomicUsize,
}

impl Persistence for FailingStore {
    fn load(&self, _subject: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(None)
    }

    fn save(&self, _subject: &str, _blob: &[u8]) -> Result<(), StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::PersistFailed("disk full".to_string()))
    }
}

/// Service wired to a fake provider and the given collaborators
pub fn service(
    config: &Config,
    persistence: Arc<dyn Persistence>,
    backend: Arc<dyn GenerativeBackend>,
) -> ChatService {
    ChatService::new(config, reqwest::Client::new(), persistence, backend).unwrap()
}

/// Service with in-memory persistence
pub async fn memory_service(backend: Arc<dyn GenerativeBackend>) -> ChatService {
    let idp = spawn_identity_provider("meera@example.org").await;
    service(&config_for(idp), Arc::new(MemoryStore::new()), backend)
}

/// Run the whole sign-in flow and return the new session
pub async fn sign_in(service: &ChatService) -> LoginOutcome {
    sign_in_from(service, None).await
}

/// Sign in from a specific browser visit
pub async fn sign_in_from(service: &ChatService, visit: Option<&str>) -> LoginOutcome {
    let (_, state) = service.authorization_url(visit);
    service
        .login(callback(GOOD_CODE, &state.value), visit.map(str::to_string))
        .await
        .unwrap()
}

/// Callback parameters as the provider would send them
pub fn callback(code: &str, state: &str) -> CallbackParams {
    CallbackParams {
        code: Some(code.to_string()),
        state: Some(state.to_string()),
        ..CallbackParams::default()
    }
}
