//! HTTP router and handlers

use std::sync::Arc;
use std::time::Duration;

use axum::{
    BoxError, Json, Router,
    error_handling::HandleErrorLayer,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{debug, warn};

use crate::Error;
use crate::conversation::ThreadId;
use crate::error::{AuthError, StoreError};
use crate::oauth::CallbackParams;
use crate::service::{ChatService, PERSIST_WARNING, ProfileUpdate};

/// Header carrying the UI's browser-visit id
pub const VISIT_HEADER: &str = "x-visit-id";

/// Shared application state
pub struct AppState {
    /// The session core
    pub service: Arc<ChatService>,
}

/// Create the router
pub fn create_router(state: Arc<AppState>, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/auth/login", get(login_handler))
        .route("/oauth/callback", get(callback_handler))
        .route("/sessions/{sid}", axum::routing::delete(logout_handler))
        .route(
            "/sessions/{sid}/threads",
            get(threads_handler).post(create_thread_handler),
        )
        .route(
            "/sessions/{sid}/threads/{tid}/activate",
            post(switch_thread_handler),
        )
        .route(
            "/sessions/{sid}/messages",
            post(submit_handler).delete(clear_handler),
        )
        .route("/sessions/{sid}/profile", axum::routing::put(profile_handler))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout))
                .layer(tower::timeout::TimeoutLayer::new(request_timeout)),
        )
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error response: `{"error": kind, "message": text}`
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self(Error::Auth(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            Error::Auth(AuthError::CsrfMismatch) => (StatusCode::UNAUTHORIZED, "csrf_mismatch"),
            Error::Auth(AuthError::Expired) => (StatusCode::UNAUTHORIZED, "state_expired"),
            Error::Auth(AuthError::ExchangeFailed(_)) => (StatusCode::BAD_GATEWAY, "exchange_failed"),
            Error::SessionNotFound(_) => (StatusCode::UNAUTHORIZED, "session_not_found"),
            Error::Store(StoreError::NotFound(_)) => (StatusCode::NOT_FOUND, "thread_not_found"),
            Error::Store(StoreError::PersistFailed(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "persist_failed")
            }
            Error::Dispatch(e) => (StatusCode::BAD_GATEWAY, e.kind()),
            Error::Config(_) | Error::Io(_) | Error::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };

        if status.is_server_error() {
            warn!(error = %self.0, "Request failed");
        } else {
            debug!(error = %self.0, "Request rejected");
        }

        let message = match &self.0 {
            Error::Store(StoreError::PersistFailed(_)) => PERSIST_WARNING.to_string(),
            Error::Config(_) | Error::Io(_) | Error::Internal(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": kind, "message": message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

async fn handle_timeout(err: BoxError) -> (StatusCode, Json<serde_json::Value>) {
    if err.is::<tower::timeout::error::Elapsed>() {
        (
            StatusCode::GATEWAY_TIMEOUT,
            Json(json!({ "error": "timeout", "message": "Request timed out" })),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "internal", "message": err.to_string() })),
        )
    }
}

fn visit_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(VISIT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let backend = state.service.backend_health();
    let healthy = backend.healthy;

    let response = json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "live_sessions": state.service.live_sessions(),
        "backend": backend,
    });

    if healthy {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// GET /auth/login - authorization URL with a fresh state
async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let visit = visit_id(&headers);
    let (url, token) = state.service.authorization_url(visit.as_deref());
    Json(json!({
        "authorization_url": url.as_str(),
        "issued_at": token.issued_at,
    }))
}

/// GET /oauth/callback - provider redirect target
async fn callback_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state.service.login(params, visit_id(&headers)).await?;
    Ok(Json(outcome))
}

/// DELETE /sessions/{sid} - sign out
async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let teardown = state.service.logout(&sid).await?;
    Ok(Json(json!({
        "purged_states": teardown.purged_states,
        "warning": teardown.persist_error.map(|_| PERSIST_WARNING),
    })))
}

/// GET /sessions/{sid}/threads
async fn threads_handler(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.threads(&sid).await?))
}

/// POST /sessions/{sid}/threads - start a new thread
async fn create_thread_handler(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let change = state.service.create_thread(&sid).await?;
    Ok((StatusCode::CREATED, Json(change)))
}

/// POST /sessions/{sid}/threads/{tid}/activate
async fn switch_thread_handler(
    State(state): State<Arc<AppState>>,
    Path((sid, tid)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let change = state
        .service
        .switch_thread(&sid, &ThreadId::from(tid))
        .await?;
    Ok(Json(change))
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    text: String,
}

/// POST /sessions/{sid}/messages - moderate, store and answer
async fn submit_handler(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<String>,
    Json(request): Json<SubmitRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.submit(&sid, &request.text).await?))
}

/// DELETE /sessions/{sid}/messages - clear the active thread
async fn clear_handler(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.clear_active(&sid).await?))
}

/// PUT /sessions/{sid}/profile
async fn profile_handler(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<String>,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.update_profile(&sid, update).await?))
}
