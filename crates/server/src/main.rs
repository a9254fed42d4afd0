use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use server_api::{ApiContext, AuthConfig};
use shared::{
    domain::{Rfq, RfqId, UserId},
    error::{ApiError, ErrorCode},
    protocol::{
        AuthResponse, AuthStatus, CreateRfqRequest, Credentials, LogoutResponse, RfqAnalytics,
        RfqList, UpdateRfqRequest, UserProfile,
    },
};
use storage::Storage;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;

use app_state::AppState;
use config::{load_settings, Settings};

type ApiFailure = (StatusCode, Json<ApiError>);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserQuery {
    /// Absent is reported by the service layer as a validation error.
    #[serde(default)]
    user_id: String,
}

impl UserQuery {
    fn user_id(&self) -> UserId {
        UserId(self.user_id.clone())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let state = app_state_from_settings(&settings);
    let app = build_router(Arc::new(state), settings.max_body_bytes);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "mock rfq backend listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested; in-memory rfqs will be discarded");
    }
}

fn app_state_from_settings(settings: &Settings) -> AppState {
    AppState {
        api: ApiContext {
            storage: Storage::new(),
            auth: AuthConfig {
                token_secret: settings.token_secret.clone(),
                ttl_seconds: settings.token_ttl_seconds,
            },
        },
    }
}

fn build_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/auth/login", post(http_login))
        .route("/api/auth/register", post(http_register))
        .route("/api/auth/me", get(http_me))
        .route("/api/auth/status", get(http_auth_status))
        .route("/api/auth/logout", post(http_logout))
        .route("/api/rfqs", get(http_list_rfqs).post(http_create_rfq))
        .route("/api/rfqs/analytics", get(http_rfq_analytics))
        .route(
            "/api/rfqs/:rfq_id",
            get(http_get_rfq).put(http_update_rfq).delete(http_delete_rfq),
        )
        .route(
            "/api/rfqs/:rfq_id/steps/:step/complete",
            post(http_complete_step),
        )
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn failure(error: ApiError) -> ApiFailure {
    let status = match error.code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(error))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn http_login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<Credentials>,
) -> Result<Json<AuthResponse>, ApiFailure> {
    server_api::login(&state.api, &req).map(Json).map_err(failure)
}

async fn http_register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<Credentials>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiFailure> {
    let response = server_api::register(&state.api, &req).map_err(failure)?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn http_me(headers: HeaderMap) -> Result<Json<UserProfile>, ApiFailure> {
    server_api::current_user(bearer_token(&headers))
        .map(Json)
        .map_err(failure)
}

async fn http_auth_status(headers: HeaderMap) -> Json<AuthStatus> {
    Json(server_api::auth_status(bearer_token(&headers)))
}

async fn http_logout() -> Json<LogoutResponse> {
    Json(server_api::logout())
}

async fn http_create_rfq(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRfqRequest>,
) -> Result<(StatusCode, Json<Rfq>), ApiFailure> {
    let rfq = server_api::create_rfq(&state.api, req)
        .await
        .map_err(failure)?;
    Ok((StatusCode::CREATED, Json(rfq)))
}

async fn http_list_rfqs(
    State(state): State<Arc<AppState>>,
    Query(q): Query<UserQuery>,
) -> Result<Json<RfqList>, ApiFailure> {
    server_api::list_rfqs(&state.api, &q.user_id())
        .await
        .map(Json)
        .map_err(failure)
}

async fn http_get_rfq(
    State(state): State<Arc<AppState>>,
    Path(rfq_id): Path<RfqId>,
    Query(q): Query<UserQuery>,
) -> Result<Json<Rfq>, ApiFailure> {
    server_api::get_rfq(&state.api, &q.user_id(), rfq_id)
        .await
        .map(Json)
        .map_err(failure)
}

async fn http_update_rfq(
    State(state): State<Arc<AppState>>,
    Path(rfq_id): Path<RfqId>,
    Query(q): Query<UserQuery>,
    Json(req): Json<UpdateRfqRequest>,
) -> Result<Json<Rfq>, ApiFailure> {
    server_api::update_rfq(&state.api, &q.user_id(), rfq_id, req)
        .await
        .map(Json)
        .map_err(failure)
}

async fn http_delete_rfq(
    State(state): State<Arc<AppState>>,
    Path(rfq_id): Path<RfqId>,
    Query(q): Query<UserQuery>,
) -> Result<StatusCode, ApiFailure> {
    server_api::delete_rfq(&state.api, &q.user_id(), rfq_id)
        .await
        .map_err(failure)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_complete_step(
    State(state): State<Arc<AppState>>,
    Path((rfq_id, step)): Path<(RfqId, u8)>,
    Query(q): Query<UserQuery>,
) -> Result<Json<Rfq>, ApiFailure> {
    server_api::mark_step_complete(&state.api, &q.user_id(), rfq_id, step)
        .await
        .map(Json)
        .map_err(failure)
}

async fn http_rfq_analytics(
    State(state): State<Arc<AppState>>,
    Query(q): Query<UserQuery>,
) -> Result<Json<RfqAnalytics>, ApiFailure> {
    server_api::rfq_analytics(&state.api, &q.user_id())
        .await
        .map(Json)
        .map_err(failure)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
