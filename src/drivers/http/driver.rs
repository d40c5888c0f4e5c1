use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::info;
use serde::Serialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::app::AppState;
use crate::auth::{extract_token, LoginRequest, LoginResponse, User};
use crate::config::AppConfig;
use crate::drivers::{Driver, Drivers};
use crate::game::{GameError, GameInfo, GameSettings, GameStatus};

/// REST surface the launcher UI polls. All game mutation goes through
/// the state machine; handlers only translate results to HTTP.
pub struct HttpDriver {
    app_state: AppState,
}

impl HttpDriver {
    pub fn new(app_state: AppState) -> Self {
        Self { app_state }
    }
}

#[async_trait::async_trait]
impl Driver for HttpDriver {
    async fn run(&self) {
        let uni_cfg = &AppConfig::get().drivers.http_driver_config.uni_config;
        let addr = SocketAddr::new(uni_cfg.host, uni_cfg.port);

        let app = build_router(self.app_state.clone());
        let listener = TcpListener::bind(addr).await.expect("Failed to bind");
        info!("HTTP server listening on {}", addr);

        let stop_token = self.app_state.stop_notify.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                stop_token.notified().await;
                info!("Shutdown signal received, closing HTTP server...");
            })
            .await
            .unwrap();
    }

    fn get_driver_type(&self) -> Drivers {
        Drivers::Http
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/actuator/health", get(health_handler))
        .route("/api/minecraft/info", get(info_handler))
        .route("/api/minecraft/status", get(status_handler))
        .route(
            "/api/minecraft/settings",
            get(get_settings_handler).put(put_settings_handler),
        )
        .route("/api/minecraft/install", post(install_handler))
        .route("/api/minecraft/launch", post(launch_handler))
        .route("/api/minecraft/stop", post(stop_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/logout", post(logout_handler))
        .route("/api/auth/validate", get(validate_handler))
        .route("/api/auth/me", get(me_handler))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PUT])
                .allow_headers(Any),
        )
}

#[derive(Debug, Serialize)]
struct ApiResult {
    success: bool,
    message: String,
}

impl ApiResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Rejections of a request are conflicts; bad input is bad request;
/// anything else is on us.
fn reject(err: GameError) -> (StatusCode, Json<ApiResult>) {
    let code = match &err {
        GameError::Validation(_) => StatusCode::BAD_REQUEST,
        e if e.is_rejection() => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (code, Json(ApiResult::fail(err.to_string())))
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Option<User> {
    let header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let token = extract_token(header)?;
    state.sessions.validate(token)
}

async fn health_handler() -> Json<Value> {
    let uptime = chrono::Utc::now() - *crate::app::get_start_time();
    Json(json!({ "status": "UP", "uptimeSecs": uptime.num_seconds() }))
}

async fn info_handler(State(state): State<AppState>) -> Json<GameInfo> {
    Json(state.machine.info())
}

async fn status_handler(State(state): State<AppState>) -> Json<GameStatus> {
    Json(state.machine.snapshot())
}

async fn get_settings_handler(State(state): State<AppState>) -> Json<GameSettings> {
    Json(state.settings.get())
}

async fn put_settings_handler(
    State(state): State<AppState>,
    Json(new): Json<GameSettings>,
) -> (StatusCode, Json<ApiResult>) {
    match state.settings.update(new) {
        Ok(()) => (StatusCode::OK, Json(ApiResult::ok("Settings updated"))),
        Err(err) => (StatusCode::BAD_REQUEST, Json(ApiResult::fail(err.to_string()))),
    }
}

async fn install_handler(State(state): State<AppState>) -> (StatusCode, Json<ApiResult>) {
    match state.machine.request_install() {
        Ok(()) => (StatusCode::OK, Json(ApiResult::ok("Installation started"))),
        Err(err) => reject(err),
    }
}

async fn launch_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> (StatusCode, Json<ApiResult>) {
    if authenticate(&state, &headers).is_none() {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ApiResult::fail("Not authenticated")),
        );
    }
    match state.machine.request_launch() {
        Ok(()) => (StatusCode::OK, Json(ApiResult::ok("Game launch initiated"))),
        Err(err) => reject(err),
    }
}

async fn stop_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> (StatusCode, Json<ApiResult>) {
    if authenticate(&state, &headers).is_none() {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ApiResult::fail("Not authenticated")),
        );
    }
    match state.machine.request_stop() {
        Ok(()) => (StatusCode::OK, Json(ApiResult::ok("Game stopped"))),
        Err(err) => reject(err),
    }
}

async fn login_handler(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> (StatusCode, Json<LoginResponse>) {
    let response = state.sessions.login(&request);
    let code = if response.success {
        StatusCode::OK
    } else {
        StatusCode::UNAUTHORIZED
    };
    (code, Json(response))
}

async fn logout_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<ApiResult> {
    let header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let success = extract_token(header)
        .map(|token| state.sessions.logout(token))
        .unwrap_or(false);
    Json(if success {
        ApiResult::ok("Logged out successfully")
    } else {
        ApiResult::fail("No active session")
    })
}

async fn validate_handler(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
    let valid = authenticate(&state, &headers).is_some();
    Json(json!({
        "valid": valid,
        "message": if valid { "Session is valid" } else { "Session is invalid or expired" },
    }))
}

async fn me_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    match authenticate(&state, &headers) {
        Some(user) => (StatusCode::OK, Json(json!({ "success": true, "user": user }))),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "message": "Not authenticated" })),
        ),
    }
}
