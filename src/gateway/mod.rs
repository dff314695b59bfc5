//! HTTP gateway — the token-gated API over the WhatsApp session.
//!
//! ## Flow
//!
//! 1. A request hits one of the four API routes.
//! 2. The [`auth`] middleware checks the bearer credential and answers
//!    403 JSON before any handler logic runs.
//! 3. The handler reads the [`SessionTracker`] or delegates to the
//!    [`MessagingClient`], then answers with the fixed JSON bodies callers
//!    already depend on.
//!
//! ## Design
//!
//! Delegate calls carry no timeout and are never retried; a hung client call
//! hangs that one request and nothing else. That is why there is no timeout
//! layer here even though the rest of the stack is the usual CORS + body
//! limit. The only ungated route is `/health`, which reports liveness and
//! nothing about the session.

pub mod auth;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};

use crate::client::{self, MessagingClient};
use crate::config::Config;
use crate::session::SessionTracker;

use auth::TokenGuard;

/// Maximum accepted request body. Message sends are small; 64 KB is plenty.
const MAX_BODY_SIZE: usize = 65_536;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub client: Arc<dyn MessagingClient>,
    pub session: Arc<SessionTracker>,
    pub guard: Arc<TokenGuard>,
}

/// Concrete return type for the API handlers (avoids `impl IntoResponse`
/// inference issues).
type ApiResponse = (StatusCode, Json<serde_json::Value>);

/// Build the full router. Shared between production startup and tests.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    let api = Router::new()
        .route("/get-qr", get(handle_get_qr))
        .route("/status", get(handle_status))
        .route("/send-message", post(handle_send_message))
        .route("/logout", get(handle_logout))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::require_token,
        ));

    Router::new()
        .route("/health", get(handle_health))
        .merge(api)
        .with_state(state)
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
}

/// Bind the listener and serve until the process is stopped.
pub async fn run_gateway(config: &Config, state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    if is_public_bind(&config.gateway.host) {
        warn!("gateway binding {addr}; every route except /health requires the bearer token");
    }

    let listener = TcpListener::bind(&addr).await?;
    info!("gateway listening on {addr}");

    let display_addr = if config.gateway.host == "0.0.0.0" {
        format!("localhost:{}", config.gateway.port)
    } else {
        addr.clone()
    };
    println!("🦀 wagate listening on http://{display_addr}");
    println!("  GET  /get-qr       — pending login QR as a PNG data URL");
    println!("  GET  /status       — login state");
    println!("  POST /send-message — {{\"number\": \"...\", \"message\": \"...\"}}");
    println!("  GET  /logout       — end the WhatsApp session");
    println!("  All routes above require: Authorization: Bearer <token>");

    let app = build_router(state);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Whether `host` exposes the gateway beyond the local machine.
fn is_public_bind(host: &str) -> bool {
    match host.parse::<std::net::IpAddr>() {
        Ok(ip) => !ip.is_loopback(),
        Err(_) => host != "localhost",
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// AXUM HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// GET /health — always public (no secrets, no session state)
async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /get-qr — the pending QR as an inline PNG data URL, or 400 when there
/// is nothing to scan (not issued yet, or already linked).
async fn handle_get_qr(State(state): State<AppState>) -> ApiResponse {
    let Some(payload) = state.session.qr() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "message": "QR Code tidak tersedia atau sudah login.",
            })),
        );
    };
    match crate::qr::to_data_url(&payload) {
        Ok(data_url) => (
            StatusCode::OK,
            Json(json!({ "success": true, "qr": data_url })),
        ),
        Err(err) => {
            error!("QR rendering failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "message": "Gagal membuat QR code." })),
            )
        }
    }
}

/// GET /status — coarse login state.
async fn handle_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let message = if state.session.is_authenticated() {
        "Bot sudah terhubung"
    } else {
        "Belum login"
    };
    Json(json!({ "success": true, "message": message }))
}

/// Request body for message sends.
#[derive(Debug, Deserialize)]
struct SendMessageBody {
    number: String,
    message: String,
}

/// POST /send-message — deliver one message through the client.
///
/// The send is attempted regardless of login state; an unlinked client
/// reports the failure itself and it comes back as `success: false`.
async fn handle_send_message(
    State(state): State<AppState>,
    body: Result<Json<SendMessageBody>, JsonRejection>,
) -> ApiResponse {
    let Json(body) = match body {
        Ok(body) => body,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "success": false,
                    "message": "Invalid JSON body. Expected: {\"number\": \"...\", \"message\": \"...\"}",
                })),
            );
        }
    };

    let chat_id = client::chat_jid(&body.number);
    match state.client.send_message(&chat_id, &body.message).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": "Pesan terkirim!" })),
        ),
        Err(err) => {
            warn!("sendMessage failed: {err}");
            (
                StatusCode::OK,
                Json(json!({ "success": false, "error": err.to_string() })),
            )
        }
    }
}

/// GET /logout — end the session on the phone side too.
///
/// Only a confirmed logout touches the tracker; a failed delegate call
/// leaves the login state exactly as it was.
async fn handle_logout(State(state): State<AppState>) -> ApiResponse {
    match state.client.logout().await {
        Ok(()) => {
            state.session.force_logged_out();
            info!("logout confirmed; session marked disconnected");
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "message": "Bot berhasil logout. Silakan restart untuk mendapatkan QR baru.",
                })),
            )
        }
        Err(err) => {
            error!("logout failed: {err}");
            (
                StatusCode::OK,
                Json(json!({
                    "success": false,
                    "message": "Gagal logout.",
                    "error": err.to_string(),
                })),
            )
        }
    }
}
