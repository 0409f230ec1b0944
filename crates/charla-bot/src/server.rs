//! Axum server setup and router construction.
//!
//! Two routes: `POST /aibot` receives Telegram webhook updates and `GET
//! /status` is the healthcheck. The webhook handler acknowledges
//! immediately and hands the update to the worker queue — Telegram retries
//! slow webhooks, and a model turn can take minutes.

use std::net::SocketAddr;

use axum::Router;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, http::StatusCode};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::telegram::Update;

/// Shared state for the webhook handlers.
#[derive(Clone)]
pub struct AppState {
    pub update_tx: mpsc::Sender<Update>,
}

/// Build the webhook router around an update queue.
pub fn build_router(update_tx: mpsc::Sender<Update>) -> Router {
    let state = AppState { update_tx };
    Router::new()
        .route("/aibot", post(post_webhook))
        .route("/status", get(get_status))
        .with_state(state)
}

/// POST /aibot — Telegram webhook endpoint.
///
/// Always answers `{"status": "received"}` so Telegram does not retry;
/// processing happens on the worker.
async fn post_webhook(
    State(app): State<AppState>,
    Json(update): Json<Update>,
) -> (StatusCode, Json<serde_json::Value>) {
    info!("incoming webhook update");
    if let Err(e) = app.update_tx.try_send(update) {
        warn!("update queue full, dropping update: {e}");
    }
    (
        StatusCode::OK,
        Json(serde_json::json!({"status": "received"})),
    )
}

/// GET /status — healthcheck.
async fn get_status() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Start the axum server and return the bound address.
pub async fn start_server(router: Router, bind_addr: SocketAddr) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind(bind_addr).await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    addr
}
