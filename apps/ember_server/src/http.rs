//! HTTP surface: the read-only catalog endpoints, liveness, the WebSocket
//! upgrade, and the static frontend with SPA fallback.

use std::path::Path;

use axum::{Json, Router, routing::get};
use serde_json::{Value, json};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use embercore::avatar::{self, Avatar};
use embercore::scale::{self, Scale};

use crate::AppState;
use crate::ws;

pub fn router(state: AppState, static_dir: &Path) -> Router {
    // Unknown paths fall back to index.html for client-side routing.
    let assets =
        ServeDir::new(static_dir).not_found_service(ServeFile::new(static_dir.join("index.html")));

    Router::new()
        .route("/api/scales", get(handle_scales))
        .route("/api/avatars", get(handle_avatars))
        .route("/api/health", get(handle_health))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .fallback_service(assets)
        .layer(TraceLayer::new_for_http())
}

async fn handle_scales() -> Json<&'static [Scale]> {
    Json(scale::all())
}

async fn handle_avatars() -> Json<&'static [Avatar]> {
    Json(avatar::all())
}

async fn handle_health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
