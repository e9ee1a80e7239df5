//! Health check endpoint
//!
//! Simple synchronous responder for monitoring probes; unrelated to the
//! per-connection ping/pong heartbeat.

use axum::{response::IntoResponse, Json};

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
