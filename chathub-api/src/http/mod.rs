// Module: http
// WebSocket upgrade endpoint, health probe, and HTTP error mapping

pub mod error;
pub mod health;
pub mod websocket;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use chathub_core::auth::JwtService;
use chathub_fanout::{MessagePublisher, RoomHub};

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<RoomHub>,
    pub publisher: Arc<MessagePublisher>,
    pub jwt_service: JwtService,
}

/// Create the HTTP router with all routes
pub fn create_router(
    hub: Arc<RoomHub>,
    publisher: Arc<MessagePublisher>,
    jwt_service: JwtService,
) -> Router {
    let state = AppState {
        hub,
        publisher,
        jwt_service,
    };

    Router::new()
        .route("/ws/{room_id}", get(websocket::websocket_handler))
        .route("/health", get(health::health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
