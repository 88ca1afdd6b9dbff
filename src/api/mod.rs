//! HTTP/WebSocket surface.

pub mod routes;
pub mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::config::Config;
use crate::fx::FxResolver;
use crate::hub::BroadcastHub;

/// Shared application state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub hub: Arc<BroadcastHub>,
    pub fx: Arc<FxResolver>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/api/opportunities", get(routes::list_opportunities))
        .route("/api/signals/tether-bot", get(routes::tether_bot_signals))
        .route("/api/monitor/spreads", get(routes::monitor_spreads))
        .route("/api/ws/opportunities", get(ws::opportunities_ws))
        .route("/api/ws", get(ws::opportunities_ws))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
