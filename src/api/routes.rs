//! Route Definitions
//!
//! Maps URLs to handlers with type-safe routing.

use super::{handlers::*, websocket::crash_websocket_handler};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        // Crash round
        .route("/api/game-state", get(game_state_handler))
        .route("/ws/crash", get(crash_websocket_handler))
        .route("/api/crash/bet", post(place_bet_handler))
        .route("/api/crash/cashout", post(crash_cashout_handler))
        .route("/api/crash/wagers/:wager_id", get(wager_handler))
        // Mines
        .route("/api/mines/start", post(mines_start_handler))
        .route("/api/mines/reveal", post(mines_reveal_handler))
        .route("/api/mines/cashout", post(mines_cashout_handler))
        .route("/api/mines/active/:user_id", get(mines_active_handler))
        .route("/api/mines/:session_id", get(mines_session_handler))
        // Accounts
        .route("/api/users/:user_id/balance", get(balance_handler))
        .route("/api/history/:user_id", get(history_handler))
        // Metrics endpoint for Prometheus
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
