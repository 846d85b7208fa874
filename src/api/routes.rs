//! Route Definitions
//!
//! Maps URLs to handlers with type-safe routing.

use super::{handlers::*, websocket::crash_feed_handler};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check (high priority)
        .route("/health", get(health_handler))
        // Account lifecycle and queries
        .route("/api/account", post(create_account_handler))
        .route("/api/account/:id/balance", get(balance_handler))
        .route("/api/account/:id/bets", get(bet_history_handler))
        // Single-request games
        .route("/api/dice/play", post(play_dice_handler))
        .route("/api/slots/play", post(play_slots_handler))
        // Crash round interaction + live feed
        .route("/api/crash/bet", post(crash_bet_handler))
        .route("/api/crash/cashout", post(crash_cashout_handler))
        .route("/ws/crash", get(crash_feed_handler))
        // Metrics endpoint for Prometheus
        .route("/metrics", get(metrics_handler))
        // Attach shared state
        .with_state(state)
}
