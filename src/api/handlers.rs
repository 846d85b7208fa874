//! Request Handlers
//!
//! Thin HTTP bindings over the settlement coordinator and crash engine. No
//! game or payout logic lives here; every amount returned to a client was
//! computed by the trusted engine.

use super::{errors::ApiError, middleware::RequestId, models::*};
use crate::games::crash::{CashOutReceipt, CrashBetReceipt, CrashHandle};
use crate::games::settlement::SettlementCoordinator;
use crate::games::types::PlayRequest;
use crate::metrics;
use crate::store::{BalanceStore, InMemoryBalanceStore, StoreError, DEFAULT_STARTING_BALANCE};
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state
pub struct AppState {
    pub coordinator: Arc<SettlementCoordinator<InMemoryBalanceStore>>,
    pub store: Arc<InMemoryBalanceStore>,
    pub crash: CrashHandle,
}

/// Health check handler - minimal response time
/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
    })
}

/// Create an account with a starting balance
/// POST /api/account
pub async fn create_account_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<Json<AccountResponse>, ApiError> {
    let account_id = request
        .account_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let starting_balance = request.starting_balance.unwrap_or(DEFAULT_STARTING_BALANCE);
    if !starting_balance.is_finite() || starting_balance < 0.0 {
        return Err(ApiError::bad_request(
            request_id.0,
            "starting_balance must be non-negative".to_string(),
        ));
    }
    if !state.store.create_account(&account_id, starting_balance) {
        return Err(ApiError::bad_request(
            request_id.0,
            format!("account {} already exists", account_id),
        ));
    }
    Ok(Json(AccountResponse {
        account_id,
        balance: starting_balance,
    }))
}

/// Current balance
/// GET /api/account/:id/balance
pub async fn balance_handler(
    Extension(request_id): Extension<RequestId>,
    Path(account_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<BalanceResponse>, ApiError> {
    match state.store.balance(&account_id).await {
        Ok(versioned) => Ok(Json(BalanceResponse {
            account_id,
            balance: versioned.value,
        })),
        Err(StoreError::AccountNotFound(id)) => Err(ApiError::not_found(
            request_id.0,
            format!("account {} not found", id),
        )),
        Err(e) => Err(ApiError::internal_error(request_id.0, e.to_string())),
    }
}

/// Recent bets, newest first
/// GET /api/account/:id/bets
pub async fn bet_history_handler(
    Extension(request_id): Extension<RequestId>,
    Path(account_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<BetHistoryResponse>, ApiError> {
    match state.store.recent_bets(&account_id, 20).await {
        Ok(bets) => Ok(Json(BetHistoryResponse { account_id, bets })),
        Err(StoreError::AccountNotFound(id)) => Err(ApiError::not_found(
            request_id.0,
            format!("account {} not found", id),
        )),
        Err(e) => Err(ApiError::internal_error(request_id.0, e.to_string())),
    }
}

/// Play dice
/// POST /api/dice/play
pub async fn play_dice_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<DicePlayRequest>,
) -> Result<Json<PlayResponse>, ApiError> {
    let receipt = state
        .coordinator
        .play(
            &request.account_id,
            PlayRequest::Dice {
                stake: request.stake,
                target: request.target,
                direction: request.direction,
            },
        )
        .await
        .map_err(|e| ApiError::from_engine(request_id.0, e))?;
    Ok(Json(PlayResponse {
        bet_id: receipt.bet_id,
        outcome: receipt.outcome,
        payout: receipt.payout,
        new_balance: receipt.new_balance,
    }))
}

/// Play slots
/// POST /api/slots/play
pub async fn play_slots_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<SlotsPlayRequest>,
) -> Result<Json<PlayResponse>, ApiError> {
    let receipt = state
        .coordinator
        .play(
            &request.account_id,
            PlayRequest::Slots {
                stake: request.stake,
            },
        )
        .await
        .map_err(|e| ApiError::from_engine(request_id.0, e))?;
    Ok(Json(PlayResponse {
        bet_id: receipt.bet_id,
        outcome: receipt.outcome,
        payout: receipt.payout,
        new_balance: receipt.new_balance,
    }))
}

/// Join the round currently accepting bets
/// POST /api/crash/bet
pub async fn crash_bet_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<CrashBetRequest>,
) -> Result<Json<CrashBetReceipt>, ApiError> {
    state
        .crash
        .place_bet(&request.account_id, request.stake, request.auto_cashout)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_engine(request_id.0, e))
}

/// Cash out an active crash bet
/// POST /api/crash/cashout
pub async fn crash_cashout_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<CashOutRequest>,
) -> Result<Json<CashOutReceipt>, ApiError> {
    state
        .crash
        .cash_out(&request.account_id)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_engine(request_id.0, e))
}

/// Prometheus text exposition
/// GET /metrics
pub async fn metrics_handler() -> String {
    metrics::encode()
}
