//! API Request/Response Models

use crate::games::types::{BetRecord, Direction, Outcome};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Account signup request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    /// Caller-chosen id; a UUID is generated when omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starting_balance: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResponse {
    pub account_id: String,
    pub balance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub account_id: String,
    pub balance: f64,
}

/// Dice play request
/// POST /api/dice/play
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DicePlayRequest {
    pub account_id: String,
    pub stake: f64,
    pub target: u8,
    pub direction: Direction,
}

/// Slots play request
/// POST /api/slots/play
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotsPlayRequest {
    pub account_id: String,
    pub stake: f64,
}

/// Settled play response shared by dice and slots
#[derive(Debug, Clone, Serialize)]
pub struct PlayResponse {
    pub bet_id: String,
    pub outcome: Outcome,
    pub payout: f64,
    pub new_balance: f64,
}

/// Crash bet request
/// POST /api/crash/bet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashBetRequest {
    pub account_id: String,
    pub stake: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_cashout: Option<f64>,
}

/// Cash-out request
/// POST /api/crash/cashout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashOutRequest {
    pub account_id: String,
}

/// Per-account bet history, newest first
#[derive(Debug, Clone, Serialize)]
pub struct BetHistoryResponse {
    pub account_id: String,
    pub bets: Vec<BetRecord>,
}
