use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Supported game types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    Dice,
    Slots,
    Crash,
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameType::Dice => write!(f, "dice"),
            GameType::Slots => write!(f, "slots"),
            GameType::Crash => write!(f, "crash"),
        }
    }
}

/// Dice bet direction relative to the chosen target
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Over,
    Under,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Over => write!(f, "over"),
            Direction::Under => write!(f, "under"),
        }
    }
}

/// Slot reel symbols
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SlotSymbol {
    Crown,
    Star,
    Diamond,
    Heart,
    Club,
    Clover,
}

impl SlotSymbol {
    /// Every symbol that can land on a reel, in paytable order.
    pub const ALL: [SlotSymbol; 6] = [
        SlotSymbol::Crown,
        SlotSymbol::Star,
        SlotSymbol::Diamond,
        SlotSymbol::Heart,
        SlotSymbol::Club,
        SlotSymbol::Clover,
    ];
}

impl fmt::Display for SlotSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SlotSymbol::Crown => "crown",
            SlotSymbol::Star => "star",
            SlotSymbol::Diamond => "diamond",
            SlotSymbol::Heart => "heart",
            SlotSymbol::Club => "club",
            SlotSymbol::Clover => "clover",
        };
        write!(f, "{}", name)
    }
}

/// 3x3 grid of symbols, row-major.
pub type SlotGrid = [[SlotSymbol; 3]; 3];

/// A payline whose three cells share a symbol. Positions are flat indices
/// into the grid (row * 3 + column), matching what clients render.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WinningLine {
    pub positions: [usize; 3],
    pub symbol: SlotSymbol,
}

/// Game outcome payload (discriminated union)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "game", rename_all = "lowercase")]
pub enum Outcome {
    Dice {
        roll: u8,
        target: u8,
        direction: Direction,
    },
    Slots {
        grid: SlotGrid,
        winning_lines: Vec<WinningLine>,
    },
    Crash {
        crash_point: f64,
        /// Multiplier the bet cashed out at, absent when the round crashed
        /// before any cash-out.
        cashout_multiplier: Option<f64>,
    },
}

impl Outcome {
    pub fn game_type(&self) -> GameType {
        match self {
            Outcome::Dice { .. } => GameType::Dice,
            Outcome::Slots { .. } => GameType::Slots,
            Outcome::Crash { .. } => GameType::Crash,
        }
    }
}

/// Immutable ledger entry for a settled bet.
///
/// Created atomically with the balance mutation and never updated afterwards;
/// the ledger is append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetRecord {
    pub bet_id: String,
    pub account_id: String,
    pub game_type: GameType,
    pub stake: f64,
    pub outcome: Outcome,
    pub payout: f64,
    pub created_at: DateTime<Utc>,
}

impl BetRecord {
    pub fn new(account_id: &str, stake: f64, outcome: Outcome, payout: f64) -> Self {
        Self {
            bet_id: Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            game_type: outcome.game_type(),
            stake,
            outcome,
            payout,
            created_at: Utc::now(),
        }
    }
}

/// A single-request play (dice or slots). Crash bets go through the round
/// engine instead because their settlement spans a whole round.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "game", rename_all = "lowercase")]
pub enum PlayRequest {
    Dice {
        stake: f64,
        target: u8,
        direction: Direction,
    },
    Slots {
        stake: f64,
    },
}

impl PlayRequest {
    pub fn stake(&self) -> f64 {
        match self {
            PlayRequest::Dice { stake, .. } => *stake,
            PlayRequest::Slots { stake } => *stake,
        }
    }

    pub fn game_type(&self) -> GameType {
        match self {
            PlayRequest::Dice { .. } => GameType::Dice,
            PlayRequest::Slots { .. } => GameType::Slots,
        }
    }
}

/// Result of a settled play returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct PlayReceipt {
    pub bet_id: String,
    pub outcome: Outcome,
    pub payout: f64,
    pub new_balance: f64,
}
