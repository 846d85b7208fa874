//! Engine error taxonomy
//!
//! Failures are split by when they can occur relative to the stake debit:
//! everything in [`RejectReason`] happens before any balance is touched and is
//! safe to retry with corrected input, while [`EngineError::Failed`] means a
//! stake was debited but the settlement could not be recorded and operator
//! compensation is required.

use thiserror::Error;

/// Pre-debit validation failures. No side effects have occurred.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RejectReason {
    #[error("unknown account {0}")]
    UnknownAccount(String),

    #[error("account {0} is banned")]
    Banned(String),

    #[error("stake {stake} outside allowed range [{min}, {max}]")]
    StakeOutOfRange { stake: f64, min: f64, max: f64 },

    #[error("insufficient balance: stake {stake} exceeds balance {balance}")]
    InsufficientBalance { stake: f64, balance: f64 },

    #[error("dice target {0} outside [1, 99]")]
    InvalidTarget(u8),

    #[error("auto cash-out {0} below minimum of 1.01")]
    InvalidAutoCashout(f64),

    #[error("betting is closed for the current round")]
    BettingClosed,

    #[error("account already has a bet in round {0}")]
    DuplicateRoundBet(String),

    #[error("no active bet to cash out")]
    NoActiveBet,

    #[error("bet already cashed out")]
    AlreadyCashedOut,

    #[error("round already crashed")]
    TooLate,
}

/// Root error type for all engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The play was rejected before any balance mutation.
    #[error("bet rejected: {0}")]
    Rejected(#[from] RejectReason),

    /// The stake was debited but the settlement could not be recorded after
    /// bounded retries. The bet is pending out-of-band resolution; the
    /// debited stake must never be silently dropped.
    #[error(
        "settlement unresolved for bet {bet_id}: stake {stake} debited from \
         account {account_id}, {attempts} settle attempts failed"
    )]
    Failed {
        bet_id: String,
        account_id: String,
        stake: f64,
        attempts: u32,
    },

    /// Programmer, configuration or entropy-source error. Fatal for the
    /// request; the engine never settles with corrupted parameters.
    #[error("internal engine error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn internal(message: impl Into<String>) -> Self {
        EngineError::Internal(message.into())
    }
}

/// Convenience alias used throughout the engine.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_reason_display_carries_context() {
        let reason = RejectReason::StakeOutOfRange {
            stake: 5000.0,
            min: 1.0,
            max: 1000.0,
        };
        let rendered = reason.to_string();
        assert!(rendered.contains("5000"));
        assert!(rendered.contains("1000"));
    }

    #[test]
    fn rejected_wraps_reason() {
        let err: EngineError = RejectReason::Banned("acct-1".to_string()).into();
        match err {
            EngineError::Rejected(RejectReason::Banned(id)) => assert_eq!(id, "acct-1"),
            other => panic!("expected Rejected, got {:?}", other),
        }
    }
}
