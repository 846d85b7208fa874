//! Settlement coordination
//!
//! The coordinator is the only component allowed to mutate account balances
//! or append to the bet ledger. Each play request moves through
//! `Validated -> Debited -> OutcomeDrawn -> Settled`; validation failures
//! terminate in `Rejected` with no side effects, and a settlement that cannot
//! be committed after bounded retries terminates in `Failed` with the debited
//! stake logged for compensation. Every debit therefore has exactly one
//! eventually-recorded credit-or-zero-payout resolution.

use crate::config::EngineConfig;
use crate::errors::{EngineError, RejectReason};
use crate::games::payout;
use crate::games::rng::OutcomeGenerator;
use crate::games::types::{BetRecord, Outcome, PlayReceipt, PlayRequest};
use crate::metrics;
use crate::store::{BalanceStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// How many times a version conflict on the debit compare-and-set is retried
/// before the request is abandoned. Conflicts only occur under concurrent
/// plays on the same account, so a handful of attempts is plenty.
const DEBIT_CONFLICT_ATTEMPTS: u32 = 8;

/// Bounded exponential backoff for transient store failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Hard ceiling on settle attempts before a play is marked `Failed`.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(10);
        (self.initial_backoff * factor).min(self.max_backoff)
    }
}

/// Coordinates outcome generation, payout computation and atomic settlement
/// against the balance store.
pub struct SettlementCoordinator<S: BalanceStore> {
    store: Arc<S>,
    rng: OutcomeGenerator,
    config: Arc<EngineConfig>,
    retry: RetryPolicy,
}

impl<S: BalanceStore> SettlementCoordinator<S> {
    pub fn new(store: Arc<S>, config: Arc<EngineConfig>) -> Self {
        Self {
            store,
            rng: OutcomeGenerator::new(),
            config,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Settle a single-request play (dice or slots) end to end.
    pub async fn play(
        &self,
        account_id: &str,
        request: PlayRequest,
    ) -> Result<PlayReceipt, EngineError> {
        // Validated: bounds are checked before any store round trip and
        // before any entropy is consumed.
        if let Err(reason) = self.validate_request(&request) {
            metrics::BETS_REJECTED.inc();
            return Err(reason.into());
        }
        if let Err(e) = self.ensure_playable(account_id).await {
            if matches!(e, EngineError::Rejected(_)) {
                metrics::BETS_REJECTED.inc();
            }
            return Err(e);
        }

        let stake = request.stake();

        // Debited
        self.debit_stake(account_id, stake).await?;

        // OutcomeDrawn: pure and in-process. An entropy failure here is a
        // programmer/platform error, but the stake is already gone, so
        // refund before surfacing it.
        let (outcome, payout_amount) = match self.draw_outcome(&request, stake) {
            Ok(drawn) => drawn,
            Err(e) => {
                self.refund_stake(account_id, stake).await;
                return Err(e);
            }
        };

        // Settled
        let record = BetRecord::new(account_id, stake, outcome, payout_amount);
        let new_balance = self.resolve_bet(&record).await?;

        let game = record.game_type.to_string();
        metrics::BETS_SETTLED.with_label_values(&[game.as_str()]).inc();
        metrics::STAKE_TOTAL.with_label_values(&[game.as_str()]).inc_by(stake);
        metrics::PAYOUT_TOTAL
            .with_label_values(&[game.as_str()])
            .inc_by(payout_amount);

        Ok(PlayReceipt {
            bet_id: record.bet_id,
            outcome: record.outcome,
            payout: payout_amount,
            new_balance,
        })
    }

    fn validate_request(&self, request: &PlayRequest) -> Result<(), RejectReason> {
        match request {
            PlayRequest::Dice { stake, target, .. } => {
                payout::validate_dice_target(*target)?;
                payout::validate_stake(*stake, self.config.dice.min_bet, self.config.dice.max_bet)
            }
            PlayRequest::Slots { stake } => payout::validate_stake(
                *stake,
                self.config.slots.min_bet,
                self.config.slots.max_bet,
            ),
        }
    }

    /// Account exists and is not banned.
    pub async fn ensure_playable(&self, account_id: &str) -> Result<(), EngineError> {
        match self.store.is_banned(account_id).await {
            Ok(false) => Ok(()),
            Ok(true) => Err(RejectReason::Banned(account_id.to_string()).into()),
            Err(StoreError::AccountNotFound(id)) => Err(RejectReason::UnknownAccount(id).into()),
            Err(e) => Err(EngineError::internal(format!(
                "account lookup failed: {}",
                e
            ))),
        }
    }

    /// Atomically debit the stake via compare-and-set on (balance, version).
    ///
    /// Concurrent plays on the same account serialize here: two plays cannot
    /// both read the same pre-debit balance and both succeed if only one
    /// stake fits. Version conflicts are retried internally and never
    /// surfaced to the caller.
    pub async fn debit_stake(&self, account_id: &str, stake: f64) -> Result<(), EngineError> {
        for attempt in 0..DEBIT_CONFLICT_ATTEMPTS {
            let current = match self.store.balance(account_id).await {
                Ok(versioned) => versioned,
                Err(StoreError::AccountNotFound(id)) => {
                    return Err(RejectReason::UnknownAccount(id).into())
                }
                Err(e) => {
                    return Err(EngineError::internal(format!("balance read failed: {}", e)))
                }
            };
            if stake > current.value {
                metrics::BETS_REJECTED.inc();
                return Err(RejectReason::InsufficientBalance {
                    stake,
                    balance: current.value,
                }
                .into());
            }
            match self
                .store
                .adjust_balance(account_id, -stake, Some(current.version))
                .await
            {
                Ok(_) => return Ok(()),
                Err(StoreError::Conflict(_)) => {
                    metrics::DEBIT_CONFLICTS.inc();
                    debug!(account_id, attempt, "debit version conflict, retrying");
                    tokio::time::sleep(self.retry.backoff_for(attempt)).await;
                }
                Err(StoreError::InsufficientFunds(_)) => {
                    // Lost a race below the version check
                    metrics::BETS_REJECTED.inc();
                    return Err(RejectReason::InsufficientBalance {
                        stake,
                        balance: current.value,
                    }
                    .into());
                }
                Err(StoreError::AccountNotFound(id)) => {
                    return Err(RejectReason::UnknownAccount(id).into())
                }
                Err(e) => return Err(EngineError::internal(format!("debit failed: {}", e))),
            }
        }
        Err(EngineError::internal(format!(
            "debit for {} exhausted {} compare-and-set attempts",
            account_id, DEBIT_CONFLICT_ATTEMPTS
        )))
    }

    fn draw_outcome(
        &self,
        request: &PlayRequest,
        stake: f64,
    ) -> Result<(Outcome, f64), EngineError> {
        match request {
            PlayRequest::Dice {
                target, direction, ..
            } => {
                let roll = self.rng.dice_roll()?;
                let amount = payout::dice_payout(&self.config.dice, stake, *target, *direction, roll);
                Ok((
                    Outcome::Dice {
                        roll,
                        target: *target,
                        direction: *direction,
                    },
                    amount,
                ))
            }
            PlayRequest::Slots { .. } => {
                let grid = self.rng.slot_grid()?;
                let winning_lines = payout::slots_winning_lines(&grid);
                let amount = payout::slots_payout(&self.config.slots, stake, &winning_lines);
                Ok((
                    Outcome::Slots {
                        grid,
                        winning_lines,
                    },
                    amount,
                ))
            }
        }
    }

    /// Commit the settlement (credit plus ledger append, one idempotent store
    /// operation) with bounded retries. Exhaustion yields `Failed`; the
    /// debited stake is logged for compensation, never silently dropped.
    pub async fn resolve_bet(&self, record: &BetRecord) -> Result<f64, EngineError> {
        let mut attempt = 0;
        loop {
            match self.store.commit_settlement(record).await {
                Ok(new_balance) => return Ok(new_balance),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.retry.max_attempts {
                        metrics::SETTLEMENTS_FAILED.inc();
                        error!(
                            bet_id = %record.bet_id,
                            account_id = %record.account_id,
                            stake = record.stake,
                            payout = record.payout,
                            attempts = attempt,
                            "settlement unresolved, stake debited but not settled; \
                             compensation required: {}",
                            e
                        );
                        return Err(EngineError::Failed {
                            bet_id: record.bet_id.clone(),
                            account_id: record.account_id.clone(),
                            stake: record.stake,
                            attempts: attempt,
                        });
                    }
                    metrics::SETTLEMENT_RETRIES.inc();
                    warn!(
                        bet_id = %record.bet_id,
                        attempt,
                        "settlement commit failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(self.retry.backoff_for(attempt)).await;
                }
            }
        }
    }

    /// Append a bet record to the ledger without touching the balance. Used
    /// by the crash engine, which credits winnings at cash-out and writes the
    /// round's records once the crash point is public.
    pub async fn record_bet(&self, record: &BetRecord) -> Result<(), EngineError> {
        let mut attempt = 0;
        loop {
            match self.store.append_bet(record).await {
                Ok(_) => {
                    let game = record.game_type.to_string();
                    metrics::BETS_SETTLED.with_label_values(&[game.as_str()]).inc();
                    metrics::STAKE_TOTAL
                        .with_label_values(&[game.as_str()])
                        .inc_by(record.stake);
                    metrics::PAYOUT_TOTAL
                        .with_label_values(&[game.as_str()])
                        .inc_by(record.payout);
                    return Ok(());
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.retry.max_attempts {
                        metrics::SETTLEMENTS_FAILED.inc();
                        error!(
                            bet_id = %record.bet_id,
                            account_id = %record.account_id,
                            stake = record.stake,
                            payout = record.payout,
                            attempts = attempt,
                            "ledger append unresolved; record must be replayed: {}",
                            e
                        );
                        return Err(EngineError::Failed {
                            bet_id: record.bet_id.clone(),
                            account_id: record.account_id.clone(),
                            stake: record.stake,
                            attempts: attempt,
                        });
                    }
                    metrics::SETTLEMENT_RETRIES.inc();
                    tokio::time::sleep(self.retry.backoff_for(attempt)).await;
                }
            }
        }
    }

    /// Credit winnings outside a combined settlement commit. Used by the
    /// crash engine at cash-out time.
    pub async fn credit_winnings(
        &self,
        account_id: &str,
        amount: f64,
    ) -> Result<f64, EngineError> {
        let mut attempt = 0;
        loop {
            match self.store.adjust_balance(account_id, amount, None).await {
                Ok(new_balance) => return Ok(new_balance),
                Err(StoreError::Unavailable(e)) => {
                    attempt += 1;
                    if attempt >= self.retry.max_attempts {
                        metrics::SETTLEMENTS_FAILED.inc();
                        error!(
                            account_id,
                            amount, "credit unresolved after retries, compensation required: {}", e
                        );
                        return Err(EngineError::internal(format!(
                            "credit of {} to {} unresolved: {}",
                            amount, account_id, e
                        )));
                    }
                    metrics::SETTLEMENT_RETRIES.inc();
                    tokio::time::sleep(self.retry.backoff_for(attempt)).await;
                }
                Err(e) => {
                    return Err(EngineError::internal(format!(
                        "credit of {} to {} failed: {}",
                        amount, account_id, e
                    )))
                }
            }
        }
    }

    /// Best-effort compensating refund after a post-debit internal error.
    async fn refund_stake(&self, account_id: &str, stake: f64) {
        if let Err(e) = self.store.adjust_balance(account_id, stake, None).await {
            error!(
                account_id,
                stake, "compensating refund failed, manual reconciliation required: {}", e
            );
        }
    }
}
