//! Crash round engine
//!
//! One authoritative worker task owns the round lifecycle
//! (`Betting -> Running -> Crashed`, then an intermission before the next
//! round). It alone advances the multiplier clock and knows the crash point;
//! observers follow a broadcast channel of round events. Bet and cash-out
//! commands arrive on an mpsc queue and are applied in receipt order,
//! resolved against the multiplier at evaluation time.
//!
//! The crash point is drawn once when betting opens and committed to via
//! SHA-256 over `(round_id, crash point in cents, salt)`; the salt is
//! revealed with the crash point when the round ends so anyone can verify the
//! point was fixed up front. Bet records are only written to the ledger after
//! the reveal, because they contain the crash point.

use crate::errors::{EngineError, RejectReason};
use crate::games::payout;
use crate::games::rng::OutcomeGenerator;
use crate::games::settlement::SettlementCoordinator;
use crate::games::types::{BetRecord, Outcome};
use crate::metrics;
use crate::store::BalanceStore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Broadcast buffer size; slow subscribers miss ticks rather than stalling
/// the round clock.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Minimum accepted auto-cash-out threshold.
pub const MIN_AUTO_CASHOUT: f64 = 1.01;

/// Events observed by everyone following a round.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoundEvent {
    BettingOpen {
        round_id: String,
        /// SHA-256 commitment to the crash point, verifiable after reveal.
        commitment: String,
        betting_window_ms: u64,
    },
    RoundStarted {
        round_id: String,
    },
    Tick {
        round_id: String,
        multiplier: f64,
    },
    CashedOut {
        round_id: String,
        account_id: String,
        multiplier: f64,
        payout: f64,
    },
    Crashed {
        round_id: String,
        crash_point: f64,
        /// Hex salt revealing the commitment.
        salt: String,
    },
}

/// Acknowledgment returned when a crash bet is accepted.
#[derive(Debug, Clone, Serialize)]
pub struct CrashBetReceipt {
    pub round_id: String,
    pub stake: f64,
    pub auto_cashout: Option<f64>,
}

/// Result of a successful cash-out.
#[derive(Debug, Clone, Serialize)]
pub struct CashOutReceipt {
    pub round_id: String,
    pub multiplier: f64,
    pub payout: f64,
    pub new_balance: f64,
}

enum RoundCommand {
    PlaceBet {
        account_id: String,
        stake: f64,
        auto_cashout: Option<f64>,
        reply: oneshot::Sender<Result<CrashBetReceipt, EngineError>>,
    },
    CashOut {
        account_id: String,
        reply: oneshot::Sender<Result<CashOutReceipt, EngineError>>,
    },
}

/// Client handle to the crash engine; cheap to clone.
#[derive(Clone)]
pub struct CrashHandle {
    commands: mpsc::UnboundedSender<RoundCommand>,
    events: broadcast::Sender<RoundEvent>,
}

impl CrashHandle {
    /// Follow the live round feed.
    pub fn subscribe(&self) -> broadcast::Receiver<RoundEvent> {
        self.events.subscribe()
    }

    /// Place a bet in the round currently accepting bets. The stake is
    /// debited before the acknowledgment comes back.
    pub async fn place_bet(
        &self,
        account_id: &str,
        stake: f64,
        auto_cashout: Option<f64>,
    ) -> Result<CrashBetReceipt, EngineError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(RoundCommand::PlaceBet {
                account_id: account_id.to_string(),
                stake,
                auto_cashout,
                reply,
            })
            .map_err(|_| EngineError::internal("crash engine is not running"))?;
        response
            .await
            .map_err(|_| EngineError::internal("crash engine dropped the request"))?
    }

    /// Cash out an active bet at the current multiplier.
    pub async fn cash_out(&self, account_id: &str) -> Result<CashOutReceipt, EngineError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(RoundCommand::CashOut {
                account_id: account_id.to_string(),
                reply,
            })
            .map_err(|_| EngineError::internal("crash engine is not running"))?;
        response
            .await
            .map_err(|_| EngineError::internal("crash engine dropped the request"))?
    }
}

/// Spawn the round worker. Rounds run continuously until every handle is
/// dropped.
pub fn spawn<S: BalanceStore + 'static>(
    coordinator: Arc<SettlementCoordinator<S>>,
) -> CrashHandle {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    let worker = RoundWorker {
        coordinator,
        events: event_tx.clone(),
        rng: OutcomeGenerator::new(),
    };
    tokio::spawn(worker.run(command_rx));
    CrashHandle {
        commands: command_tx,
        events: event_tx,
    }
}

struct ActiveBet {
    stake: f64,
    auto_cashout: Option<f64>,
    /// Multiplier the bet cashed out at, if it did.
    cashed_out: Option<f64>,
}

struct RoundWorker<S: BalanceStore> {
    coordinator: Arc<SettlementCoordinator<S>>,
    events: broadcast::Sender<RoundEvent>,
    rng: OutcomeGenerator,
}

impl<S: BalanceStore> RoundWorker<S> {
    async fn run(self, mut commands: mpsc::UnboundedReceiver<RoundCommand>) {
        loop {
            match self.run_round(&mut commands).await {
                Ok(true) => {}
                Ok(false) => {
                    info!("all crash handles dropped, round worker stopping");
                    return;
                }
                Err(e) => error!("crash round aborted: {}", e),
            }
            let intermission = self.coordinator.config().crash.intermission_ms;
            tokio::time::sleep(Duration::from_millis(intermission)).await;
        }
    }

    /// Run one full round. Returns Ok(false) when the command channel has
    /// closed and the worker should stop.
    async fn run_round(
        &self,
        commands: &mut mpsc::UnboundedReceiver<RoundCommand>,
    ) -> Result<bool, EngineError> {
        let config = self.coordinator.config().crash.clone();
        let round_id = Uuid::new_v4().to_string();

        // The crash point is fixed here and stays out of the logs and the
        // ledger until the reveal.
        let crash_point = self
            .rng
            .crash_point(config.house_edge, config.max_multiplier)?;
        let salt = self.rng.salt()?;
        let commitment = commitment_hash(&round_id, crash_point, &salt);

        info!(round_id = %round_id, commitment = %commitment, "crash round open for betting");
        self.broadcast(RoundEvent::BettingOpen {
            round_id: round_id.clone(),
            commitment,
            betting_window_ms: config.betting_window_ms,
        });

        // Betting phase
        let mut bets: HashMap<String, ActiveBet> = HashMap::new();
        let betting_closes = tokio::time::sleep(Duration::from_millis(config.betting_window_ms));
        tokio::pin!(betting_closes);
        loop {
            tokio::select! {
                _ = &mut betting_closes => break,
                command = commands.recv() => match command {
                    Some(command) => {
                        self.handle_betting_command(&round_id, &config, &mut bets, command)
                            .await;
                    }
                    None => return Ok(false),
                },
            }
        }

        // Running phase: the worker alone advances the multiplier clock.
        self.broadcast(RoundEvent::RoundStarted {
            round_id: round_id.clone(),
        });
        let started = Instant::now();
        let mut ticker = tokio::time::interval(Duration::from_millis(config.tick_interval_ms));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut multiplier = 1.0f64;
        loop {
            tokio::select! {
                // Queued commands drain before the next tick so a cash-out
                // resolves at the multiplier its sender could observe.
                biased;
                command = commands.recv() => match command {
                    Some(command) => {
                        self.handle_running_command(&round_id, multiplier, &mut bets, command)
                            .await;
                    }
                    None => return Ok(false),
                },
                _ = ticker.tick() => {
                    multiplier = multiplier_at(config.growth_rate, started.elapsed())
                        .min(config.max_multiplier);

                    // Standing auto-cash-out instructions are honored before
                    // the crash check; a tick reaching both the threshold and
                    // the crash point goes to the player.
                    let due = due_auto_cashouts(&bets, multiplier);
                    for (account_id, threshold) in due {
                        if let Err(e) = self
                            .settle_cashout(&round_id, &account_id, threshold, &mut bets)
                            .await
                        {
                            error!(account_id = %account_id, "auto cash-out settlement failed: {}", e);
                        }
                    }

                    if multiplier >= crash_point {
                        break;
                    }
                    self.broadcast(RoundEvent::Tick {
                        round_id: round_id.clone(),
                        multiplier,
                    });
                }
            }
        }

        // Crashed: write the round's ledger records now that the crash point
        // is public. Winnings were already credited at cash-out time.
        for (account_id, bet) in bets {
            let payout_amount = bet
                .cashed_out
                .map(|m| payout::crash_payout(bet.stake, m))
                .unwrap_or(0.0);
            let record = BetRecord::new(
                &account_id,
                bet.stake,
                Outcome::Crash {
                    crash_point,
                    cashout_multiplier: bet.cashed_out,
                },
                payout_amount,
            );
            if let Err(e) = self.coordinator.record_bet(&record).await {
                error!(account_id = %account_id, bet_id = %record.bet_id, "crash ledger append failed: {}", e);
            }
        }

        info!(round_id = %round_id, crash_point, "round crashed");
        self.broadcast(RoundEvent::Crashed {
            round_id,
            crash_point,
            salt: hex::encode(salt),
        });
        metrics::CRASH_ROUNDS.inc();
        Ok(true)
    }

    async fn handle_betting_command(
        &self,
        round_id: &str,
        config: &crate::config::CrashConfig,
        bets: &mut HashMap<String, ActiveBet>,
        command: RoundCommand,
    ) {
        match command {
            RoundCommand::PlaceBet {
                account_id,
                stake,
                auto_cashout,
                reply,
            } => {
                let result = self
                    .accept_bet(round_id, config, bets, &account_id, stake, auto_cashout)
                    .await;
                let _ = reply.send(result);
            }
            RoundCommand::CashOut { reply, .. } => {
                // No round is running; any cash-out attempt is late.
                let _ = reply.send(Err(RejectReason::TooLate.into()));
            }
        }
    }

    async fn accept_bet(
        &self,
        round_id: &str,
        config: &crate::config::CrashConfig,
        bets: &mut HashMap<String, ActiveBet>,
        account_id: &str,
        stake: f64,
        auto_cashout: Option<f64>,
    ) -> Result<CrashBetReceipt, EngineError> {
        payout::validate_stake(stake, config.min_bet, config.max_bet)?;
        if let Some(threshold) = auto_cashout {
            if !threshold.is_finite() || threshold < MIN_AUTO_CASHOUT {
                return Err(RejectReason::InvalidAutoCashout(threshold).into());
            }
        }
        if bets.contains_key(account_id) {
            return Err(RejectReason::DuplicateRoundBet(round_id.to_string()).into());
        }
        self.coordinator.ensure_playable(account_id).await?;
        self.coordinator.debit_stake(account_id, stake).await?;
        bets.insert(
            account_id.to_string(),
            ActiveBet {
                stake,
                auto_cashout,
                cashed_out: None,
            },
        );
        debug!(round_id, account_id, stake, "crash bet accepted");
        Ok(CrashBetReceipt {
            round_id: round_id.to_string(),
            stake,
            auto_cashout,
        })
    }

    async fn handle_running_command(
        &self,
        round_id: &str,
        multiplier: f64,
        bets: &mut HashMap<String, ActiveBet>,
        command: RoundCommand,
    ) {
        match command {
            RoundCommand::PlaceBet { reply, .. } => {
                let _ = reply.send(Err(RejectReason::BettingClosed.into()));
            }
            RoundCommand::CashOut { account_id, reply } => {
                let already_cashed = bets.get(&account_id).map(|bet| bet.cashed_out.is_some());
                let result = match already_cashed {
                    None => Err(RejectReason::NoActiveBet.into()),
                    Some(true) => Err(RejectReason::AlreadyCashedOut.into()),
                    Some(false) => {
                        self.settle_cashout(round_id, &account_id, multiplier, bets)
                            .await
                    }
                };
                let _ = reply.send(result);
            }
        }
    }

    async fn settle_cashout(
        &self,
        round_id: &str,
        account_id: &str,
        multiplier: f64,
        bets: &mut HashMap<String, ActiveBet>,
    ) -> Result<CashOutReceipt, EngineError> {
        let bet = bets
            .get_mut(account_id)
            .ok_or_else(|| EngineError::internal("cash-out for unknown bet"))?;
        // Mark first: the instruction is honored even if the credit below
        // needs compensation, and the ledger record at round end carries the
        // payout owed either way.
        bet.cashed_out = Some(multiplier);
        let payout_amount = payout::crash_payout(bet.stake, multiplier);
        let new_balance = self
            .coordinator
            .credit_winnings(account_id, payout_amount)
            .await?;
        self.broadcast(RoundEvent::CashedOut {
            round_id: round_id.to_string(),
            account_id: account_id.to_string(),
            multiplier,
            payout: payout_amount,
        });
        Ok(CashOutReceipt {
            round_id: round_id.to_string(),
            multiplier,
            payout: payout_amount,
            new_balance,
        })
    }

    fn broadcast(&self, event: RoundEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }
}

/// Multiplier curve: e^(rate * seconds), starting at 1.0.
fn multiplier_at(growth_rate: f64, elapsed: Duration) -> f64 {
    (growth_rate * elapsed.as_secs_f64()).exp()
}

/// Bets whose standing auto-cash-out threshold has been reached, with the
/// threshold each settles at. An auto cash-out pays its threshold, not the
/// tick's multiplier.
fn due_auto_cashouts(bets: &HashMap<String, ActiveBet>, multiplier: f64) -> Vec<(String, f64)> {
    bets.iter()
        .filter(|(_, bet)| bet.cashed_out.is_none())
        .filter_map(|(account_id, bet)| {
            bet.auto_cashout
                .filter(|threshold| *threshold <= multiplier)
                .map(|threshold| (account_id.clone(), threshold))
        })
        .collect()
}

/// Commitment digest published when betting opens. The crash point is hashed
/// in cents so clients can reproduce the digest exactly.
pub fn commitment_hash(round_id: &str, crash_point: f64, salt: &[u8; 16]) -> String {
    let cents = (crash_point * 100.0).round() as u64;
    let mut hasher = Sha256::new();
    hasher.update(round_id.as_bytes());
    hasher.update(b":");
    hasher.update(cents.to_le_bytes());
    hasher.update(b":");
    hasher.update(salt);
    hex::encode(hasher.finalize())
}

/// Client-side check that a revealed crash point matches the commitment
/// published before the round ran.
pub fn verify_commitment(
    commitment: &str,
    round_id: &str,
    crash_point: f64,
    salt_hex: &str,
) -> bool {
    let Ok(salt_bytes) = hex::decode(salt_hex) else {
        return false;
    };
    let Ok(salt) = <[u8; 16]>::try_from(salt_bytes.as_slice()) else {
        return false;
    };
    commitment_hash(round_id, crash_point, &salt) == commitment
}
