//! End-to-end crash round behavior
//!
//! Runs the round worker against the in-memory store with an aggressive
//! clock, follows the broadcast feed, and checks that the ledger, balances
//! and commit-reveal all line up regardless of where the round crashes.

use croupier::config::EngineConfig;
use croupier::crash::{self, verify_commitment, RoundEvent};
use croupier::games::settlement::SettlementCoordinator;
use croupier::games::types::{GameType, Outcome};
use croupier::store::{BalanceStore, InMemoryBalanceStore};
use croupier::{EngineError, RejectReason};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::timeout;

fn fast_crash_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.crash.betting_window_ms = 200;
    config.crash.tick_interval_ms = 10;
    config.crash.growth_rate = 8.0;
    config.crash.intermission_ms = 100;
    config.crash.max_multiplier = 50.0;
    config
}

async fn next_betting_open(
    events: &mut broadcast::Receiver<RoundEvent>,
) -> (String, String) {
    loop {
        match timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("timed out waiting for a betting phase")
            .expect("event stream closed")
        {
            RoundEvent::BettingOpen {
                round_id,
                commitment,
                ..
            } => return (round_id, commitment),
            _ => {}
        }
    }
}

async fn wait_for_crash(
    events: &mut broadcast::Receiver<RoundEvent>,
    round_id: &str,
) -> (f64, String) {
    loop {
        match timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("timed out waiting for the round to crash")
            .expect("event stream closed")
        {
            RoundEvent::Crashed {
                round_id: crashed_round,
                crash_point,
                salt,
            } if crashed_round == round_id => return (crash_point, salt),
            _ => {}
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn round_settles_ledger_and_balance_consistently() {
    let config = Arc::new(fast_crash_config());
    let store = Arc::new(InMemoryBalanceStore::new());
    store.create_account("player", 100.0);
    let coordinator = Arc::new(SettlementCoordinator::new(store.clone(), config));
    let handle = crash::spawn(coordinator);
    let mut events = handle.subscribe();

    let (round_id, commitment) = next_betting_open(&mut events).await;
    let receipt = handle
        .place_bet("player", 10.0, Some(1.05))
        .await
        .expect("bet during betting window is accepted");
    assert_eq!(receipt.round_id, round_id);

    // Stake debited up front
    assert!((store.balance("player").await.unwrap().value - 90.0).abs() < 1e-9);

    let (crash_point, salt) = wait_for_crash(&mut events, &round_id).await;
    assert!(crash_point >= 1.0);
    assert!(
        verify_commitment(&commitment, &round_id, crash_point, &salt),
        "revealed crash point must match the pre-round commitment"
    );

    // Ledger records are written before the crash is broadcast
    let bets = store.recent_bets("player", 10).await.unwrap();
    assert_eq!(bets.len(), 1);
    let record = &bets[0];
    assert_eq!(record.game_type, GameType::Crash);
    assert_eq!(record.stake, 10.0);

    match &record.outcome {
        Outcome::Crash {
            crash_point: recorded_point,
            cashout_multiplier,
        } => {
            assert_eq!(*recorded_point, crash_point);
            match cashout_multiplier {
                Some(multiplier) => {
                    assert!((record.payout - 10.0 * multiplier).abs() < 1e-9);
                }
                None => assert_eq!(record.payout, 0.0),
            }
        }
        other => panic!("expected crash outcome, got {:?}", other),
    }

    // Whatever happened, the balance reconciles against the ledger
    let balance = store.balance("player").await.unwrap().value;
    assert!(
        (balance - (100.0 - 10.0 + record.payout)).abs() < 1e-9,
        "balance {} inconsistent with recorded payout {}",
        balance,
        record.payout
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cashout_without_a_bet_is_rejected() {
    let config = Arc::new(fast_crash_config());
    let store = Arc::new(InMemoryBalanceStore::new());
    store.create_account("player", 100.0);
    let coordinator = Arc::new(SettlementCoordinator::new(store.clone(), config));
    let handle = crash::spawn(coordinator);
    let mut events = handle.subscribe();

    next_betting_open(&mut events).await;
    let result = handle.cash_out("player").await;
    assert!(matches!(
        result,
        Err(EngineError::Rejected(
            RejectReason::TooLate | RejectReason::NoActiveBet
        ))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn duplicate_bet_in_one_round_is_rejected() {
    let config = Arc::new(fast_crash_config());
    let store = Arc::new(InMemoryBalanceStore::new());
    store.create_account("player", 100.0);
    let coordinator = Arc::new(SettlementCoordinator::new(store.clone(), config));
    let handle = crash::spawn(coordinator);
    let mut events = handle.subscribe();

    next_betting_open(&mut events).await;
    handle
        .place_bet("player", 10.0, None)
        .await
        .expect("first bet accepted");
    let second = handle.place_bet("player", 10.0, None).await;
    assert!(matches!(
        second,
        Err(EngineError::Rejected(RejectReason::DuplicateRoundBet(_)))
    ));

    // Only the first stake was debited
    assert!((store.balance("player").await.unwrap().value - 90.0).abs() < 1e-9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_crash_bets_fail_fast() {
    let config = Arc::new(fast_crash_config());
    let store = Arc::new(InMemoryBalanceStore::new());
    store.create_account("player", 100.0);
    let coordinator = Arc::new(SettlementCoordinator::new(store.clone(), config));
    let handle = crash::spawn(coordinator);
    let mut events = handle.subscribe();

    next_betting_open(&mut events).await;

    let bad_stake = handle.place_bet("player", 0.5, None).await;
    assert!(matches!(
        bad_stake,
        Err(EngineError::Rejected(RejectReason::StakeOutOfRange { .. }))
    ));

    let bad_auto = handle.place_bet("player", 10.0, Some(1.0)).await;
    assert!(matches!(
        bad_auto,
        Err(EngineError::Rejected(RejectReason::InvalidAutoCashout(_)))
    ));

    // Nothing was debited
    assert!((store.balance("player").await.unwrap().value - 100.0).abs() < 1e-9);
}
