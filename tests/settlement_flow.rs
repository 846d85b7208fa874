//! Settlement correctness under concurrency and store failures
//!
//! Exercises the full play pipeline against the in-memory store: interleaved
//! concurrent plays on one account, transient commit failures, and the
//! bounded-retry path that ends in an unresolved settlement.

use async_trait::async_trait;
use croupier::config::EngineConfig;
use croupier::games::settlement::{RetryPolicy, SettlementCoordinator};
use croupier::games::types::{BetRecord, Direction, PlayRequest};
use croupier::store::{BalanceStore, InMemoryBalanceStore, StoreError, Versioned};
use croupier::{EngineError, RejectReason};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Store wrapper that fails the next N settlement commits with a transient
/// error, simulating backend flakiness.
struct FlakyStore {
    inner: InMemoryBalanceStore,
    failing_commits: AtomicU32,
}

impl FlakyStore {
    fn new(inner: InMemoryBalanceStore, failing_commits: u32) -> Self {
        Self {
            inner,
            failing_commits: AtomicU32::new(failing_commits),
        }
    }

    fn take_failure(&self) -> bool {
        self.failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }
}

#[async_trait]
impl BalanceStore for FlakyStore {
    async fn balance(&self, account_id: &str) -> Result<Versioned<f64>, StoreError> {
        self.inner.balance(account_id).await
    }

    async fn adjust_balance(
        &self,
        account_id: &str,
        delta: f64,
        expected_version: Option<u64>,
    ) -> Result<f64, StoreError> {
        self.inner
            .adjust_balance(account_id, delta, expected_version)
            .await
    }

    async fn append_bet(&self, record: &BetRecord) -> Result<String, StoreError> {
        self.inner.append_bet(record).await
    }

    async fn commit_settlement(&self, record: &BetRecord) -> Result<f64, StoreError> {
        if self.take_failure() {
            return Err(StoreError::Unavailable("injected commit failure".to_string()));
        }
        self.inner.commit_settlement(record).await
    }

    async fn is_banned(&self, account_id: &str) -> Result<bool, StoreError> {
        self.inner.is_banned(account_id).await
    }

    async fn recent_bets(
        &self,
        account_id: &str,
        limit: usize,
    ) -> Result<Vec<BetRecord>, StoreError> {
        self.inner.recent_bets(account_id, limit).await
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    }
}

fn dice_request(stake: f64) -> PlayRequest {
    PlayRequest::Dice {
        stake,
        target: 50,
        direction: Direction::Over,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_plays_never_lose_or_duplicate_updates() {
    let store = Arc::new(InMemoryBalanceStore::new());
    store.create_account("player", 100.0);
    let coordinator = Arc::new(SettlementCoordinator::new(
        store.clone(),
        Arc::new(EngineConfig::default()),
    ));

    let mut handles = Vec::new();
    for _ in 0..30 {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator.play("player", dice_request(10.0)).await
        }));
    }

    let mut accepted_stakes = 0.0;
    let mut awarded_payouts = 0.0;
    let mut accepted = 0usize;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(receipt) => {
                accepted += 1;
                accepted_stakes += 10.0;
                awarded_payouts += receipt.payout;
            }
            Err(EngineError::Rejected(RejectReason::InsufficientBalance { .. })) => {}
            // Debit contention exhaustion happens pre-debit and leaves no
            // side effects, so it cannot break the accounting below.
            Err(EngineError::Internal(msg)) if msg.contains("compare-and-set") => {}
            Err(other) => panic!("unexpected failure: {:?}", other),
        }
    }

    let final_balance = store.balance("player").await.unwrap().value;
    let expected = 100.0 - accepted_stakes + awarded_payouts;
    assert!(
        (final_balance - expected).abs() < 1e-6,
        "final balance {} != initial - stakes + payouts = {}",
        final_balance,
        expected
    );
    assert_eq!(store.ledger_len(), accepted, "one ledger record per accepted play");
    assert!(final_balance >= 0.0, "balance must never go negative");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_plays_cannot_double_spend_a_tight_balance() {
    // Balance fits exactly one stake; of two concurrent plays at most one
    // may debit.
    for _ in 0..20 {
        let store = Arc::new(InMemoryBalanceStore::new());
        store.create_account("player", 10.0);
        // Under 1 never wins (rolls start at 1), so payouts stay zero and
        // the debit race alone decides the final balance.
        let coordinator = Arc::new(SettlementCoordinator::new(
            store.clone(),
            Arc::new(EngineConfig::default()),
        ));

        let a = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .play(
                        "player",
                        PlayRequest::Dice {
                            stake: 10.0,
                            target: 1,
                            direction: Direction::Under,
                        },
                    )
                    .await
            })
        };
        let b = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .play(
                        "player",
                        PlayRequest::Dice {
                            stake: 10.0,
                            target: 1,
                            direction: Direction::Under,
                        },
                    )
                    .await
            })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let accepted: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
        assert_eq!(accepted.len(), 1, "exactly one of two stakes fits");

        let payout = results
            .iter()
            .filter_map(|r| r.as_ref().ok().map(|receipt| receipt.payout))
            .sum::<f64>();
        let final_balance = store.balance("player").await.unwrap().value;
        assert!((final_balance - payout).abs() < 1e-6);
    }
}

#[tokio::test]
async fn transient_commit_failures_are_retried_invisibly() {
    let store = Arc::new(FlakyStore::new(InMemoryBalanceStore::new(), 2));
    store.inner.create_account("player", 100.0);
    let coordinator = SettlementCoordinator::new(store.clone(), Arc::new(EngineConfig::default()))
        .with_retry_policy(fast_retry());

    let receipt = coordinator
        .play("player", dice_request(10.0))
        .await
        .expect("play should settle after transient failures");

    let balance = store.balance("player").await.unwrap().value;
    assert!((balance - (90.0 + receipt.payout)).abs() < 1e-9);
    assert_eq!(store.inner.ledger_len(), 1);
}

#[tokio::test]
async fn exhausted_retries_surface_failed_not_silence() {
    let store = Arc::new(FlakyStore::new(InMemoryBalanceStore::new(), 100));
    store.inner.create_account("player", 100.0);
    let coordinator = SettlementCoordinator::new(store.clone(), Arc::new(EngineConfig::default()))
        .with_retry_policy(fast_retry());

    let result = coordinator.play("player", dice_request(10.0)).await;
    match result {
        Err(EngineError::Failed {
            account_id,
            stake,
            attempts,
            ..
        }) => {
            assert_eq!(account_id, "player");
            assert_eq!(stake, 10.0);
            assert_eq!(attempts, 3);
        }
        other => panic!("expected Failed, got {:?}", other),
    }

    // The debit stands (pending compensation); nothing was recorded.
    let balance = store.balance("player").await.unwrap().value;
    assert!((balance - 90.0).abs() < 1e-9);
    assert_eq!(store.inner.ledger_len(), 0);
}

#[tokio::test]
async fn boundary_stakes_against_balance() {
    let store = Arc::new(InMemoryBalanceStore::new());
    store.create_account("player", 50.0);
    let coordinator =
        SettlementCoordinator::new(store.clone(), Arc::new(EngineConfig::default()));

    // One unit above the balance is rejected with no side effects
    let rejected = coordinator.play("player", dice_request(51.0)).await;
    assert!(matches!(
        rejected,
        Err(EngineError::Rejected(RejectReason::InsufficientBalance { .. }))
    ));
    assert_eq!(store.balance("player").await.unwrap().value, 50.0);

    // Exactly the balance is accepted
    let receipt = coordinator
        .play("player", dice_request(50.0))
        .await
        .expect("stake equal to balance is accepted");
    let balance = store.balance("player").await.unwrap().value;
    assert!((balance - receipt.payout).abs() < 1e-9);
}
