//! Engine metrics
//!
//! Prometheus counters covering the settlement pipeline, exported as text at
//! the `/metrics` endpoint.

use once_cell::sync::Lazy;
use prometheus::{CounterVec, Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

fn int_counter(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("metric definition");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric registration");
    counter
}

fn int_counter_vec(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    let counter = IntCounterVec::new(Opts::new(name, help), labels).expect("metric definition");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric registration");
    counter
}

fn counter_vec(name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let counter = CounterVec::new(Opts::new(name, help), labels).expect("metric definition");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric registration");
    counter
}

pub static BETS_SETTLED: Lazy<IntCounterVec> = Lazy::new(|| {
    int_counter_vec(
        "croupier_bets_settled_total",
        "Settled bets by game type",
        &["game"],
    )
});

pub static STAKE_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    counter_vec(
        "croupier_stake_total",
        "Total amount staked by game type",
        &["game"],
    )
});

pub static PAYOUT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    counter_vec(
        "croupier_payout_total",
        "Total amount paid out by game type",
        &["game"],
    )
});

pub static BETS_REJECTED: Lazy<IntCounter> = Lazy::new(|| {
    int_counter(
        "croupier_bets_rejected_total",
        "Plays rejected before any balance mutation",
    )
});

pub static DEBIT_CONFLICTS: Lazy<IntCounter> = Lazy::new(|| {
    int_counter(
        "croupier_debit_conflicts_total",
        "Version conflicts observed on the stake debit compare-and-set",
    )
});

pub static SETTLEMENT_RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    int_counter(
        "croupier_settlement_retries_total",
        "Transient store failures retried while committing settlements",
    )
});

pub static SETTLEMENTS_FAILED: Lazy<IntCounter> = Lazy::new(|| {
    int_counter(
        "croupier_settlements_failed_total",
        "Settlements left unresolved after exhausting retries",
    )
});

pub static CRASH_ROUNDS: Lazy<IntCounter> =
    Lazy::new(|| int_counter("croupier_crash_rounds_total", "Completed crash rounds"));

/// Prometheus text exposition of every registered metric.
pub fn encode() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::warn!("metrics encoding failed: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
