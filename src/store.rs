//! Balance store capability interface
//!
//! The settlement coordinator never imports a concrete persistence SDK; it
//! talks to this trait. Any backing technology can be substituted as long as
//! it provides versioned reads, compare-and-set balance adjustment, and an
//! atomic credit-plus-append settlement commit that is idempotent on bet id.

use crate::games::types::BetRecord;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

/// Balance granted to fresh accounts at signup.
pub const DEFAULT_STARTING_BALANCE: f64 = 1_000.0;

/// Store operation errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("account {0} not found")]
    AccountNotFound(String),

    /// The balance changed between read and write; the caller should re-read
    /// and retry.
    #[error("balance version conflict for account {0}")]
    Conflict(String),

    #[error("balance adjustment would overdraw account {0}")]
    InsufficientFunds(String),

    /// Transient backend failure, safe to retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A value paired with the version counter it was read at.
#[derive(Debug, Clone, Copy)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

/// Persistence and identity collaborator consumed by the engine.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Current balance with its version for optimistic concurrency.
    async fn balance(&self, account_id: &str) -> Result<Versioned<f64>, StoreError>;

    /// Atomically adjust the balance by `delta` and return the new balance.
    ///
    /// When `expected_version` is given the adjustment only applies if the
    /// account is still at that version; a concurrent mutation yields
    /// [`StoreError::Conflict`]. Adjustments never drive a balance negative.
    async fn adjust_balance(
        &self,
        account_id: &str,
        delta: f64,
        expected_version: Option<u64>,
    ) -> Result<f64, StoreError>;

    /// Append an immutable bet record to the ledger, idempotent on bet id.
    async fn append_bet(&self, record: &BetRecord) -> Result<String, StoreError>;

    /// Atomically credit `record.payout` and append the record, as one
    /// logical transaction idempotent on bet id: retrying after a success
    /// must not credit twice. Returns the resulting balance.
    async fn commit_settlement(&self, record: &BetRecord) -> Result<f64, StoreError>;

    async fn is_banned(&self, account_id: &str) -> Result<bool, StoreError>;

    /// Most recent bets for an account, newest first.
    async fn recent_bets(&self, account_id: &str, limit: usize)
        -> Result<Vec<BetRecord>, StoreError>;
}

#[derive(Debug)]
struct AccountEntry {
    balance: f64,
    version: u64,
    banned: bool,
}

/// Single-process store backed by concurrent maps.
///
/// Per-account mutations serialize on the account's map entry, which is what
/// makes `adjust_balance` and `commit_settlement` atomic here.
#[derive(Default)]
pub struct InMemoryBalanceStore {
    accounts: DashMap<String, AccountEntry>,
    ledger: DashMap<String, BetRecord>,
    /// Bet ids per account, oldest first.
    history: DashMap<String, Vec<String>>,
}

impl InMemoryBalanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an account with the given starting balance. Returns false if
    /// the account already exists.
    pub fn create_account(&self, account_id: &str, starting_balance: f64) -> bool {
        match self.accounts.entry(account_id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(AccountEntry {
                    balance: starting_balance.max(0.0),
                    version: 0,
                    banned: false,
                });
                true
            }
        }
    }

    /// Soft-ban toggle; accounts are never deleted. Returns false for an
    /// unknown account.
    pub fn set_banned(&self, account_id: &str, banned: bool) -> bool {
        match self.accounts.get_mut(account_id) {
            Some(mut entry) => {
                entry.banned = banned;
                true
            }
            None => false,
        }
    }

    /// Ledger lookup by bet id.
    pub fn bet(&self, bet_id: &str) -> Option<BetRecord> {
        self.ledger.get(bet_id).map(|r| r.value().clone())
    }

    /// Number of settled bets in the ledger.
    pub fn ledger_len(&self) -> usize {
        self.ledger.len()
    }

    fn push_history(&self, record: &BetRecord) {
        self.history
            .entry(record.account_id.clone())
            .or_default()
            .push(record.bet_id.clone());
    }
}

#[async_trait]
impl BalanceStore for InMemoryBalanceStore {
    async fn balance(&self, account_id: &str) -> Result<Versioned<f64>, StoreError> {
        let entry = self
            .accounts
            .get(account_id)
            .ok_or_else(|| StoreError::AccountNotFound(account_id.to_string()))?;
        Ok(Versioned {
            value: entry.balance,
            version: entry.version,
        })
    }

    async fn adjust_balance(
        &self,
        account_id: &str,
        delta: f64,
        expected_version: Option<u64>,
    ) -> Result<f64, StoreError> {
        let mut entry = self
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| StoreError::AccountNotFound(account_id.to_string()))?;
        if let Some(expected) = expected_version {
            if entry.version != expected {
                return Err(StoreError::Conflict(account_id.to_string()));
            }
        }
        let next = entry.balance + delta;
        if next < 0.0 {
            return Err(StoreError::InsufficientFunds(account_id.to_string()));
        }
        entry.balance = next;
        entry.version += 1;
        Ok(next)
    }

    async fn append_bet(&self, record: &BetRecord) -> Result<String, StoreError> {
        match self.ledger.entry(record.bet_id.clone()) {
            Entry::Occupied(_) => Ok(record.bet_id.clone()),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                self.push_history(record);
                Ok(record.bet_id.clone())
            }
        }
    }

    async fn commit_settlement(&self, record: &BetRecord) -> Result<f64, StoreError> {
        match self.ledger.entry(record.bet_id.clone()) {
            // Already settled: report the current balance without crediting
            // again.
            Entry::Occupied(_) => {
                let entry = self
                    .accounts
                    .get(&record.account_id)
                    .ok_or_else(|| StoreError::AccountNotFound(record.account_id.clone()))?;
                Ok(entry.balance)
            }
            Entry::Vacant(slot) => {
                let new_balance = {
                    let mut entry = self.accounts.get_mut(&record.account_id).ok_or_else(|| {
                        StoreError::AccountNotFound(record.account_id.clone())
                    })?;
                    entry.balance += record.payout;
                    entry.version += 1;
                    entry.balance
                };
                slot.insert(record.clone());
                self.push_history(record);
                Ok(new_balance)
            }
        }
    }

    async fn is_banned(&self, account_id: &str) -> Result<bool, StoreError> {
        let entry = self
            .accounts
            .get(account_id)
            .ok_or_else(|| StoreError::AccountNotFound(account_id.to_string()))?;
        Ok(entry.banned)
    }

    async fn recent_bets(
        &self,
        account_id: &str,
        limit: usize,
    ) -> Result<Vec<BetRecord>, StoreError> {
        if !self.accounts.contains_key(account_id) {
            return Err(StoreError::AccountNotFound(account_id.to_string()));
        }
        let ids = match self.history.get(account_id) {
            Some(ids) => ids.iter().rev().take(limit).cloned().collect::<Vec<_>>(),
            None => return Ok(Vec::new()),
        };
        Ok(ids
            .iter()
            .filter_map(|id| self.ledger.get(id).map(|r| r.value().clone()))
            .collect())
    }
}
