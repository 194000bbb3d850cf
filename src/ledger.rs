//! Player balances.
//!
//! The engines only ever mutate balances through [`Ledger::debit`] and
//! [`Ledger::credit`], each of which must be atomic on its own.

use crate::errors::LedgerError;
use crate::games::types::UserId;
use dashmap::DashMap;
use std::sync::Arc;

pub trait Ledger: Send + Sync {
    /// Remove `amount` from the balance, failing without change if it is short.
    /// Returns the new balance.
    fn debit(&self, user_id: UserId, amount: u64) -> Result<u64, LedgerError>;

    /// Add `amount` to the balance. Returns the new balance.
    fn credit(&self, user_id: UserId, amount: u64) -> Result<u64, LedgerError>;

    fn balance(&self, user_id: UserId) -> Result<u64, LedgerError>;
}

/// In-memory ledger; each account entry is updated under its shard lock
#[derive(Clone, Default)]
pub struct MemoryLedger {
    accounts: Arc<DashMap<UserId, u64>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the account if missing. Returns the current balance.
    pub fn open_account(&self, user_id: UserId, initial_balance: u64) -> u64 {
        *self.accounts.entry(user_id).or_insert(initial_balance)
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }
}

impl Ledger for MemoryLedger {
    fn debit(&self, user_id: UserId, amount: u64) -> Result<u64, LedgerError> {
        let mut balance = self
            .accounts
            .get_mut(&user_id)
            .ok_or(LedgerError::UnknownAccount(user_id))?;

        if *balance < amount {
            return Err(LedgerError::InsufficientBalance {
                needed: amount,
                available: *balance,
            });
        }
        *balance -= amount;
        Ok(*balance)
    }

    fn credit(&self, user_id: UserId, amount: u64) -> Result<u64, LedgerError> {
        let mut balance = self
            .accounts
            .get_mut(&user_id)
            .ok_or(LedgerError::UnknownAccount(user_id))?;

        *balance = balance
            .checked_add(amount)
            .ok_or(LedgerError::Overflow(user_id))?;
        Ok(*balance)
    }

    fn balance(&self, user_id: UserId) -> Result<u64, LedgerError> {
        self.accounts
            .get(&user_id)
            .map(|b| *b)
            .ok_or(LedgerError::UnknownAccount(user_id))
    }
}
