//! Settlement outbox for credits the ledger refused during a forced crash.
//!
//! When a round has to be forced into `Crashed` while the ledger keeps
//! failing, the winning wagers are still resolved and their credits are
//! parked here. The scheduler retries the queue on every tick; records that
//! keep failing are set aside for manual intervention.

use crate::errors::LedgerError;
use crate::games::types::{UserId, WagerId};
use crate::ledger::Ledger;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{error, info, warn};

/// Settlement status tracking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Pending,
    Completed,
    RequiresManualIntervention,
}

/// Outstanding credit owed to a player
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub settlement_id: u64,
    pub wager_id: WagerId,
    pub user_id: UserId,
    pub amount: u64,
    pub reason: String,
    pub status: SettlementStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Result of one pass over the queue
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SettlementPass {
    pub completed: usize,
    pub failed: usize,
    pub parked: usize,
}

#[derive(Debug)]
pub struct SettlementQueue {
    pending: VecDeque<SettlementRecord>,
    parked: Vec<SettlementRecord>,
    completed: u64,
    next_id: u64,
    max_attempts: u32,
}

impl SettlementQueue {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            pending: VecDeque::new(),
            parked: Vec::new(),
            completed: 0,
            next_id: 1,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn enqueue(
        &mut self,
        wager_id: WagerId,
        user_id: UserId,
        amount: u64,
        reason: impl Into<String>,
        cause: &LedgerError,
    ) -> u64 {
        let settlement_id = self.next_id;
        self.next_id += 1;

        let record = SettlementRecord {
            settlement_id,
            wager_id,
            user_id,
            amount,
            reason: reason.into(),
            status: SettlementStatus::Pending,
            attempts: 1,
            last_error: Some(cause.to_string()),
            created_at: Utc::now(),
            completed_at: None,
        };

        warn!(
            settlement_id,
            wager_id, user_id, amount, "credit deferred to settlement queue: {}", cause
        );
        self.pending.push_back(record);
        settlement_id
    }

    /// Retry every pending record once
    pub fn retry(&mut self, ledger: &dyn Ledger) -> SettlementPass {
        let mut pass = SettlementPass::default();
        let mut still_pending = VecDeque::with_capacity(self.pending.len());

        while let Some(mut record) = self.pending.pop_front() {
            record.attempts += 1;
            match ledger.credit(record.user_id, record.amount) {
                Ok(balance) => {
                    info!(
                        settlement_id = record.settlement_id,
                        user_id = record.user_id,
                        amount = record.amount,
                        balance,
                        "deferred credit settled"
                    );
                    self.completed += 1;
                    pass.completed += 1;
                }
                Err(e) if record.attempts >= self.max_attempts => {
                    error!(
                        settlement_id = record.settlement_id,
                        user_id = record.user_id,
                        amount = record.amount,
                        attempts = record.attempts,
                        "settlement requires manual intervention: {}",
                        e
                    );
                    record.status = SettlementStatus::RequiresManualIntervention;
                    record.last_error = Some(e.to_string());
                    self.parked.push(record);
                    pass.parked += 1;
                }
                Err(e) => {
                    record.last_error = Some(e.to_string());
                    still_pending.push_back(record);
                    pass.failed += 1;
                }
            }
        }

        self.pending = still_pending;
        pass
    }

    pub fn pending(&self) -> impl Iterator<Item = &SettlementRecord> {
        self.pending.iter()
    }

    pub fn parked(&self) -> &[SettlementRecord] {
        &self.parked
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn completed_count(&self) -> u64 {
        self.completed
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;

    #[test]
    fn test_retry_settles_once_ledger_recovers() {
        let ledger = MemoryLedger::new();
        let mut queue = SettlementQueue::new(5);
        let cause = LedgerError::Unavailable("down".to_string());

        queue.enqueue(1, 42, 300, "auto cashout", &cause);

        // Account does not exist yet, so the credit fails
        let pass = queue.retry(&ledger);
        assert_eq!(pass.failed, 1);
        assert_eq!(queue.pending_len(), 1);

        ledger.open_account(42, 0);
        let pass = queue.retry(&ledger);
        assert_eq!(pass.completed, 1);
        assert!(queue.is_empty());
        assert_eq!(ledger.balance(42).unwrap(), 300);
        assert_eq!(queue.completed_count(), 1);
    }

    #[test]
    fn test_records_park_after_max_attempts() {
        let ledger = MemoryLedger::new();
        let mut queue = SettlementQueue::new(3);
        queue.enqueue(9, 1, 10, "auto cashout", &LedgerError::UnknownAccount(1));

        queue.retry(&ledger);
        let pass = queue.retry(&ledger);

        assert_eq!(pass.parked, 1);
        assert!(queue.is_empty());
        assert_eq!(queue.parked().len(), 1);
        assert_eq!(
            queue.parked()[0].status,
            SettlementStatus::RequiresManualIntervention
        );
        assert_eq!(queue.parked()[0].attempts, 3);
    }
}
