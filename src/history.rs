//! Per-user record of settled games.

use crate::games::types::{GameRecord, UserId};
use dashmap::DashMap;
use std::collections::VecDeque;

/// Bounded, newest-first game history for each user
pub struct GameHistory {
    records: DashMap<UserId, VecDeque<GameRecord>>,
    per_user: usize,
}

impl GameHistory {
    pub fn new(per_user: usize) -> Self {
        Self {
            records: DashMap::new(),
            per_user: per_user.max(1),
        }
    }

    pub fn record(&self, record: GameRecord) {
        let mut entries = self.records.entry(record.user_id).or_default();
        entries.push_front(record);
        entries.truncate(self.per_user);
    }

    /// Up to `limit` most recent records for `user_id`
    pub fn recent(&self, user_id: UserId, limit: usize) -> Vec<GameRecord> {
        self.records
            .get(&user_id)
            .map(|entries| entries.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    pub fn user_count(&self) -> usize {
        self.records.len()
    }
}

impl Default for GameHistory {
    fn default() -> Self {
        Self::new(100)
    }
}
