//! Wagers attached to crash rounds.
//!
//! The registry itself is plain data; it is only ever touched while the
//! scheduler's round lock is held, which serializes placement, cashout and
//! the tick's resolution sweeps against each other.

use crate::errors::{GameError, GameResult};
use crate::games::types::{Multiplier, RoundId, UserId, WagerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// How a wager was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Player cashed out explicitly
    Cashout,
    /// Server resolved the standing auto-cashout instruction
    AutoCashout,
    /// Round crashed while the wager was pending
    Lost,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wager {
    pub id: WagerId,
    pub round_id: RoundId,
    pub user_id: UserId,
    pub amount: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_cashout_at: Option<Multiplier>,
    /// Live multiplier when the bet was accepted (1.00x while waiting)
    pub entry_multiplier: Multiplier,
    pub resolved_at_multiplier: Option<Multiplier>,
    pub profit: Option<i64>,
    pub resolution: Option<Resolution>,
    pub placed_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Wager {
    pub fn is_pending(&self) -> bool {
        self.resolved_at_multiplier.is_none()
    }

    /// Amount credited back to the player on a winning resolution
    pub fn payout(&self) -> u64 {
        match (self.resolution, self.resolved_at_multiplier) {
            (Some(Resolution::Cashout | Resolution::AutoCashout), Some(m)) => m.payout(self.amount),
            _ => 0,
        }
    }
}

#[derive(Debug, Default)]
pub struct WagerRegistry {
    wagers: HashMap<WagerId, Wager>,
    by_round: BTreeMap<RoundId, Vec<WagerId>>,
    next_id: WagerId,
}

impl WagerRegistry {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Default::default()
        }
    }

    pub fn insert(
        &mut self,
        round_id: RoundId,
        user_id: UserId,
        amount: u64,
        auto_cashout_at: Option<Multiplier>,
        entry_multiplier: Multiplier,
    ) -> Wager {
        let id = self.next_id;
        self.next_id += 1;

        let wager = Wager {
            id,
            round_id,
            user_id,
            amount,
            auto_cashout_at,
            entry_multiplier,
            resolved_at_multiplier: None,
            profit: None,
            resolution: None,
            placed_at: Utc::now(),
            resolved_at: None,
        };

        self.wagers.insert(id, wager.clone());
        self.by_round.entry(round_id).or_default().push(id);
        wager
    }

    pub fn get(&self, id: WagerId) -> Option<&Wager> {
        self.wagers.get(&id)
    }

    /// Pending wagers of a round, in placement order
    pub fn pending_for_round(&self, round_id: RoundId) -> Vec<WagerId> {
        self.by_round
            .get(&round_id)
            .map(|ids| {
                ids.iter()
                    .filter(|id| self.wagers.get(id).is_some_and(Wager::is_pending))
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Pending wagers whose auto-cashout threshold is at or below `multiplier`
    pub fn auto_cashouts_due(&self, round_id: RoundId, multiplier: Multiplier) -> Vec<WagerId> {
        self.pending_for_round(round_id)
            .into_iter()
            .filter(|id| {
                self.wagers
                    .get(id)
                    .and_then(|w| w.auto_cashout_at)
                    .is_some_and(|at| at <= multiplier)
            })
            .collect()
    }

    pub fn round_wagers(&self, round_id: RoundId) -> Vec<Wager> {
        self.by_round
            .get(&round_id)
            .map(|ids| ids.iter().filter_map(|id| self.wagers.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    /// Mark a wager resolved. A wager resolves exactly once.
    pub fn resolve(
        &mut self,
        id: WagerId,
        multiplier: Multiplier,
        resolution: Resolution,
    ) -> GameResult<Wager> {
        let wager = self.wagers.get_mut(&id).ok_or(GameError::WagerNotFound(id))?;
        if !wager.is_pending() {
            return Err(GameError::AlreadyResolved);
        }

        wager.profit = Some(match resolution {
            Resolution::Lost => -(wager.amount.min(i64::MAX as u64) as i64),
            Resolution::Cashout | Resolution::AutoCashout => multiplier.profit(wager.amount),
        });
        wager.resolved_at_multiplier = Some(multiplier);
        wager.resolution = Some(resolution);
        wager.resolved_at = Some(Utc::now());

        Ok(wager.clone())
    }

    /// Drop wagers of rounds older than `oldest_kept`
    pub fn prune_before(&mut self, oldest_kept: RoundId) -> usize {
        let kept = self.by_round.split_off(&oldest_kept);
        let dropped = std::mem::replace(&mut self.by_round, kept);

        let mut removed = 0;
        for id in dropped.into_values().flatten() {
            if self.wagers.remove(&id).is_some() {
                removed += 1;
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.wagers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wagers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(h: u64) -> Multiplier {
        Multiplier::from_hundredths(h)
    }

    #[test]
    fn test_resolve_exactly_once() {
        let mut registry = WagerRegistry::new();
        let wager = registry.insert(1, 7, 100, None, Multiplier::ONE);

        let resolved = registry.resolve(wager.id, m(150), Resolution::Cashout).unwrap();
        assert_eq!(resolved.profit, Some(50));
        assert_eq!(resolved.payout(), 150);

        assert_eq!(
            registry.resolve(wager.id, m(300), Resolution::Cashout),
            Err(GameError::AlreadyResolved)
        );
        assert_eq!(registry.get(wager.id).unwrap().resolved_at_multiplier, Some(m(150)));
    }

    #[test]
    fn test_loss_profit_is_negative_stake() {
        let mut registry = WagerRegistry::new();
        let wager = registry.insert(1, 7, 250, Some(m(500)), Multiplier::ONE);

        let lost = registry.resolve(wager.id, m(180), Resolution::Lost).unwrap();
        assert_eq!(lost.profit, Some(-250));
        assert_eq!(lost.payout(), 0);
    }

    #[test]
    fn test_auto_cashouts_due() {
        let mut registry = WagerRegistry::new();
        let low = registry.insert(1, 1, 10, Some(m(150)), Multiplier::ONE);
        let high = registry.insert(1, 2, 10, Some(m(300)), Multiplier::ONE);
        registry.insert(1, 3, 10, None, Multiplier::ONE);
        registry.insert(2, 4, 10, Some(m(110)), Multiplier::ONE);

        assert_eq!(registry.auto_cashouts_due(1, m(149)), Vec::<WagerId>::new());
        assert_eq!(registry.auto_cashouts_due(1, m(150)), vec![low.id]);
        assert_eq!(registry.auto_cashouts_due(1, m(400)), vec![low.id, high.id]);

        registry.resolve(low.id, m(150), Resolution::AutoCashout).unwrap();
        assert_eq!(registry.auto_cashouts_due(1, m(400)), vec![high.id]);
        assert_eq!(registry.pending_for_round(1).len(), 2);
    }

    #[test]
    fn test_prune_drops_old_rounds() {
        let mut registry = WagerRegistry::new();
        for round in 1..=5 {
            registry.insert(round, 1, 10, None, Multiplier::ONE);
        }

        assert_eq!(registry.prune_before(4), 3);
        assert_eq!(registry.len(), 2);
        assert!(registry.round_wagers(3).is_empty());
        assert_eq!(registry.round_wagers(4).len(), 1);
    }
}
