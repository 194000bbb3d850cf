//! Hidden outcome generation for both games.
//!
//! Crash points come from a mixture of two truncated exponential
//! distributions shifted to start at 1.00x. Both components have a
//! decreasing density, so the mixture does too; truncation is done by
//! inverse-CDF sampling rather than clamping, which would put a spike of
//! probability mass at the cap.

use crate::errors::{ConfigurationError, GameError, GameResult};
use crate::games::types::Multiplier;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// Indices of the mined cells, hidden until the session ends
pub type MineLayout = BTreeSet<u8>;

/// Shape of the crash point distribution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrashDistribution {
    /// Decay rate of the common component (most rounds end below 2.00x)
    pub body_rate: f64,
    /// Decay rate of the rare high-multiplier component
    pub tail_rate: f64,
    /// Probability of drawing from the tail component
    pub tail_weight: f64,
    /// Hard upper bound on any crash point
    pub cap: Multiplier,
}

impl Default for CrashDistribution {
    fn default() -> Self {
        Self {
            body_rate: 1.2,
            tail_rate: 0.1,
            tail_weight: 0.03,
            cap: Multiplier::from_hundredths(5_000),
        }
    }
}

impl CrashDistribution {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(self.body_rate.is_finite() && self.body_rate > 0.0) {
            return Err(ConfigurationError::invalid(
                "crash.distribution.body_rate",
                self.body_rate,
                "must be a positive number",
            ));
        }
        if !(self.tail_rate.is_finite() && self.tail_rate > 0.0) {
            return Err(ConfigurationError::invalid(
                "crash.distribution.tail_rate",
                self.tail_rate,
                "must be a positive number",
            ));
        }
        if !(0.0..=1.0).contains(&self.tail_weight) {
            return Err(ConfigurationError::invalid(
                "crash.distribution.tail_weight",
                self.tail_weight,
                "must be within [0, 1]",
            ));
        }
        if self.cap <= Multiplier::ONE {
            return Err(ConfigurationError::invalid(
                "crash.distribution.cap",
                self.cap,
                "must be above 1.00x",
            ));
        }
        Ok(())
    }

    /// Draw one crash point. Always within `[1.00, cap]`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Multiplier {
        let span = self.cap.as_f64() - 1.0;
        let rate = if rng.gen_bool(self.tail_weight) {
            self.tail_rate
        } else {
            self.body_rate
        };

        let u: f64 = rng.gen();
        let x = truncated_exponential(u, rate, span);

        Multiplier::from_f64_floor(1.0 + x).clamp(Multiplier::ONE, self.cap)
    }
}

/// Inverse CDF of an exponential distribution truncated to `[0, span]`
fn truncated_exponential(u: f64, rate: f64, span: f64) -> f64 {
    let mass = 1.0 - (-rate * span).exp();
    let x = -(1.0 - u * mass).ln() / rate;
    x.clamp(0.0, span)
}

/// Sample `mine_count` distinct cells uniformly without replacement
pub fn sample_mine_layout<R: Rng + ?Sized>(
    rng: &mut R,
    mine_count: u8,
    total_cells: u8,
) -> GameResult<MineLayout> {
    if mine_count == 0 || mine_count >= total_cells {
        return Err(GameError::InvalidMineCount {
            mine_count: mine_count.into(),
            min: 1,
            max: total_cells.saturating_sub(1),
        });
    }

    Ok(rand::seq::index::sample(rng, total_cells as usize, mine_count as usize)
        .into_iter()
        .map(|i| i as u8)
        .collect())
}

/// Source of hidden outcomes
pub trait OutcomeGenerator: Send + Sync {
    /// Crash point for the next round
    fn crash_outcome(&self) -> GameResult<Multiplier>;

    /// Mine positions for a new session
    fn mine_layout(&self, mine_count: u8, total_cells: u8) -> GameResult<MineLayout>;
}

/// Default generator backed by a seedable RNG
pub struct RandomOutcomes {
    rng: Mutex<StdRng>,
    distribution: CrashDistribution,
}

impl RandomOutcomes {
    /// Generator seeded from operating system entropy
    pub fn new(distribution: CrashDistribution) -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
            distribution,
        }
    }

    /// Deterministic generator (for testing and simulations)
    pub fn seeded(distribution: CrashDistribution, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            distribution,
        }
    }

    pub fn distribution(&self) -> &CrashDistribution {
        &self.distribution
    }
}

impl OutcomeGenerator for RandomOutcomes {
    fn crash_outcome(&self) -> GameResult<Multiplier> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| GameError::OutcomeUnavailable("random source poisoned".to_string()))?;
        Ok(self.distribution.sample(&mut *rng))
    }

    fn mine_layout(&self, mine_count: u8, total_cells: u8) -> GameResult<MineLayout> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| GameError::OutcomeUnavailable("random source poisoned".to_string()))?;
        sample_mine_layout(&mut *rng, mine_count, total_cells)
    }
}

/// Generator that replays queued outcomes, for tests and round replays.
///
/// Once the crash queue is empty it keeps returning `fallback`; an empty
/// layout queue yields the lowest-numbered cells.
pub struct ScriptedOutcomes {
    crash: Mutex<VecDeque<Multiplier>>,
    layouts: Mutex<VecDeque<MineLayout>>,
    fallback: Multiplier,
    failures: AtomicU32,
}

impl ScriptedOutcomes {
    pub fn new(fallback: Multiplier) -> Self {
        Self {
            crash: Mutex::new(VecDeque::new()),
            layouts: Mutex::new(VecDeque::new()),
            fallback,
            failures: AtomicU32::new(0),
        }
    }

    pub fn push_crash(&self, outcome: Multiplier) -> &Self {
        if let Ok(mut queue) = self.crash.lock() {
            queue.push_back(outcome);
        }
        self
    }

    pub fn push_layout<I: IntoIterator<Item = u8>>(&self, cells: I) -> &Self {
        if let Ok(mut queue) = self.layouts.lock() {
            queue.push_back(cells.into_iter().collect());
        }
        self
    }

    /// Make the next `count` crash draws fail
    pub fn fail_next(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }
}

impl OutcomeGenerator for ScriptedOutcomes {
    fn crash_outcome(&self) -> GameResult<Multiplier> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(GameError::OutcomeUnavailable("scripted failure".to_string()));
        }

        let mut queue = self
            .crash
            .lock()
            .map_err(|_| GameError::OutcomeUnavailable("outcome script poisoned".to_string()))?;
        Ok(queue.pop_front().unwrap_or(self.fallback))
    }

    fn mine_layout(&self, mine_count: u8, total_cells: u8) -> GameResult<MineLayout> {
        if mine_count == 0 || mine_count >= total_cells {
            return Err(GameError::InvalidMineCount {
                mine_count: mine_count.into(),
                min: 1,
                max: total_cells.saturating_sub(1),
            });
        }

        let mut queue = self
            .layouts
            .lock()
            .map_err(|_| GameError::OutcomeUnavailable("outcome script poisoned".to_string()))?;
        Ok(queue.pop_front().unwrap_or_else(|| (0..mine_count).collect()))
    }
}
