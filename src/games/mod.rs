//! Crash and mines game engines
//!
//! Both engines are transport-agnostic: they talk to the outside world only
//! through the [`Ledger`], [`OutcomeGenerator`], [`Clock`] and (for crash)
//! [`crate::sink::StateSink`] seams.

pub mod curve;
pub mod mines;
pub mod outcome;
pub mod round;
pub mod scheduler;
pub mod settlement;
pub mod types;
pub mod wagers;

use crate::clock::Clock;
use crate::history::GameHistory;
use crate::ledger::Ledger;
use crate::metrics::GameMetrics;
use std::sync::Arc;

pub use mines::{MinesEngine, MinesSession, SessionSnapshot, SessionState};
pub use outcome::{CrashDistribution, OutcomeGenerator, RandomOutcomes, ScriptedOutcomes};
pub use round::{CrashHistoryEntry, RoundPhase, RoundSnapshot};
pub use scheduler::RoundScheduler;
pub use types::*;
pub use wagers::{Resolution, Wager};

/// Collaborators shared by both engines
#[derive(Clone)]
pub struct GameContext {
    pub ledger: Arc<dyn Ledger>,
    pub outcomes: Arc<dyn OutcomeGenerator>,
    pub clock: Arc<dyn Clock>,
    pub history: Arc<GameHistory>,
    pub metrics: Arc<GameMetrics>,
}
