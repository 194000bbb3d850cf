//! Crash round state and its observer-facing snapshot.

use crate::games::curve::{crash_duration_ms, crash_multiplier_at};
use crate::games::types::{Multiplier, RoundId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

/// Lifecycle phase of a round. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    Waiting,
    Live,
    Crashed,
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundPhase::Waiting => write!(f, "waiting"),
            RoundPhase::Live => write!(f, "live"),
            RoundPhase::Crashed => write!(f, "crashed"),
        }
    }
}

/// One play of the crash game.
///
/// The outcome is fixed at creation and only readable through
/// [`Round::revealed_outcome`] once the round has crashed.
#[derive(Debug, Clone)]
pub struct Round {
    pub id: RoundId,
    outcome: Multiplier,
    phase: RoundPhase,
    total_duration_ms: u64,
    countdown_ends_at: Instant,
    started_at: Option<Instant>,
    ended_at: Option<Instant>,
    ended_at_utc: Option<DateTime<Utc>>,
}

impl Round {
    pub fn new(id: RoundId, outcome: Multiplier, now: Instant, countdown: Duration) -> Self {
        Self {
            id,
            outcome,
            phase: RoundPhase::Waiting,
            total_duration_ms: crash_duration_ms(outcome),
            countdown_ends_at: now + countdown,
            started_at: None,
            ended_at: None,
            ended_at_utc: None,
        }
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.total_duration_ms
    }

    pub fn countdown_ends_at(&self) -> Instant {
        self.countdown_ends_at
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<Instant> {
        self.ended_at
    }

    /// Instant at which the live curve reaches the outcome
    pub fn crash_due_at(&self) -> Option<Instant> {
        self.started_at
            .map(|start| start + Duration::from_millis(self.total_duration_ms))
    }

    /// Outcome, visible only after the crash
    pub fn revealed_outcome(&self) -> Option<Multiplier> {
        (self.phase == RoundPhase::Crashed).then_some(self.outcome)
    }

    /// Outcome for server-side settlement. Never publish this value.
    pub(crate) fn outcome(&self) -> Multiplier {
        self.outcome
    }

    pub fn remaining_countdown(&self, now: Instant) -> Option<Duration> {
        (self.phase == RoundPhase::Waiting)
            .then(|| self.countdown_ends_at.saturating_duration_since(now))
    }

    /// Authoritative multiplier at `now`, derived from elapsed wall-clock time
    pub fn multiplier_at(&self, now: Instant) -> Multiplier {
        match (self.phase, self.started_at) {
            (RoundPhase::Waiting, _) | (_, None) => Multiplier::ONE,
            (RoundPhase::Crashed, _) => self.outcome,
            (RoundPhase::Live, Some(start)) => {
                let elapsed = now.saturating_duration_since(start).as_millis() as u64;
                crash_multiplier_at(elapsed, self.total_duration_ms, self.outcome)
            }
        }
    }

    /// Waiting -> Live. `started_at` is the scheduled countdown end, not the
    /// tick that observed it.
    pub(crate) fn go_live(&mut self) {
        if self.phase == RoundPhase::Waiting {
            self.phase = RoundPhase::Live;
            self.started_at = Some(self.countdown_ends_at);
        }
    }

    /// Live -> Crashed
    pub(crate) fn crash(&mut self, now: Instant) {
        if self.phase == RoundPhase::Live {
            self.phase = RoundPhase::Crashed;
            self.ended_at = Some(now);
            self.ended_at_utc = Some(Utc::now());
        }
    }

    pub fn history_entry(&self) -> Option<CrashHistoryEntry> {
        Some(CrashHistoryEntry {
            round_id: self.id,
            outcome_multiplier: self.revealed_outcome()?,
            ended_at: self.ended_at_utc?,
        })
    }
}

/// Outcome of a finished round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashHistoryEntry {
    pub round_id: RoundId,
    pub outcome_multiplier: Multiplier,
    pub ended_at: DateTime<Utc>,
}

/// Bounded ring buffer of the most recent crash outcomes, newest first
#[derive(Debug, Clone)]
pub struct RoundHistory {
    entries: VecDeque<CrashHistoryEntry>,
    capacity: usize,
}

impl RoundHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: CrashHistoryEntry) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front(entry);
    }

    pub fn entries(&self) -> Vec<CrashHistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What observers see of the current round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    pub round_id: RoundId,
    pub phase: RoundPhase,
    pub current_multiplier: Multiplier,
    /// Milliseconds until the round goes live, while waiting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub countdown_ms: Option<u64>,
    /// Only present once the round has crashed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crash_point: Option<Multiplier>,
    pub history: Vec<CrashHistoryEntry>,
}

impl RoundSnapshot {
    pub fn capture(round: &Round, history: &RoundHistory, now: Instant) -> Self {
        Self {
            round_id: round.id,
            phase: round.phase(),
            current_multiplier: round.multiplier_at(now),
            countdown_ms: round
                .remaining_countdown(now)
                .map(|d| d.as_millis() as u64),
            crash_point: round.revealed_outcome(),
            history: history.entries(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round(outcome: u64) -> (Round, Instant) {
        let now = Instant::now();
        (
            Round::new(1, Multiplier::from_hundredths(outcome), now, Duration::from_secs(10)),
            now,
        )
    }

    #[test]
    fn test_outcome_hidden_until_crash() {
        let (mut round, now) = round(350);
        assert_eq!(round.revealed_outcome(), None);

        round.go_live();
        let live = RoundSnapshot::capture(&round, &RoundHistory::new(10), now);
        assert_eq!(live.crash_point, None);
        assert!(!serde_json::to_string(&live).unwrap().contains("crash_point"));

        let end = round.crash_due_at().unwrap();
        round.crash(end);
        assert_eq!(round.revealed_outcome(), Some(Multiplier::from_hundredths(350)));
        assert!(round.history_entry().is_some());
    }

    #[test]
    fn test_live_clock_starts_at_scheduled_time() {
        let (mut round, now) = round(200);
        round.go_live();

        assert_eq!(round.started_at(), Some(now + Duration::from_secs(10)));
        assert_eq!(round.multiplier_at(now + Duration::from_secs(10)), Multiplier::ONE);

        let end = round.crash_due_at().unwrap();
        assert_eq!(round.multiplier_at(end), Multiplier::from_hundredths(200));
    }

    #[test]
    fn test_phase_moves_forward_only() {
        let (mut round, now) = round(150);
        round.crash(now);
        assert_eq!(round.phase(), RoundPhase::Waiting);

        round.go_live();
        round.crash(now);
        round.go_live();
        assert_eq!(round.phase(), RoundPhase::Crashed);
    }

    #[test]
    fn test_history_is_bounded_newest_first() {
        let mut history = RoundHistory::new(3);
        for id in 1..=5 {
            history.push(CrashHistoryEntry {
                round_id: id,
                outcome_multiplier: Multiplier::ONE,
                ended_at: Utc::now(),
            });
        }

        let ids: Vec<_> = history.entries().iter().map(|e| e.round_id).collect();
        assert_eq!(ids, vec![5, 4, 3]);
    }

    #[test]
    fn test_countdown_reported_while_waiting() {
        let (round, now) = round(150);
        let snapshot = RoundSnapshot::capture(&round, &RoundHistory::new(10), now + Duration::from_secs(4));
        assert_eq!(snapshot.countdown_ms, Some(6_000));
        assert_eq!(snapshot.phase, RoundPhase::Waiting);
    }
}
