//! Mines session engine
//!
//! Sessions are independent: each one is serialized by its own map entry and
//! there is no lock shared across sessions. The per-user active index is
//! only ever locked before (never while holding) a session entry, which
//! keeps `start` atomic without risking lock-order inversions.

use crate::config::MinesConfig;
use crate::errors::{GameError, GameResult};
use crate::games::curve::{mine_probability, mines_multiplier_at, next_mines_multiplier};
use crate::games::outcome::MineLayout;
use crate::games::types::{GameData, GameRecord, GameType, Multiplier, SessionId, UserId};
use crate::games::GameContext;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Lost,
    CashedOut,
}

#[derive(Debug, Clone)]
pub struct MinesSession {
    pub id: SessionId,
    pub user_id: UserId,
    pub bet_amount: u64,
    pub mine_count: u8,
    pub total_cells: u8,
    mine_layout: MineLayout,
    /// Reveal order, no duplicates
    revealed: Vec<u8>,
    current_multiplier: Multiplier,
    state: SessionState,
    profit: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl MinesSession {
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state != SessionState::Active
    }

    pub fn revealed(&self) -> &[u8] {
        &self.revealed
    }

    pub fn current_multiplier(&self) -> Multiplier {
        self.current_multiplier
    }

    /// Observer view; the layout is only included once the session is over
    pub fn snapshot(&self) -> SessionSnapshot {
        let active = !self.is_terminal();
        let revealed_count = self.revealed.len() as u8;

        SessionSnapshot {
            session_id: self.id,
            user_id: self.user_id,
            bet_amount: self.bet_amount,
            mine_count: self.mine_count,
            total_cells: self.total_cells,
            revealed: self.revealed.clone(),
            current_multiplier: self.current_multiplier,
            next_multiplier: if active {
                next_mines_multiplier(self.mine_count, revealed_count, self.total_cells)
            } else {
                None
            },
            mine_probability: active
                .then(|| mine_probability(self.mine_count, revealed_count, self.total_cells)),
            state: self.state,
            profit: self.profit,
            mine_layout: (!active).then(|| self.mine_layout.iter().copied().collect()),
            created_at: self.created_at,
            ended_at: self.ended_at,
        }
    }

    fn record(&self) -> GameRecord {
        GameRecord {
            user_id: self.user_id,
            game_type: GameType::Mines,
            bet_amount: self.bet_amount,
            multiplier: match self.state {
                SessionState::CashedOut => self.current_multiplier,
                _ => Multiplier::from_hundredths(0),
            },
            profit: self.profit.unwrap_or_default(),
            game_data: GameData::Mines {
                session_id: self.id,
                mine_count: self.mine_count,
                mine_layout: self.mine_layout.iter().copied().collect(),
                revealed: self.revealed.clone(),
            },
            timestamp: self.ended_at.unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub bet_amount: u64,
    pub mine_count: u8,
    pub total_cells: u8,
    pub revealed: Vec<u8>,
    pub current_multiplier: Multiplier,
    /// What the next safe reveal would pay
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_multiplier: Option<Multiplier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mine_probability: Option<f64>,
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mine_layout: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

pub struct MinesEngine {
    sessions: DashMap<SessionId, MinesSession>,
    active: DashMap<UserId, SessionId>,
    finished: Mutex<VecDeque<SessionId>>,
    ctx: GameContext,
    config: MinesConfig,
}

impl MinesEngine {
    pub fn new(config: MinesConfig, ctx: GameContext) -> Self {
        Self {
            sessions: DashMap::new(),
            active: DashMap::new(),
            finished: Mutex::new(VecDeque::new()),
            ctx,
            config,
        }
    }

    /// Start a session, debiting the stake immediately.
    ///
    /// The user's active-index entry stays locked for the whole
    /// check-and-create, so concurrent starts for one user yield exactly
    /// one session.
    pub fn start(&self, user_id: UserId, bet_amount: u64, mine_count: u8) -> GameResult<SessionSnapshot> {
        match self.active.entry(user_id) {
            Entry::Occupied(mut occupied) => {
                let existing = *occupied.get();
                let still_active = self
                    .sessions
                    .get(&existing)
                    .is_some_and(|session| !session.is_terminal());
                if still_active {
                    return Err(GameError::ActiveSessionExists(existing));
                }

                let snapshot = self.open_session(user_id, bet_amount, mine_count)?;
                occupied.insert(snapshot.session_id);
                Ok(snapshot)
            }
            Entry::Vacant(vacant) => {
                let snapshot = self.open_session(user_id, bet_amount, mine_count)?;
                vacant.insert(snapshot.session_id);
                Ok(snapshot)
            }
        }
    }

    fn open_session(&self, user_id: UserId, bet_amount: u64, mine_count: u8) -> GameResult<SessionSnapshot> {
        let (min, max) = (self.config.min_mines, self.config.max_mines);
        if !(min..=max).contains(&mine_count) {
            return Err(GameError::InvalidMineCount {
                mine_count: mine_count.into(),
                min,
                max,
            });
        }
        if bet_amount == 0 {
            return Err(GameError::InvalidAmount);
        }

        let mine_layout = self.ctx.outcomes.mine_layout(mine_count, self.config.total_cells)?;
        self.ctx.ledger.debit(user_id, bet_amount)?;

        let session = MinesSession {
            id: Uuid::new_v4(),
            user_id,
            bet_amount,
            mine_count,
            total_cells: self.config.total_cells,
            mine_layout,
            revealed: Vec::new(),
            current_multiplier: Multiplier::ONE,
            state: SessionState::Active,
            profit: None,
            created_at: Utc::now(),
            ended_at: None,
        };
        let snapshot = session.snapshot();

        self.sessions.insert(session.id, session);
        self.ctx.metrics.mines_started.inc();
        info!(session_id = %snapshot.session_id, user_id, bet_amount, mine_count, "mines session started");

        Ok(snapshot)
    }

    /// Reveal `cell`. Revealing an already revealed cell changes nothing.
    pub fn reveal(&self, session_id: SessionId, cell: u8) -> GameResult<SessionSnapshot> {
        let (snapshot, finished) = {
            let mut session = self
                .sessions
                .get_mut(&session_id)
                .ok_or(GameError::SessionNotFound(session_id))?;

            if session.is_terminal() {
                return Err(GameError::SessionTerminal);
            }
            if cell >= session.total_cells {
                return Err(GameError::InvalidCell {
                    cell: cell.into(),
                    total_cells: session.total_cells,
                });
            }
            if session.revealed.contains(&cell) {
                return Ok(session.snapshot());
            }

            session.revealed.push(cell);
            if session.mine_layout.contains(&cell) {
                session.state = SessionState::Lost;
                session.profit = Some(-(session.bet_amount.min(i64::MAX as u64) as i64));
                session.ended_at = Some(Utc::now());
                self.ctx.metrics.mines_lost.inc();
                info!(%session_id, cell, revealed = session.revealed.len(), "mine hit");
            } else {
                session.current_multiplier = mines_multiplier_at(
                    session.mine_count,
                    session.revealed.len() as u8,
                    session.total_cells,
                );
                debug!(%session_id, cell, multiplier = %session.current_multiplier, "safe reveal");
            }

            let finished = session.is_terminal().then(|| (session.user_id, session.record()));
            (session.snapshot(), finished)
        };

        if let Some((user_id, record)) = finished {
            self.finish(user_id, session_id, record);
        }
        Ok(snapshot)
    }

    /// Cash out at the current multiplier and reveal the layout.
    ///
    /// A failed credit leaves the session active.
    pub fn cashout(&self, session_id: SessionId) -> GameResult<SessionSnapshot> {
        let (snapshot, user_id, record) = {
            let mut session = self
                .sessions
                .get_mut(&session_id)
                .ok_or(GameError::SessionNotFound(session_id))?;

            match session.state {
                SessionState::CashedOut => return Err(GameError::AlreadyResolved),
                SessionState::Lost => return Err(GameError::SessionTerminal),
                SessionState::Active => {}
            }

            let multiplier = session.current_multiplier;
            self.ctx
                .ledger
                .credit(session.user_id, multiplier.payout(session.bet_amount))?;

            session.state = SessionState::CashedOut;
            session.profit = Some(multiplier.profit(session.bet_amount));
            session.ended_at = Some(Utc::now());
            self.ctx.metrics.mines_cashed_out.inc();
            info!(
                %session_id,
                user_id = session.user_id,
                multiplier = %multiplier,
                profit = session.profit.unwrap_or_default(),
                "mines cashout"
            );

            (session.snapshot(), session.user_id, session.record())
        };

        self.finish(user_id, session_id, record);
        Ok(snapshot)
    }

    /// Narrow a caller-supplied mine count, rejecting anything outside the configured range
    pub fn mine_count(&self, requested: i64) -> GameResult<u8> {
        let (min, max) = (self.config.min_mines, self.config.max_mines);
        u8::try_from(requested)
            .ok()
            .filter(|count| (min..=max).contains(count))
            .ok_or(GameError::InvalidMineCount {
                mine_count: requested,
                min,
                max,
            })
    }

    /// Narrow a caller-supplied cell index to the grid
    pub fn cell(&self, requested: i64) -> GameResult<u8> {
        let total_cells = self.config.total_cells;
        u8::try_from(requested)
            .ok()
            .filter(|cell| *cell < total_cells)
            .ok_or(GameError::InvalidCell {
                cell: requested,
                total_cells,
            })
    }

    pub fn session(&self, session_id: SessionId) -> Option<SessionSnapshot> {
        self.sessions.get(&session_id).map(|s| s.snapshot())
    }

    /// The user's non-terminal session, if any
    pub fn active_session(&self, user_id: UserId) -> Option<SessionSnapshot> {
        let session_id = *self.active.get(&user_id)?;
        self.session(session_id).filter(|s| s.state == SessionState::Active)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Must be called without holding any session entry
    fn finish(&self, user_id: UserId, session_id: SessionId, record: GameRecord) {
        self.active.remove_if(&user_id, |_, active| *active == session_id);
        self.ctx.history.record(record);

        let expired: Vec<SessionId> = match self.finished.lock() {
            Ok(mut finished) => {
                finished.push_back(session_id);
                let excess = finished.len().saturating_sub(self.config.session_retention);
                finished.drain(..excess).collect()
            }
            Err(_) => Vec::new(),
        };
        for id in expired {
            self.sessions.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::games::outcome::ScriptedOutcomes;
    use crate::history::GameHistory;
    use crate::ledger::{Ledger, MemoryLedger};
    use crate::metrics::GameMetrics;
    use std::sync::{Arc, Barrier};

    fn engine() -> (Arc<MinesEngine>, MemoryLedger, Arc<ScriptedOutcomes>, Arc<GameHistory>) {
        let ledger = MemoryLedger::new();
        ledger.open_account(1, 1_000);
        let script = Arc::new(ScriptedOutcomes::new(Multiplier::from_hundredths(200)));
        let history = Arc::new(GameHistory::new(10));

        let ctx = GameContext {
            ledger: Arc::new(ledger.clone()),
            outcomes: script.clone(),
            clock: Arc::new(SystemClock),
            history: history.clone(),
            metrics: Arc::new(GameMetrics::new().unwrap()),
        };
        (Arc::new(MinesEngine::new(MinesConfig::default(), ctx)), ledger, script, history)
    }

    #[test]
    fn test_safe_reveals_increase_multiplier_then_cashout() {
        let (engine, ledger, script, history) = engine();
        script.push_layout([20, 21, 22, 23, 24]);

        let session = engine.start(1, 100, 5).unwrap();
        assert_eq!(ledger.balance(1).unwrap(), 900);
        assert_eq!(session.mine_layout, None);

        let mut last = session.current_multiplier;
        for cell in 0..10 {
            let snapshot = engine.reveal(session.session_id, cell).unwrap();
            assert!(snapshot.current_multiplier > last);
            last = snapshot.current_multiplier;
        }

        let done = engine.cashout(session.session_id).unwrap();
        assert_eq!(done.state, SessionState::CashedOut);
        assert_eq!(done.mine_layout, Some(vec![20, 21, 22, 23, 24]));
        assert_eq!(ledger.balance(1).unwrap(), 900 + last.payout(100));
        assert_eq!(done.profit, Some(last.profit(100)));
        assert_eq!(history.recent(1, 10).len(), 1);
    }

    #[test]
    fn test_mine_hit_loses_and_reveals_layout() {
        let (engine, ledger, script, _) = engine();
        script.push_layout([2, 11, 17]);

        let session = engine.start(1, 100, 3).unwrap();
        engine.reveal(session.session_id, 0).unwrap();
        engine.reveal(session.session_id, 1).unwrap();
        let lost = engine.reveal(session.session_id, 2).unwrap();

        assert_eq!(lost.state, SessionState::Lost);
        assert_eq!(lost.profit, Some(-100));
        assert_eq!(lost.revealed, vec![0, 1, 2]);
        assert_eq!(lost.mine_layout, Some(vec![2, 11, 17]));
        assert_eq!(ledger.balance(1).unwrap(), 900);

        assert_eq!(engine.reveal(session.session_id, 3), Err(GameError::SessionTerminal));
        assert_eq!(engine.cashout(session.session_id), Err(GameError::SessionTerminal));
        assert!(engine.active_session(1).is_none());
    }

    #[test]
    fn test_cashout_twice_is_already_resolved() {
        let (engine, ledger, _, _) = engine();
        let session = engine.start(1, 100, 1).unwrap();
        engine.reveal(session.session_id, 24).unwrap();

        engine.cashout(session.session_id).unwrap();
        let balance = ledger.balance(1).unwrap();

        assert_eq!(engine.cashout(session.session_id), Err(GameError::AlreadyResolved));
        assert_eq!(ledger.balance(1).unwrap(), balance);
    }

    #[test]
    fn test_caller_values_are_narrowed_to_the_grid() {
        let (engine, _, _, _) = engine();

        assert_eq!(engine.mine_count(3), Ok(3));
        assert_eq!(
            engine.mine_count(300),
            Err(GameError::InvalidMineCount { mine_count: 300, min: 1, max: 24 })
        );
        assert!(matches!(engine.mine_count(-2), Err(GameError::InvalidMineCount { .. })));

        assert_eq!(engine.cell(24), Ok(24));
        assert_eq!(engine.cell(-1), Err(GameError::InvalidCell { cell: -1, total_cells: 25 }));
        assert_eq!(engine.cell(300), Err(GameError::InvalidCell { cell: 300, total_cells: 25 }));
    }

    #[test]
    fn test_duplicate_reveal_is_noop() {
        let (engine, _, _, _) = engine();
        let session = engine.start(1, 100, 3).unwrap();

        let first = engine.reveal(session.session_id, 10).unwrap();
        let again = engine.reveal(session.session_id, 10).unwrap();
        assert_eq!(first, again);
        assert_eq!(again.revealed, vec![10]);
    }

    #[test]
    fn test_invalid_inputs() {
        let (engine, ledger, _, _) = engine();

        assert_eq!(
            engine.start(1, 100, 0),
            Err(GameError::InvalidMineCount { mine_count: 0, min: 1, max: 24 })
        );
        assert!(matches!(engine.start(1, 100, 25), Err(GameError::InvalidMineCount { .. })));
        assert!(matches!(
            engine.start(1, 5_000, 3),
            Err(GameError::InsufficientBalance { .. })
        ));
        assert_eq!(ledger.balance(1).unwrap(), 1_000);
        assert!(engine.active_session(1).is_none());

        let session = engine.start(1, 100, 3).unwrap();
        assert_eq!(
            engine.reveal(session.session_id, 25),
            Err(GameError::InvalidCell { cell: 25, total_cells: 25 })
        );
        assert!(matches!(
            engine.reveal(Uuid::new_v4(), 1),
            Err(GameError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_new_session_allowed_after_terminal() {
        let (engine, _, _, _) = engine();
        let first = engine.start(1, 10, 2).unwrap();
        assert_eq!(
            engine.start(1, 10, 2),
            Err(GameError::ActiveSessionExists(first.session_id))
        );

        engine.cashout(first.session_id).unwrap();
        let second = engine.start(1, 10, 2).unwrap();
        assert_ne!(first.session_id, second.session_id);
        assert_eq!(engine.active_session(1).unwrap().session_id, second.session_id);
    }

    #[test]
    fn test_concurrent_starts_create_one_session() {
        let (engine, ledger, _, _) = engine();
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    engine.start(1, 100, 3)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let created = results.iter().filter(|r| r.is_ok()).count();
        let rejected = results
            .iter()
            .filter(|r| matches!(r, Err(GameError::ActiveSessionExists(_))))
            .count();

        assert_eq!(created, 1);
        assert_eq!(rejected, 7);
        assert_eq!(engine.session_count(), 1);
        assert_eq!(ledger.balance(1).unwrap(), 900);
    }
}
