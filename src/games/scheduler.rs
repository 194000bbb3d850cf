//! Crash round scheduler
//!
//! Owns the single current round and every wager attached to it. The tick
//! loop, bet placement and cashouts all run under one round lock, so a
//! tick's auto-cashout or crash sweep can never interleave with a caller
//! resolving the same wager.
//!
//! Every entry point first calls `advance(now)`, which moves the round
//! through as many phase transitions as `now` warrants. Only the tick loop
//! escalates a crash held back by ledger failures; requests and polls see
//! a held round as live and closed. Timing is always
//! derived from the round's recorded instants, so late or skipped ticks
//! self-correct.

use crate::config::CrashConfig;
use crate::errors::{GameError, GameResult, LedgerError};
use crate::games::round::{Round, RoundHistory, RoundPhase, RoundSnapshot};
use crate::games::settlement::{SettlementQueue, SettlementRecord};
use crate::games::types::{GameData, GameRecord, GameType, Multiplier, RoundId, UserId, WagerId};
use crate::games::wagers::{Resolution, Wager, WagerRegistry};
use crate::games::GameContext;
use crate::sink::StateSink;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Who is advancing the round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Driver {
    Tick,
    Request,
}

struct SchedulerState {
    round: Option<Round>,
    wagers: WagerRegistry,
    history: RoundHistory,
    next_round_id: RoundId,
    generation_failures: u32,
    /// Consecutive ticks the current crash has been held back by ledger failures
    settlement_retries: u32,
    settlements: SettlementQueue,
}

pub struct RoundScheduler {
    state: Mutex<SchedulerState>,
    ctx: GameContext,
    sink: Arc<dyn StateSink>,
    config: CrashConfig,
}

impl RoundScheduler {
    pub fn new(config: CrashConfig, ctx: GameContext, sink: Arc<dyn StateSink>) -> Self {
        let state = SchedulerState {
            round: None,
            wagers: WagerRegistry::new(),
            history: RoundHistory::new(config.history_size),
            next_round_id: 1,
            generation_failures: 0,
            settlement_retries: 0,
            settlements: SettlementQueue::new(config.settlement_max_attempts),
        };

        Self {
            state: Mutex::new(state),
            ctx,
            sink,
            config,
        }
    }

    pub fn config(&self) -> &CrashConfig {
        &self.config
    }

    /// Spawn the fixed-cadence tick loop. It stops when `shutdown` flips to true.
    pub fn spawn(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run(shutdown))
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(tick_ms = self.config.tick_interval_ms, "crash scheduler started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("crash scheduler stopped");
    }

    /// Advance the round to the current time, retry deferred credits and
    /// publish a snapshot.
    pub async fn tick(&self) -> Option<RoundSnapshot> {
        let now = self.ctx.clock.now();
        let snapshot = {
            let mut state = self.state.lock().await;
            self.advance(&mut state, now, Driver::Tick);
            self.retry_settlements(&mut state);
            Self::capture(&state, now)
        };

        if let Some(ref snapshot) = snapshot {
            self.sink.publish(snapshot);
        }
        snapshot
    }

    /// Current round as observers see it
    pub async fn snapshot(&self) -> Option<RoundSnapshot> {
        let now = self.ctx.clock.now();
        let mut state = self.state.lock().await;
        self.advance(&mut state, now, Driver::Request);
        Self::capture(&state, now)
    }

    /// Stake `amount` on `round_id`.
    ///
    /// Accepted while the round is waiting, or live below the betting cutoff.
    /// The stake is debited before the wager exists; a failed debit leaves
    /// no trace.
    pub async fn place_bet(
        &self,
        user_id: UserId,
        round_id: RoundId,
        amount: u64,
        auto_cashout_at: Option<Multiplier>,
    ) -> GameResult<Wager> {
        if amount == 0 {
            return Err(GameError::InvalidAmount);
        }
        if let Some(at) = auto_cashout_at {
            if at < self.config.min_auto_cashout || at > self.config.distribution.cap {
                return Err(GameError::InvalidAutoCashout(at));
            }
        }

        let now = self.ctx.clock.now();
        let mut state = self.state.lock().await;
        self.advance(&mut state, now, Driver::Request);

        let round = state
            .round
            .as_ref()
            .filter(|round| round.id == round_id)
            .ok_or(GameError::RoundClosed { round_id })?;

        let entry_multiplier = match round.phase() {
            RoundPhase::Waiting => Multiplier::ONE,
            RoundPhase::Live => {
                let current = round.multiplier_at(now);
                let due = round.crash_due_at().is_some_and(|due| now >= due);
                if due || current >= self.config.betting_cutoff {
                    return Err(GameError::RoundClosed { round_id });
                }
                current
            }
            RoundPhase::Crashed => return Err(GameError::RoundClosed { round_id }),
        };

        if let Some(at) = auto_cashout_at {
            if at <= entry_multiplier {
                return Err(GameError::InvalidAutoCashout(at));
            }
        }

        self.ctx.ledger.debit(user_id, amount)?;
        let wager = state
            .wagers
            .insert(round_id, user_id, amount, auto_cashout_at, entry_multiplier);

        self.ctx.metrics.wagers_placed.inc();
        debug!(
            wager_id = wager.id,
            round_id,
            user_id,
            amount,
            auto_cashout = ?auto_cashout_at,
            "bet placed"
        );

        Ok(wager)
    }

    /// Cash out a pending wager at `claimed`.
    ///
    /// The claim is checked against the multiplier recomputed from the
    /// round clock; the caller's value is never trusted beyond that bound.
    /// If the credit fails the wager stays pending and the error is returned.
    pub async fn cashout(&self, wager_id: WagerId, claimed: Multiplier) -> GameResult<Wager> {
        let now = self.ctx.clock.now();
        let mut state = self.state.lock().await;
        self.advance(&mut state, now, Driver::Request);

        let wager = state
            .wagers
            .get(wager_id)
            .cloned()
            .ok_or(GameError::WagerNotFound(wager_id))?;
        if !wager.is_pending() {
            return Err(GameError::AlreadyResolved);
        }

        let round_id = wager.round_id;
        let round = state
            .round
            .as_ref()
            .filter(|round| round.id == round_id)
            .ok_or(GameError::RoundClosed { round_id })?;

        match round.phase() {
            RoundPhase::Waiting => return Err(GameError::RoundNotLive { round_id }),
            RoundPhase::Crashed => return Err(GameError::RoundClosed { round_id }),
            RoundPhase::Live => {
                if round.crash_due_at().is_some_and(|due| now >= due) {
                    return Err(GameError::RoundClosed { round_id });
                }
            }
        }

        let authoritative = round.multiplier_at(now);
        let below_entry = wager.entry_multiplier > Multiplier::ONE && claimed <= wager.entry_multiplier;
        if claimed > authoritative || claimed < Multiplier::ONE || below_entry {
            debug!(wager_id, %claimed, %authoritative, "cashout claim rejected");
            return Err(GameError::InvalidMultiplier {
                claimed,
                authoritative,
            });
        }

        self.ctx.ledger.credit(wager.user_id, claimed.payout(wager.amount))?;
        let resolved = state.wagers.resolve(wager_id, claimed, Resolution::Cashout)?;
        self.record(&resolved);

        info!(
            wager_id,
            round_id,
            user_id = resolved.user_id,
            multiplier = %claimed,
            profit = resolved.profit.unwrap_or_default(),
            "cashout"
        );
        Ok(resolved)
    }

    pub async fn wager(&self, wager_id: WagerId) -> Option<Wager> {
        self.state.lock().await.wagers.get(wager_id).cloned()
    }

    pub async fn round_wagers(&self, round_id: RoundId) -> Vec<Wager> {
        self.state.lock().await.wagers.round_wagers(round_id)
    }

    pub async fn pending_settlements(&self) -> Vec<SettlementRecord> {
        self.state.lock().await.settlements.pending().cloned().collect()
    }

    pub async fn parked_settlements(&self) -> Vec<SettlementRecord> {
        self.state.lock().await.settlements.parked().to_vec()
    }

    fn capture(state: &SchedulerState, now: Instant) -> Option<RoundSnapshot> {
        state
            .round
            .as_ref()
            .map(|round| RoundSnapshot::capture(round, &state.history, now))
    }

    fn advance(&self, state: &mut SchedulerState, now: Instant, driver: Driver) {
        while self.step(state, now, driver) {}
    }

    /// Perform at most one phase transition. Returns whether one happened.
    fn step(&self, state: &mut SchedulerState, now: Instant, driver: Driver) -> bool {
        let Some(round) = state.round.as_mut() else {
            return self.open_round(state, now);
        };

        match round.phase() {
            RoundPhase::Waiting => {
                if now < round.countdown_ends_at() {
                    return false;
                }
                round.go_live();
                self.ctx.metrics.set_phase(RoundPhase::Live);
                info!(
                    round_id = round.id,
                    duration_ms = round.total_duration_ms(),
                    "round live"
                );
                true
            }
            RoundPhase::Live => {
                let due = round.crash_due_at().map_or(true, |due| now >= due);
                if due {
                    return self.resolve_crash(state, now, driver);
                }
                let (round_id, current) = (round.id, round.multiplier_at(now));
                self.sweep_auto_cashouts(state, round_id, current);
                false
            }
            RoundPhase::Crashed => {
                let resume_at = round.ended_at().map(|ended| ended + self.config.pause());
                if resume_at.is_some_and(|resume| now < resume) {
                    return false;
                }
                self.open_round(state, now)
            }
        }
    }

    fn open_round(&self, state: &mut SchedulerState, now: Instant) -> bool {
        let outcome = match self.ctx.outcomes.crash_outcome() {
            Ok(outcome) => outcome,
            Err(e) => {
                state.generation_failures += 1;
                self.ctx.metrics.outcome_failures.inc();
                warn!(
                    attempt = state.generation_failures,
                    "crash outcome generation failed, retrying next tick: {}", e
                );
                return false;
            }
        };

        let round_id = state.next_round_id;
        state.next_round_id += 1;
        state.generation_failures = 0;
        state.settlement_retries = 0;
        state.round = Some(Round::new(round_id, outcome, now, self.config.countdown()));

        let oldest_kept = round_id.saturating_sub(self.config.wager_retention_rounds);
        let pruned = state.wagers.prune_before(oldest_kept);

        self.ctx.metrics.set_phase(RoundPhase::Waiting);
        info!(
            round_id,
            countdown_ms = self.config.countdown_ms,
            pruned_wagers = pruned,
            "round open for bets"
        );
        true
    }

    fn sweep_auto_cashouts(&self, state: &mut SchedulerState, round_id: RoundId, current: Multiplier) {
        for wager_id in state.wagers.auto_cashouts_due(round_id, current) {
            if let Err(e) = self.credit_auto_cashout(state, wager_id) {
                warn!(wager_id, "auto-cashout credit failed, retrying next tick: {}", e);
            }
        }
    }

    /// Credit an auto-cashout at its threshold and resolve the wager
    fn credit_auto_cashout(&self, state: &mut SchedulerState, wager_id: WagerId) -> Result<(), LedgerError> {
        let Some((user_id, at, amount)) = state
            .wagers
            .get(wager_id)
            .and_then(|w| Some((w.user_id, w.auto_cashout_at?, w.amount)))
        else {
            return Ok(());
        };

        self.ctx.ledger.credit(user_id, at.payout(amount))?;
        self.finish_wager(state, wager_id, at, Resolution::AutoCashout);
        Ok(())
    }

    /// Live -> Crashed: settle due auto-cashouts, then lose everything still pending.
    ///
    /// Ledger failures hold the crash back for up to `max_settlement_retries`
    /// ticks; after that the round is forced to crash and the unpaid credits
    /// move to the settlement queue. Request-driven attempts retry the
    /// credits but never count towards the limit.
    fn resolve_crash(&self, state: &mut SchedulerState, now: Instant, driver: Driver) -> bool {
        let Some((round_id, outcome)) = state.round.as_ref().map(|r| (r.id, r.outcome())) else {
            return false;
        };

        let mut failed = Vec::new();
        for wager_id in state.wagers.auto_cashouts_due(round_id, outcome) {
            if let Err(e) = self.credit_auto_cashout(state, wager_id) {
                failed.push((wager_id, e));
            }
        }

        if !failed.is_empty() {
            if driver == Driver::Request {
                debug!(round_id, failed = failed.len(), "crash settlement still failing, held until next tick");
                return false;
            }
            state.settlement_retries += 1;
            self.ctx.metrics.settlement_retries.inc();

            if state.settlement_retries <= self.config.max_settlement_retries {
                warn!(
                    round_id,
                    failed = failed.len(),
                    retry = state.settlement_retries,
                    "crash settlement failed, retrying next tick"
                );
                return false;
            }

            error!(
                round_id,
                failed = failed.len(),
                "settlement retries exhausted, forcing crash"
            );
            for (wager_id, cause) in failed {
                let Some((user_id, at, amount)) = state
                    .wagers
                    .get(wager_id)
                    .and_then(|w| Some((w.user_id, w.auto_cashout_at?, w.amount)))
                else {
                    continue;
                };
                if self.finish_wager(state, wager_id, at, Resolution::AutoCashout).is_some() {
                    state.settlements.enqueue(
                        wager_id,
                        user_id,
                        at.payout(amount),
                        format!("auto cashout in round {}", round_id),
                        &cause,
                    );
                }
            }
        }
        state.settlement_retries = 0;

        let lost = state.wagers.pending_for_round(round_id);
        for wager_id in &lost {
            self.finish_wager(state, *wager_id, outcome, Resolution::Lost);
        }

        if let Some(round) = state.round.as_mut() {
            round.crash(now);
            if let Some(entry) = round.history_entry() {
                state.history.push(entry);
            }
        }

        self.ctx.metrics.rounds_completed.inc();
        self.ctx.metrics.set_phase(RoundPhase::Crashed);
        info!(round_id, crash_point = %outcome, lost = lost.len(), "round crashed");
        true
    }

    fn retry_settlements(&self, state: &mut SchedulerState) {
        if state.settlements.is_empty() {
            return;
        }
        let pass = state.settlements.retry(self.ctx.ledger.as_ref());
        self.ctx.metrics.settlements_parked.inc_by(pass.parked as u64);
    }

    fn finish_wager(
        &self,
        state: &mut SchedulerState,
        wager_id: WagerId,
        multiplier: Multiplier,
        resolution: Resolution,
    ) -> Option<Wager> {
        match state.wagers.resolve(wager_id, multiplier, resolution) {
            Ok(wager) => {
                self.record(&wager);
                debug!(wager_id, %multiplier, ?resolution, "wager resolved");
                Some(wager)
            }
            Err(e) => {
                warn!(wager_id, "could not resolve wager: {}", e);
                None
            }
        }
    }

    fn record(&self, wager: &Wager) {
        let multiplier = wager.resolved_at_multiplier.unwrap_or(Multiplier::ONE);
        match wager.resolution {
            Some(Resolution::Lost) => self.ctx.metrics.wagers_lost.inc(),
            Some(_) => self.ctx.metrics.wagers_won.inc(),
            None => return,
        }

        self.ctx.history.record(GameRecord {
            user_id: wager.user_id,
            game_type: GameType::Crash,
            bet_amount: wager.amount,
            multiplier,
            profit: wager.profit.unwrap_or_default(),
            game_data: GameData::Crash {
                round_id: wager.round_id,
                wager_id: wager.id,
                auto_cashout_at: wager.auto_cashout_at,
            },
            timestamp: wager.resolved_at.unwrap_or_else(Utc::now),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::games::outcome::ScriptedOutcomes;
    use crate::history::GameHistory;
    use crate::ledger::{Ledger, MemoryLedger};
    use crate::metrics::GameMetrics;
    use crate::sink::NullSink;

    struct Harness {
        scheduler: Arc<RoundScheduler>,
        clock: ManualClock,
        ledger: MemoryLedger,
        script: Arc<ScriptedOutcomes>,
    }

    fn m(h: u64) -> Multiplier {
        Multiplier::from_hundredths(h)
    }

    fn harness(outcomes: &[u64]) -> Harness {
        let clock = ManualClock::new();
        let ledger = MemoryLedger::new();
        ledger.open_account(1, 1_000);
        ledger.open_account(2, 1_000);

        let script = Arc::new(ScriptedOutcomes::new(m(200)));
        for h in outcomes {
            script.push_crash(m(*h));
        }

        let ctx = GameContext {
            ledger: Arc::new(ledger.clone()),
            outcomes: script.clone(),
            clock: Arc::new(clock.clone()),
            history: Arc::new(GameHistory::new(50)),
            metrics: Arc::new(GameMetrics::new().unwrap()),
        };
        let scheduler = Arc::new(RoundScheduler::new(CrashConfig::default(), ctx, Arc::new(NullSink)));

        Harness {
            scheduler,
            clock,
            ledger,
            script,
        }
    }

    #[tokio::test]
    async fn test_first_tick_opens_waiting_round() {
        let h = harness(&[350]);
        let snapshot = h.scheduler.tick().await.unwrap();

        assert_eq!(snapshot.round_id, 1);
        assert_eq!(snapshot.phase, RoundPhase::Waiting);
        assert_eq!(snapshot.countdown_ms, Some(10_000));
        assert_eq!(snapshot.crash_point, None);
    }

    #[tokio::test]
    async fn test_auto_cashout_resolves_at_threshold() {
        let h = harness(&[350]);
        h.scheduler.tick().await;
        let wager = h.scheduler.place_bet(1, 1, 100, Some(m(200))).await.unwrap();

        h.clock.advance_ms(10_000);
        let live = h.scheduler.tick().await.unwrap();
        assert_eq!(live.phase, RoundPhase::Live);

        loop {
            h.clock.advance_ms(200);
            let snapshot = h.scheduler.tick().await.unwrap();
            let current = h.scheduler.wager(wager.id).await.unwrap();

            if snapshot.current_multiplier >= m(200) {
                assert_eq!(current.resolution, Some(Resolution::AutoCashout));
                assert_eq!(current.resolved_at_multiplier, Some(m(200)));
                assert_eq!(current.profit, Some(100));
                break;
            }
            assert!(current.is_pending());
        }

        assert_eq!(h.ledger.balance(1).unwrap(), 1_100);
    }

    #[tokio::test]
    async fn test_crash_loses_pending_wagers_and_reveals_outcome() {
        let h = harness(&[150]);
        h.scheduler.tick().await;
        let manual = h.scheduler.place_bet(1, 1, 100, None).await.unwrap();
        let high_auto = h.scheduler.place_bet(2, 1, 50, Some(m(300))).await.unwrap();

        h.clock.advance_ms(10_000 + 60_000);
        let snapshot = h.scheduler.tick().await.unwrap();

        assert_eq!(snapshot.phase, RoundPhase::Crashed);
        assert_eq!(snapshot.crash_point, Some(m(150)));
        assert_eq!(snapshot.current_multiplier, m(150));
        assert_eq!(snapshot.history.len(), 1);
        assert_eq!(snapshot.history[0].outcome_multiplier, m(150));

        for id in [manual.id, high_auto.id] {
            let wager = h.scheduler.wager(id).await.unwrap();
            assert_eq!(wager.resolution, Some(Resolution::Lost));
            assert_eq!(wager.profit, Some(-(wager.amount as i64)));
            assert!(wager.resolved_at_multiplier.unwrap() <= m(150));
        }
        assert_eq!(h.ledger.balance(1).unwrap(), 900);
        assert_eq!(h.ledger.balance(2).unwrap(), 950);
    }

    #[tokio::test]
    async fn test_insufficient_balance_creates_no_wager() {
        let h = harness(&[350]);
        h.scheduler.tick().await;

        let err = h.scheduler.place_bet(1, 1, 5_000, None).await.unwrap_err();
        assert_eq!(
            err,
            GameError::InsufficientBalance {
                needed: 5_000,
                available: 1_000
            }
        );
        assert_eq!(h.ledger.balance(1).unwrap(), 1_000);
        assert!(h.scheduler.round_wagers(1).await.is_empty());
    }

    #[tokio::test]
    async fn test_cashout_validates_against_round_clock() {
        let h = harness(&[350]);
        h.scheduler.tick().await;
        let wager = h.scheduler.place_bet(1, 1, 100, None).await.unwrap();

        assert_eq!(
            h.scheduler.cashout(wager.id, m(100)).await,
            Err(GameError::RoundNotLive { round_id: 1 })
        );

        h.clock.advance_ms(10_000 + 2_000);
        let current = h.scheduler.snapshot().await.unwrap().current_multiplier;
        assert!(current > Multiplier::ONE);

        let greedy = m(current.hundredths() + 5);
        assert!(matches!(
            h.scheduler.cashout(wager.id, greedy).await,
            Err(GameError::InvalidMultiplier { .. })
        ));
        assert!(h.scheduler.wager(wager.id).await.unwrap().is_pending());

        let resolved = h.scheduler.cashout(wager.id, current).await.unwrap();
        assert_eq!(resolved.resolved_at_multiplier, Some(current));
        let balance = h.ledger.balance(1).unwrap();
        assert_eq!(balance, 900 + current.payout(100));

        assert_eq!(
            h.scheduler.cashout(wager.id, current).await,
            Err(GameError::AlreadyResolved)
        );
        assert_eq!(h.ledger.balance(1).unwrap(), balance);
    }

    #[tokio::test]
    async fn test_betting_window_closes_at_cutoff() {
        let h = harness(&[1_000]);
        h.scheduler.tick().await;

        assert_eq!(
            h.scheduler.place_bet(1, 2, 10, None).await,
            Err(GameError::RoundClosed { round_id: 2 })
        );

        h.clock.advance_ms(10_000);
        let early = h.scheduler.place_bet(1, 1, 10, None).await.unwrap();
        assert_eq!(early.entry_multiplier, Multiplier::ONE);

        // Walk the live curve past the cutoff
        loop {
            h.clock.advance_ms(200);
            let snapshot = h.scheduler.tick().await.unwrap();
            if snapshot.current_multiplier >= m(120) {
                break;
            }
        }
        assert_eq!(
            h.scheduler.place_bet(2, 1, 10, None).await,
            Err(GameError::RoundClosed { round_id: 1 })
        );
    }

    #[tokio::test]
    async fn test_live_bet_rejects_auto_cashout_below_entry() {
        let h = harness(&[1_000]);
        h.scheduler.tick().await;
        h.clock.advance_ms(10_000);

        loop {
            h.clock.advance_ms(100);
            let current = h.scheduler.tick().await.unwrap().current_multiplier;
            if current > m(105) {
                break;
            }
        }

        assert!(matches!(
            h.scheduler.place_bet(1, 1, 10, Some(m(101))).await,
            Err(GameError::InvalidAutoCashout(_))
        ));
        assert_eq!(h.ledger.balance(1).unwrap(), 1_000);
    }

    #[tokio::test]
    async fn test_invalid_bet_parameters() {
        let h = harness(&[350]);
        h.scheduler.tick().await;

        assert_eq!(h.scheduler.place_bet(1, 1, 0, None).await, Err(GameError::InvalidAmount));
        assert_eq!(
            h.scheduler.place_bet(1, 1, 10, Some(m(100))).await,
            Err(GameError::InvalidAutoCashout(m(100)))
        );
        assert_eq!(
            h.scheduler.place_bet(1, 1, 10, Some(m(9_999))).await,
            Err(GameError::InvalidAutoCashout(m(9_999)))
        );
        assert_eq!(
            h.scheduler.cashout(42, m(150)).await,
            Err(GameError::WagerNotFound(42))
        );
    }

    #[tokio::test]
    async fn test_pause_then_next_round() {
        let h = harness(&[150, 420]);
        h.scheduler.tick().await;

        h.clock.advance_ms(10_000 + 60_000);
        let crashed = h.scheduler.tick().await.unwrap();
        assert_eq!(crashed.phase, RoundPhase::Crashed);

        h.clock.advance_ms(4_000);
        assert_eq!(h.scheduler.tick().await.unwrap().round_id, 1);

        h.clock.advance_ms(1_000);
        let next = h.scheduler.tick().await.unwrap();
        assert_eq!(next.round_id, 2);
        assert_eq!(next.phase, RoundPhase::Waiting);
        assert_eq!(next.crash_point, None);
        assert_eq!(next.history.len(), 1);
    }

    #[tokio::test]
    async fn test_outcome_failure_is_retried_next_tick() {
        let h = harness(&[250]);
        h.script.fail_next(2);

        assert!(h.scheduler.tick().await.is_none());
        assert!(h.scheduler.tick().await.is_none());

        let snapshot = h.scheduler.tick().await.unwrap();
        assert_eq!(snapshot.round_id, 1);
        assert_eq!(snapshot.phase, RoundPhase::Waiting);
    }

    #[tokio::test]
    async fn test_run_loop_stops_on_shutdown() {
        let h = harness(&[250]);
        let (tx, rx) = watch::channel(false);
        let handle = h.scheduler.spawn(rx);

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(h.scheduler.snapshot().await.unwrap().round_id, 1);
    }
}
