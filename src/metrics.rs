//! Prometheus metrics for both games

use crate::games::round::RoundPhase;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

pub struct GameMetrics {
    registry: Registry,
    pub rounds_completed: IntCounter,
    pub wagers_placed: IntCounter,
    pub wagers_won: IntCounter,
    pub wagers_lost: IntCounter,
    pub mines_started: IntCounter,
    pub mines_lost: IntCounter,
    pub mines_cashed_out: IntCounter,
    pub settlement_retries: IntCounter,
    pub settlements_parked: IntCounter,
    pub outcome_failures: IntCounter,
    /// 0 waiting, 1 live, 2 crashed
    pub round_phase: IntGauge,
}

impl GameMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("starpit".to_string()), None)?;

        let round_phase = IntGauge::new("crash_round_phase", "Current round phase (0 waiting, 1 live, 2 crashed)")?;
        registry.register(Box::new(round_phase.clone()))?;

        Ok(Self {
            rounds_completed: register_counter(&registry, "crash_rounds_completed_total", "Crash rounds that reached the crash point")?,
            wagers_placed: register_counter(&registry, "crash_wagers_placed_total", "Crash wagers accepted")?,
            wagers_won: register_counter(&registry, "crash_wagers_won_total", "Crash wagers cashed out")?,
            wagers_lost: register_counter(&registry, "crash_wagers_lost_total", "Crash wagers lost to the crash")?,
            mines_started: register_counter(&registry, "mines_sessions_started_total", "Mines sessions started")?,
            mines_lost: register_counter(&registry, "mines_sessions_lost_total", "Mines sessions that hit a mine")?,
            mines_cashed_out: register_counter(&registry, "mines_sessions_cashed_out_total", "Mines sessions cashed out")?,
            settlement_retries: register_counter(&registry, "settlement_retries_total", "Ticks a crash was held back by ledger failures")?,
            settlements_parked: register_counter(&registry, "settlements_parked_total", "Deferred credits needing manual intervention")?,
            outcome_failures: register_counter(&registry, "outcome_failures_total", "Failed outcome generations")?,
            round_phase,
            registry,
        })
    }

    pub fn set_phase(&self, phase: RoundPhase) {
        self.round_phase.set(match phase {
            RoundPhase::Waiting => 0,
            RoundPhase::Live => 1,
            RoundPhase::Crashed => 2,
        });
    }

    /// Prometheus text exposition format
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

fn register_counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounter> {
    let counter = IntCounter::new(name, help)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}
