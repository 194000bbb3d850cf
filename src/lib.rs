//! starpit - server-authoritative crash and mines games
//!
//! The crash game runs one global round at a time: a hidden outcome is drawn
//! when the round opens, the live multiplier is derived from wall-clock time,
//! and every wager resolves exactly once (cashout, auto-cashout or crash).
//! Mines sessions are per-user reveal games with a monotonically increasing
//! payout.
//!
//! The engines live in [`games`] and only see the outside world through the
//! [`ledger::Ledger`], [`sink::StateSink`], [`clock::Clock`] and
//! [`games::outcome::OutcomeGenerator`] traits. [`api`] is an axum adapter.

pub mod api;
pub mod clock;
pub mod config;
pub mod errors;
pub mod games;
pub mod history;
pub mod ledger;
pub mod metrics;
pub mod sink;

pub use errors::{GameError, GameResult, LedgerError, StarpitError, StarpitResult};
