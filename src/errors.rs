//! Error types for the starpit game engine
//!
//! Caller-visible game errors are all recoverable: a rejected bet or cashout
//! never stops the round loop. Internal faults (ledger outages, outcome
//! generation failures) are retried by the scheduler.

use crate::games::types::{Multiplier, RoundId, SessionId, WagerId};

/// Root error type for all starpit operations
#[derive(Debug, thiserror::Error)]
pub enum StarpitError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Game engine errors
    #[error("Game error: {0}")]
    Game(#[from] GameError),

    /// Ledger errors surfaced outside a game operation
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Server I/O errors (binding sockets, reading files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metric registration errors
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Errors produced by the crash and mines engines
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("Insufficient balance: needed {needed}, available {available}")]
    InsufficientBalance { needed: u64, available: u64 },

    #[error("Round {round_id} is not accepting bets")]
    RoundClosed { round_id: RoundId },

    #[error("Round {round_id} has not gone live yet")]
    RoundNotLive { round_id: RoundId },

    #[error("Wager already resolved")]
    AlreadyResolved,

    #[error("Invalid multiplier: claimed {claimed}, authoritative {authoritative}")]
    InvalidMultiplier {
        claimed: Multiplier,
        authoritative: Multiplier,
    },

    #[error("Invalid auto-cashout threshold: {0}")]
    InvalidAutoCashout(Multiplier),

    #[error("Bet amount must be greater than zero")]
    InvalidAmount,

    #[error("Session is no longer active")]
    SessionTerminal,

    #[error("User already has an active mines session: {0}")]
    ActiveSessionExists(SessionId),

    #[error("Invalid cell {cell} (grid has {total_cells} cells)")]
    InvalidCell { cell: i64, total_cells: u8 },

    #[error("Invalid mine count {mine_count} (allowed {min}..={max})")]
    InvalidMineCount { mine_count: i64, min: u8, max: u8 },

    #[error("Wager not found: {0}")]
    WagerNotFound(WagerId),

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Outcome generation failed: {0}")]
    OutcomeUnavailable(String),

    #[error("Ledger failure: {0}")]
    Ledger(LedgerError),
}

impl From<LedgerError> for GameError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientBalance { needed, available } => {
                GameError::InsufficientBalance { needed, available }
            }
            other => GameError::Ledger(other),
        }
    }
}

/// Errors reported by a [`crate::ledger::Ledger`] implementation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Insufficient balance: needed {needed}, available {available}")]
    InsufficientBalance { needed: u64, available: u64 },

    #[error("Unknown account: {0}")]
    UnknownAccount(u64),

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Balance overflow for account {0}")]
    Overflow(u64),
}

/// Configuration and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

impl ConfigurationError {
    pub(crate) fn invalid(field: &str, value: impl ToString, reason: &str) -> Self {
        ConfigurationError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Convenience type alias for Results
pub type StarpitResult<T> = Result<T, StarpitError>;

/// Result type for engine operations
pub type GameResult<T> = Result<T, GameError>;
