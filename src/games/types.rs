use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Player account identifier
pub type UserId = u64;

/// Crash round identifier (sequential)
pub type RoundId = u64;

/// Crash wager identifier (sequential)
pub type WagerId = u64;

/// Mines session identifier
pub type SessionId = Uuid;

/// Payout multiplier on a fixed two-decimal grid.
///
/// Stored as hundredths (`100` = 1.00x) so that every multiplier the server
/// computes, publishes or compares is exact. Serializes to JSON as a float.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "f64", from = "f64")]
pub struct Multiplier(u64);

impl Multiplier {
    pub const ONE: Multiplier = Multiplier(100);

    pub const fn from_hundredths(hundredths: u64) -> Self {
        Self(hundredths)
    }

    pub const fn hundredths(self) -> u64 {
        self.0
    }

    /// Floor an arbitrary float onto the grid. Negative and non-finite
    /// inputs map to zero.
    pub fn from_f64_floor(value: f64) -> Self {
        if !value.is_finite() || value <= 0.0 {
            return Self(0);
        }
        // Nudge by a tiny epsilon so 2.35 (stored as 2.34999...) floors to 2.35
        Self(((value * 100.0) + 1e-9).floor() as u64)
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// `floor(amount * self)` in integer arithmetic
    pub fn payout(self, amount: u64) -> u64 {
        let scaled = (amount as u128 * self.0 as u128) / 100;
        u64::try_from(scaled).unwrap_or(u64::MAX)
    }

    /// `floor(amount * self) - amount`
    pub fn profit(self, amount: u64) -> i64 {
        let payout = self.payout(amount) as i128;
        let profit = payout - amount as i128;
        profit.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}x", self.0 / 100, self.0 % 100)
    }
}

impl From<Multiplier> for f64 {
    fn from(m: Multiplier) -> Self {
        m.as_f64()
    }
}

impl From<f64> for Multiplier {
    fn from(value: f64) -> Self {
        Multiplier::from_f64_floor(value)
    }
}

/// Supported game types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    Crash,
    Mines,
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameType::Crash => write!(f, "crash"),
            GameType::Mines => write!(f, "mines"),
        }
    }
}

/// Settled game, one per resolved wager or finished mines session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRecord {
    pub user_id: UserId,
    pub game_type: GameType,
    pub bet_amount: u64,
    /// Final multiplier (the crash point for a lost wager, 0 for a lost mines session)
    pub multiplier: Multiplier,
    pub profit: i64,
    pub game_data: GameData,
    pub timestamp: DateTime<Utc>,
}

/// Game-specific data (discriminated union)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "game", rename_all = "lowercase")]
pub enum GameData {
    Crash {
        round_id: RoundId,
        wager_id: WagerId,
        #[serde(skip_serializing_if = "Option::is_none")]
        auto_cashout_at: Option<Multiplier>,
    },
    Mines {
        session_id: SessionId,
        mine_count: u8,
        mine_layout: Vec<u8>,
        revealed: Vec<u8>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiplier_display_and_grid() {
        assert_eq!(Multiplier::ONE.to_string(), "1.00x");
        assert_eq!(Multiplier::from_hundredths(3507).to_string(), "35.07x");
        assert_eq!(Multiplier::from_f64_floor(2.35), Multiplier::from_hundredths(235));
        assert_eq!(Multiplier::from_f64_floor(2.359), Multiplier::from_hundredths(235));
        assert_eq!(Multiplier::from_f64_floor(-1.0), Multiplier::from_hundredths(0));
    }

    #[test]
    fn test_payout_floors() {
        let m = Multiplier::from_hundredths(155);
        assert_eq!(m.payout(101), 156); // 156.55 floored
        assert_eq!(m.profit(101), 55);
        assert_eq!(Multiplier::from_hundredths(200).profit(100), 100);
        assert_eq!(Multiplier::ONE.profit(100), 0);
    }

    #[test]
    fn test_multiplier_json_is_float() {
        let json = serde_json::to_string(&Multiplier::from_hundredths(212)).unwrap();
        assert_eq!(json, "2.12");

        let parsed: Multiplier = serde_json::from_str("3.5").unwrap();
        assert_eq!(parsed, Multiplier::from_hundredths(350));
    }
}
