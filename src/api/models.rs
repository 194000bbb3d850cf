//! API Request and Response Models

use crate::games::{
    mines::SessionSnapshot,
    types::{GameRecord, Multiplier, RoundId, SessionId, UserId, WagerId},
    wagers::Wager,
};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// POST /api/crash/bet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceBetRequest {
    pub user_id: UserId,
    pub round_id: RoundId,
    pub amount: u64,
    #[serde(default)]
    pub auto_cashout_at: Option<Multiplier>,
}

/// POST /api/crash/cashout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashCashoutRequest {
    pub wager_id: WagerId,
    /// Multiplier the client saw when cashing out
    pub multiplier: Multiplier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WagerResponse {
    pub wager: Wager,
    pub balance: u64,
}

/// POST /api/mines/start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartMinesRequest {
    pub user_id: UserId,
    pub bet_amount: u64,
    /// Range-checked by the handler so oversized values get a game error
    pub mine_count: i64,
}

/// POST /api/mines/reveal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevealRequest {
    pub session_id: SessionId,
    pub position: i64,
}

/// POST /api/mines/cashout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinesCashoutRequest {
    pub session_id: SessionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session: SessionSnapshot,
    pub balance: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub user_id: UserId,
    pub balance: u64,
}

/// GET /api/history/:user_id?limit=
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    20
}

/// Largest page a history request may ask for
pub const MAX_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub user_id: UserId,
    pub games: Vec<GameRecord>,
}
