//! Request Handlers
//!
//! Thin adapters from HTTP to the game engines. Accounts are opened with
//! the configured starting balance the first time a user is seen.

use super::{
    errors::ApiError,
    middleware::RequestId,
    models::*,
    websocket::WebSocketManager,
};
use crate::{
    games::{
        mines::{MinesEngine, SessionSnapshot},
        round::RoundSnapshot,
        scheduler::RoundScheduler,
        types::{SessionId, UserId, WagerId},
        wagers::Wager,
    },
    history::GameHistory,
    ledger::{Ledger, MemoryLedger},
    metrics::GameMetrics,
};
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub scheduler: Arc<RoundScheduler>,
    pub mines: Arc<MinesEngine>,
    pub ledger: Arc<MemoryLedger>,
    pub history: Arc<GameHistory>,
    pub metrics: Arc<GameMetrics>,
    pub websocket_manager: Arc<WebSocketManager>,
    pub starting_balance: u64,
    pub version: String,
}

impl AppState {
    fn ensure_account(&self, user_id: UserId) -> u64 {
        self.ledger.open_account(user_id, self.starting_balance)
    }

    fn balance_of(&self, request_id: &RequestId, user_id: UserId) -> Result<u64, ApiError> {
        self.ledger
            .balance(user_id)
            .map_err(|e| ApiError::internal_error(request_id.0.clone(), e.to_string()))
    }
}

/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
        version: state.version.clone(),
    })
}

/// GET /api/game-state
pub async fn game_state_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<RoundSnapshot>, ApiError> {
    state
        .scheduler
        .snapshot()
        .await
        .map(Json)
        .ok_or_else(|| ApiError::service_unavailable(request_id.0, "No round has been opened yet".to_string()))
}

/// POST /api/crash/bet
pub async fn place_bet_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<PlaceBetRequest>,
) -> Result<Json<WagerResponse>, ApiError> {
    state.ensure_account(request.user_id);

    let wager = state
        .scheduler
        .place_bet(request.user_id, request.round_id, request.amount, request.auto_cashout_at)
        .await
        .map_err(|e| ApiError::from_game(request_id.0.clone(), e))?;

    wager_response(&state, &request_id, wager)
}

/// POST /api/crash/cashout
pub async fn crash_cashout_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<CrashCashoutRequest>,
) -> Result<Json<WagerResponse>, ApiError> {
    let wager = state
        .scheduler
        .cashout(request.wager_id, request.multiplier)
        .await
        .map_err(|e| ApiError::from_game(request_id.0.clone(), e))?;

    wager_response(&state, &request_id, wager)
}

/// GET /api/crash/wagers/:wager_id
pub async fn wager_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(wager_id): Path<WagerId>,
) -> Result<Json<Wager>, ApiError> {
    state
        .scheduler
        .wager(wager_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found(request_id.0, format!("Wager {} not found", wager_id)))
}

fn wager_response(state: &AppState, request_id: &RequestId, wager: Wager) -> Result<Json<WagerResponse>, ApiError> {
    let balance = state.balance_of(request_id, wager.user_id)?;
    Ok(Json(WagerResponse { wager, balance }))
}

/// POST /api/mines/start
pub async fn mines_start_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartMinesRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let mine_count = state
        .mines
        .mine_count(request.mine_count)
        .map_err(|e| ApiError::from_game(request_id.0.clone(), e))?;
    state.ensure_account(request.user_id);

    let session = state
        .mines
        .start(request.user_id, request.bet_amount, mine_count)
        .map_err(|e| ApiError::from_game(request_id.0.clone(), e))?;

    session_response(&state, &request_id, session)
}

/// POST /api/mines/reveal
pub async fn mines_reveal_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<RevealRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let cell = state
        .mines
        .cell(request.position)
        .map_err(|e| ApiError::from_game(request_id.0.clone(), e))?;
    let session = state
        .mines
        .reveal(request.session_id, cell)
        .map_err(|e| ApiError::from_game(request_id.0.clone(), e))?;

    session_response(&state, &request_id, session)
}

/// POST /api/mines/cashout
pub async fn mines_cashout_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<MinesCashoutRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state
        .mines
        .cashout(request.session_id)
        .map_err(|e| ApiError::from_game(request_id.0.clone(), e))?;

    session_response(&state, &request_id, session)
}

/// GET /api/mines/active/:user_id
pub async fn mines_active_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    state
        .mines
        .active_session(user_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(request_id.0, format!("No active session for user {}", user_id)))
}

/// GET /api/mines/:session_id
pub async fn mines_session_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    state
        .mines
        .session(session_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(request_id.0, format!("Session {} not found", session_id)))
}

fn session_response(
    state: &AppState,
    request_id: &RequestId,
    session: SessionSnapshot,
) -> Result<Json<SessionResponse>, ApiError> {
    let balance = state.balance_of(request_id, session.user_id)?;
    Ok(Json(SessionResponse { session, balance }))
}

/// GET /api/users/:user_id/balance
pub async fn balance_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> Json<BalanceResponse> {
    let balance = state.ensure_account(user_id);
    Json(BalanceResponse { user_id, balance })
}

/// GET /api/history/:user_id?limit=
pub async fn history_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryResponse> {
    let limit = query.limit.clamp(1, MAX_HISTORY_LIMIT);
    Json(HistoryResponse {
        user_id,
        games: state.history.recent(user_id, limit),
    })
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
