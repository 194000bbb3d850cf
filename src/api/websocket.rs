//! WebSocket push of crash round updates
//!
//! Every scheduler snapshot becomes a `crash_update` event. Phase changes
//! additionally produce `crash_ended` and `crash_new_game` events, derived
//! per connection by comparing consecutive snapshots.

use super::handlers::AppState;
use crate::games::round::{CrashHistoryEntry, RoundPhase, RoundSnapshot};
use crate::games::types::{Multiplier, RoundId};
use crate::sink::BroadcastSink;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Seconds between heartbeats on an idle connection
const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// WebSocket event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsEvent {
    /// Periodic round state
    #[serde(rename = "crash_update")]
    CrashUpdate(RoundSnapshot),

    /// Round reached its crash point
    #[serde(rename = "crash_ended")]
    CrashEnded {
        round_id: RoundId,
        crash_point: Multiplier,
        history: Vec<CrashHistoryEntry>,
    },

    /// A new round opened for bets
    #[serde(rename = "crash_new_game")]
    CrashNewGame { round_id: RoundId, countdown_ms: u64 },

    /// Heartbeat to keep connection alive
    #[serde(rename = "heartbeat")]
    Heartbeat { timestamp: i64 },

    #[serde(rename = "error")]
    Error { message: String },
}

/// Events to emit for `next`, given the previous snapshot seen on the connection
pub fn events_for(previous: Option<&RoundSnapshot>, next: &RoundSnapshot) -> Vec<WsEvent> {
    let mut events = Vec::with_capacity(2);

    let new_round = previous.map_or(true, |p| p.round_id != next.round_id);
    let phase_changed = previous.map_or(true, |p| p.phase != next.phase);

    if new_round && next.phase == RoundPhase::Waiting {
        events.push(WsEvent::CrashNewGame {
            round_id: next.round_id,
            countdown_ms: next.countdown_ms.unwrap_or_default(),
        });
    }
    if phase_changed && next.phase == RoundPhase::Crashed {
        if let Some(crash_point) = next.crash_point {
            events.push(WsEvent::CrashEnded {
                round_id: next.round_id,
                crash_point,
                history: next.history.clone(),
            });
        }
    }

    events.push(WsEvent::CrashUpdate(next.clone()));
    events
}

/// WebSocket connection manager
pub struct WebSocketManager {
    sink: Arc<BroadcastSink>,
    client_count: AtomicU64,
}

impl WebSocketManager {
    pub fn new(sink: Arc<BroadcastSink>) -> Self {
        Self {
            sink,
            client_count: AtomicU64::new(0),
        }
    }

    pub fn client_count(&self) -> u64 {
        self.client_count.load(Ordering::SeqCst)
    }

    /// Handle individual WebSocket connection
    async fn handle_connection(self: Arc<Self>, socket: WebSocket) {
        let client_id = Uuid::new_v4().to_string();
        let total = self.client_count.fetch_add(1, Ordering::SeqCst) + 1;
        info!("WebSocket client {} connected (total: {})", client_id, total);

        let (mut sender, mut receiver) = socket.split();
        let mut rx = self.sink.subscribe();
        let mut last = self.sink.latest();

        // Send the current state straight away
        if let Some(snapshot) = &last {
            if let Err(e) = send_event(&mut sender, &WsEvent::CrashUpdate(snapshot.clone())).await {
                warn!("Failed to send initial state to client {}: {}", client_id, e);
                self.client_count.fetch_sub(1, Ordering::SeqCst);
                return;
            }
        }

        let receive_id = client_id.clone();
        let receive_task = tokio::spawn(async move {
            while let Some(msg) = receiver.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        debug!("Received message from client {}: {}", receive_id, text);
                    }
                    Ok(Message::Close(_)) => {
                        debug!("Client {} requested close", receive_id);
                        break;
                    }
                    Err(e) => {
                        warn!("WebSocket error from client {}: {}", receive_id, e);
                        break;
                    }
                    _ => {}
                }
            }
        });

        let send_id = client_id.clone();
        let send_task = tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
            heartbeat.tick().await;

            loop {
                let events = tokio::select! {
                    received = rx.recv() => match received {
                        Ok(snapshot) => {
                            let events = events_for(last.as_ref(), &snapshot);
                            last = Some(snapshot);
                            events
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            debug!("Client {} lagged, skipped {} snapshots", send_id, skipped);
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = heartbeat.tick() => vec![WsEvent::Heartbeat {
                        timestamp: chrono::Utc::now().timestamp_millis(),
                    }],
                };

                for event in &events {
                    if send_event(&mut sender, event).await.is_err() {
                        debug!("Client {} disconnected", send_id);
                        return;
                    }
                }
            }
        });

        tokio::select! {
            _ = receive_task => debug!("Receive task completed for client {}", client_id),
            _ = send_task => debug!("Send task completed for client {}", client_id),
        }

        let remaining = self.client_count.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        info!("WebSocket client {} disconnected (remaining: {})", client_id, remaining);
    }
}

async fn send_event<S>(sender: &mut S, event: &WsEvent) -> Result<(), axum::Error>
where
    S: futures_util::Sink<Message, Error = axum::Error> + Unpin,
{
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to serialize event: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text)).await
}

/// GET /ws/crash
pub async fn crash_websocket_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let manager = state.websocket_manager.clone();
    ws.on_upgrade(move |socket| manager.handle_connection(socket))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(round_id: RoundId, phase: RoundPhase) -> RoundSnapshot {
        RoundSnapshot {
            round_id,
            phase,
            current_multiplier: Multiplier::ONE,
            countdown_ms: (phase == RoundPhase::Waiting).then_some(10_000),
            crash_point: (phase == RoundPhase::Crashed).then_some(Multiplier::from_hundredths(250)),
            history: Vec::new(),
        }
    }

    #[test]
    fn test_phase_changes_produce_lifecycle_events() {
        let waiting = snapshot(1, RoundPhase::Waiting);
        let live = snapshot(1, RoundPhase::Live);
        let crashed = snapshot(1, RoundPhase::Crashed);
        let next = snapshot(2, RoundPhase::Waiting);

        let events = events_for(None, &waiting);
        assert!(matches!(events[0], WsEvent::CrashNewGame { round_id: 1, countdown_ms: 10_000 }));

        assert_eq!(events_for(Some(&waiting), &live).len(), 1);

        let events = events_for(Some(&live), &crashed);
        assert!(matches!(events[0], WsEvent::CrashEnded { round_id: 1, .. }));
        assert_eq!(events_for(Some(&crashed), &crashed).len(), 1);

        let events = events_for(Some(&crashed), &next);
        assert!(matches!(events[0], WsEvent::CrashNewGame { round_id: 2, .. }));
    }

    #[test]
    fn test_update_event_is_tagged() {
        let json = serde_json::to_value(WsEvent::CrashUpdate(snapshot(3, RoundPhase::Live))).unwrap();
        assert_eq!(json["type"], "crash_update");
        assert_eq!(json["round_id"], 3);
        assert!(json.get("crash_point").is_none());
    }
}
