//! Delivery of round snapshots to observers.
//!
//! Publishing is best-effort and never blocks the scheduler: a dropped
//! snapshot only affects observer freshness.

use crate::games::round::RoundSnapshot;
use tokio::sync::{broadcast, watch};
use tracing::trace;

pub trait StateSink: Send + Sync {
    fn publish(&self, snapshot: &RoundSnapshot);
}

/// Discards every snapshot
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl StateSink for NullSink {
    fn publish(&self, _snapshot: &RoundSnapshot) {}
}

/// Pushes snapshots to subscribers and keeps the latest one for polling
#[derive(Debug)]
pub struct BroadcastSink {
    tx: broadcast::Sender<RoundSnapshot>,
    latest: watch::Sender<Option<RoundSnapshot>>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        let (latest, _) = watch::channel(None);
        Self { tx, latest }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoundSnapshot> {
        self.tx.subscribe()
    }

    pub fn watch(&self) -> watch::Receiver<Option<RoundSnapshot>> {
        self.latest.subscribe()
    }

    pub fn latest(&self) -> Option<RoundSnapshot> {
        self.latest.borrow().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl StateSink for BroadcastSink {
    fn publish(&self, snapshot: &RoundSnapshot) {
        self.latest.send_replace(Some(snapshot.clone()));

        // No subscribers is not an error
        if self.tx.send(snapshot.clone()).is_err() {
            trace!(round_id = snapshot.round_id, "no snapshot subscribers");
        }
    }
}
