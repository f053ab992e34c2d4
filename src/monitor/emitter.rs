//! Snapshot fan-out.
//!
//! Publishing never blocks the ingest path: each subscriber has a bounded
//! buffer and a full buffer drops the snapshot for that subscriber only.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Sender, TrySendError};

use crate::progress::ProgressSnapshot;

use super::stream::{SnapshotStream, SubscriptionId};

#[derive(Debug)]
struct Subscriber {
    id: SubscriptionId,
    tx: Sender<ProgressSnapshot>,
}

/// Publishes one session's snapshots to its subscribers.
#[derive(Debug)]
pub struct SnapshotEmitter {
    capacity: usize,
    subscribers: Vec<Subscriber>,
    dropped: Arc<AtomicU64>,
    closed: bool,
}

impl SnapshotEmitter {
    /// Creates an emitter whose subscribers buffer up to `capacity` snapshots.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Vec::new(),
            dropped: Arc::new(AtomicU64::new(0)),
            closed: false,
        }
    }

    /// Adds a subscriber that sees only future snapshots.
    ///
    /// A closed emitter hands out a stream that is already finished.
    pub fn subscribe(&mut self) -> SnapshotStream {
        let id = SubscriptionId::new();
        let (tx, rx) = bounded::<ProgressSnapshot>(self.capacity);
        if !self.closed {
            self.subscribers.push(Subscriber { id, tx });
        }
        SnapshotStream::new(id, rx)
    }

    /// Sends `snapshot` to every live subscriber and prunes disconnected ones.
    pub fn publish(&mut self, snapshot: &ProgressSnapshot) {
        let dropped = &self.dropped;
        self.subscribers.retain(|sub| match sub.tx.try_send(snapshot.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(subscription = ?sub.id, "subscriber buffer full, snapshot dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    /// Ends every stream. Later subscriptions finish immediately.
    pub fn close(&mut self) {
        self.closed = true;
        self.subscribers.clear();
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Snapshots dropped because a subscriber was too slow.
    #[must_use]
    pub fn dropped_snapshots(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
