use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ExecutionError, ProgressError, ProgressResult};
use crate::progress::ProgressSnapshot;

/// Unique identifier for a subscription.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscription to one session's snapshots.
///
/// Only snapshots published after subscribing are delivered. The stream ends
/// once the session closes; dropping it unsubscribes.
#[derive(Debug)]
pub struct SnapshotStream {
    subscription_id: SubscriptionId,
    rx: Receiver<ProgressSnapshot>,
}

impl SnapshotStream {
    pub(crate) fn new(subscription_id: SubscriptionId, rx: Receiver<ProgressSnapshot>) -> Self {
        Self { subscription_id, rx }
    }

    /// The subscription id backing this stream.
    #[must_use]
    pub const fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    /// Receive the next snapshot (blocking).
    pub fn recv(&self) -> ProgressResult<ProgressSnapshot> {
        self.rx
            .recv()
            .map_err(|_| ProgressError::Execution(ExecutionError::Disconnected))
    }

    /// Receive the next snapshot with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> ProgressResult<ProgressSnapshot> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => ProgressError::Execution(ExecutionError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            RecvTimeoutError::Disconnected => ProgressError::Execution(ExecutionError::Disconnected),
        })
    }

    /// Returns a buffered snapshot without blocking.
    ///
    /// `Ok(None)` means nothing is buffered yet.
    pub fn try_recv(&self) -> ProgressResult<Option<ProgressSnapshot>> {
        match self.rx.try_recv() {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ProgressError::Execution(ExecutionError::Disconnected)),
        }
    }

    /// Drains every buffered snapshot without blocking.
    #[must_use]
    pub fn drain(&self) -> Vec<ProgressSnapshot> {
        self.rx.try_iter().collect()
    }
}

impl Iterator for SnapshotStream {
    type Item = ProgressSnapshot;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.recv().ok()
    }
}
