//! Snapshot publication for subscribers.
//!
//! Each session owns an emitter; subscribers receive snapshots through a
//! bounded stream handle that ends when the session closes.

/// Per-session fan-out of snapshots.
pub mod emitter;
/// Subscriber stream handle.
pub mod stream;

pub use emitter::SnapshotEmitter;
pub use stream::{SnapshotStream, SubscriptionId};
