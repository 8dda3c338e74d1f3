//! # Notice bus for broadcasting core state changes.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking notice publishing from the intake loop toward the
//! presentation boundary.
//!
//! ## Architecture
//! ```text
//! Publisher (one):                    Subscribers (many):
//!   intake loop ──────► Bus ───────► notice listener ────► SubscriberSet
//!                 (broadcast chan)                     (web / RPC / logging)
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; it calls `broadcast::Sender::send`.
//! - **Bounded capacity**: a single ring buffer stores recent notices for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: notices are lost if there are no active subscribers at send time.
//!   The authoritative state lives in the cluster context; notices are a change feed.

use tokio::sync::broadcast;

use super::event::Notice;

/// Broadcast channel for core notices.
///
/// Thin wrapper over [`tokio::sync::broadcast`] that provides a
/// `publish`/`subscribe` API. Subscribers receive clones of each notice.
///
/// ### Properties
/// - **Non-blocking**: `publish()` returns immediately.
/// - **Fire-and-forget**: no delivery or durability guarantees.
/// - **Cloneable**: cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Notice>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity.
    ///
    /// Capacity is shared across all receivers; the minimum is 1 (clamped).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Notice>(capacity);
        Self { tx }
    }

    /// Publishes a notice to all active subscribers.
    ///
    /// If there are no receivers, the notice is dropped and this still
    /// returns immediately.
    pub fn publish(&self, notice: Notice) {
        let _ = self.tx.send(notice);
    }

    /// Creates a new receiver that will observe subsequent notices.
    ///
    /// A receiver only gets notices sent after it subscribes; slow receivers
    /// observe `RecvError::Lagged(n)` and skip over missed items.
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }
}
