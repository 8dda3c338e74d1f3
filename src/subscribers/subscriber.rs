//! # Notice subscriber trait.
//!
//! Provides [`Subscribe`], the extension point for plugging custom notice
//! consumers into the runtime.
//!
//! Each subscriber gets:
//! - **Dedicated worker task** (runs independently)
//! - **Per-subscriber bounded queue** (capacity via [`Subscribe::queue_capacity`])
//! - **Panic isolation** (panics are caught and reported on stderr)
//!
//! ## Architecture
//! ```text
//! SubscriberSet ──► [bounded queue] ──► worker task ──► subscriber.on_notice()
//! ```
//!
//! ## Rules
//! - A slow subscriber only affects its own queue.
//! - Queue overflow drops the notice **for this subscriber only**; other
//!   subscribers are unaffected.
//! - Notices are processed sequentially (FIFO) per subscriber.
//! - Subscribers do not block the intake loop or each other.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use clustervisor::{Notice, NoticeKind, Subscribe};
//!
//! struct ConflictCounter;
//!
//! #[async_trait]
//! impl Subscribe for ConflictCounter {
//!     async fn on_notice(&self, notice: &Notice) {
//!         if matches!(notice.kind, NoticeKind::ConflictDetected) {
//!             // export a metric, feed a UI, etc.
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "conflicts" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Notice;

/// Notice subscriber for observing the reconciliation core.
///
/// Each subscriber runs in isolation:
/// - **Bounded queue** buffers notices (capacity via [`Self::queue_capacity`]).
/// - **Dedicated worker task** processes notices sequentially (FIFO).
/// - **Panic isolation**: panics are caught and reported on stderr.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; do not panic.
/// - Slow processing affects only this subscriber's queue.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single notice.
    ///
    /// Called from a dedicated worker task, never from the intake loop.
    /// Notices are delivered in FIFO order per subscriber; use
    /// [`Notice::seq`](crate::events::Notice) to restore the global order
    /// across subscribers.
    async fn on_notice(&self, notice: &Notice);

    /// Returns the subscriber name used in overflow/panic reports.
    ///
    /// Prefer short, descriptive names (e.g., "web", "rpc-relay", "log").
    /// The default uses `type_name::<Self>()`, which can be verbose.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns the preferred queue capacity for this subscriber.
    ///
    /// On overflow the new notice is dropped for this subscriber only.
    /// The runtime clamps capacity to a minimum of 1. Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
