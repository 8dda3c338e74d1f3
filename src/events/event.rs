//! # Notices emitted by the reconciliation core.
//!
//! The [`NoticeKind`] enum classifies notices across four categories:
//! - **Node notices**: liveness transitions and isolation
//! - **Status notices**: process/application state and failure-flag changes
//! - **Cluster notices**: FSM transitions, master election
//! - **Conflict notices**: conflict detection, conciliation actions, remote-call outcomes
//!
//! The [`Notice`] struct carries additional metadata such as timestamps,
//! node/process identifiers and reasons.
//!
//! ## Ordering guarantees
//! Each notice has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore exact order when notices are delivered
//! out of order.
//!
//! ## Example
//! ```rust
//! use clustervisor::{Notice, NoticeKind};
//!
//! let n = Notice::new(NoticeKind::ConflictDetected)
//!     .with_process("web:worker")
//!     .with_reason("running on [n1, n2]");
//!
//! assert_eq!(n.kind, NoticeKind::ConflictDetected);
//! assert_eq!(n.process.as_deref(), Some("web:worker"));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::SystemTime;

/// Global sequence counter for notice ordering.
static NOTICE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of core notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    // === Node notices ===
    /// A node changed liveness state.
    ///
    /// Sets:
    /// - `node`: node name
    /// - `reason`: new state (e.g., "running", "silent", "isolated")
    NodeStateChanged,

    /// A node was isolated; its transport subscription is being torn down.
    ///
    /// Sets:
    /// - `node`: node name
    NodeIsolated,

    // === Status notices ===
    /// A process changed aggregated state.
    ///
    /// Sets:
    /// - `process`: namespec
    /// - `node`: node that reported the triggering event, if any
    /// - `reason`: new state
    ProcessStateChanged,

    /// An application changed aggregated state or failure flags.
    ///
    /// Sets:
    /// - `process`: application name
    /// - `reason`: new state plus failure flags
    ApplicationStateChanged,

    /// The core asks the external starter to run a process again
    /// (running-failure remedy).
    ///
    /// Sets:
    /// - `process`: namespec, or application name for a full restart
    /// - `reason`: which remedy requested it
    RestartRequested,

    // === Cluster notices ===
    /// The cluster FSM moved to a new state.
    ///
    /// Sets:
    /// - `reason`: new state name
    ClusterStateChanged,

    /// A master node was elected or replaced.
    ///
    /// Sets:
    /// - `node`: master name
    MasterElected,

    // === Conflict notices ===
    /// A process was detected running on more than one node.
    ///
    /// Sets:
    /// - `process`: namespec
    /// - `reason`: the running node set
    ConflictDetected,

    /// A previously conflicted process is back to at most one running node.
    ///
    /// Sets:
    /// - `process`: namespec
    ConflictResolved,

    /// A conciliation strategy issued stop requests for a conflict.
    ///
    /// Sets:
    /// - `process`: namespec
    /// - `node`: retained node, if any
    /// - `reason`: strategy name
    ConciliationApplied,

    /// A remediation request was not confirmed by the control endpoint.
    ///
    /// Sets:
    /// - `node`: target endpoint
    /// - `process`: namespec, if the request was process-scoped
    /// - `reason`: remote error message
    RemoteCallFailed,

    /// A transport receive failed; the message was dropped.
    ///
    /// Sets:
    /// - `reason`: transport error message
    TransportFailed,
}

/// Core notice with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`NoticeKind`]
#[derive(Clone, Debug)]
pub struct Notice {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Notice classification.
    pub kind: NoticeKind,
    /// Node name, if applicable.
    pub node: Option<Arc<str>>,
    /// Process namespec or application name, if applicable.
    pub process: Option<Arc<str>>,
    /// Human-readable detail (states, errors, node sets).
    pub reason: Option<Arc<str>>,
}

impl Notice {
    /// Creates a new notice of the given kind with current timestamp and next
    /// sequence number.
    pub fn new(kind: NoticeKind) -> Self {
        Self {
            seq: NOTICE_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            node: None,
            process: None,
            reason: None,
        }
    }

    /// Attaches a node name.
    #[inline]
    pub fn with_node(mut self, node: impl Into<Arc<str>>) -> Self {
        self.node = Some(node.into());
        self
    }

    /// Attaches a process namespec (or application name).
    #[inline]
    pub fn with_process(mut self, process: impl Into<Arc<str>>) -> Self {
        self.process = Some(process.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
