//! # Transport, remediation and statistics boundaries.
//!
//! The reconciliation core never talks to the network itself. It consumes a
//! stream of decoded fleet messages and produces control calls, through the
//! traits defined here:
//!
//! - [`EventStream`] - per-node publishers feed tick/process/statistics
//!   messages; the intake loop polls it with a bounded timeout.
//! - [`ControlClient`] - remediation calls (`stop_process`, `restart`,
//!   `shutdown`). Implementations must not block: a call either hands the
//!   request to an RPC worker or fails with [`RemoteError`]. The core treats
//!   errors as "request not confirmed" and never retries on its own.
//! - [`StatsSink`] - opaque statistics payloads, handed over untouched.
//!
//! ## Delivery contract
//! At-most-once, unordered across nodes, ordered per node. Lost messages are
//! covered by the liveness timeout, not by retransmission.
//!
//! ```text
//! node n1 ──┐
//! node n2 ──┼──► EventStream::recv() ──► intake loop ──► ControlClient (master)
//! node nN ──┘         (decoded ClusterMessage)      └──► StatsSink
//! ```

use async_trait::async_trait;

use crate::error::{RemoteError, TransportError};
use crate::status::ProcessState;

/// One decoded process snapshot, as reported by a node's local supervisor.
#[derive(Clone, Debug)]
pub struct ProcessUpdate {
    /// Application (group) name.
    pub application: String,
    /// Process name inside the application.
    pub process: String,
    /// Reported process state on that node.
    pub state: ProcessState,
    /// For EXITED states: whether the exit code was expected.
    pub expected_exit: bool,
    /// Seconds the process has been running on that node (0 if not running).
    pub uptime: u64,
}

impl ProcessUpdate {
    /// The unique `application:process` identifier.
    pub fn namespec(&self) -> String {
        format!("{}:{}", self.application, self.process)
    }
}

/// One decoded fleet message.
///
/// The three kinds map to the transport's header tokens; decoding happens
/// once at the boundary, the core only ever matches this enum.
#[derive(Clone, Debug)]
pub enum ClusterMessage {
    /// Periodic heartbeat from a node.
    Tick {
        /// Emitting node.
        node: String,
        /// Remote wall-clock timestamp, seconds.
        timestamp: u64,
    },
    /// Process state change observed by a node's local supervisor.
    Process {
        /// Emitting node.
        node: String,
        /// Decoded process snapshot.
        update: ProcessUpdate,
    },
    /// Opaque metrics payload, forwarded to the statistics collaborator.
    Statistics {
        /// Emitting node.
        node: String,
        /// Undecoded metrics body.
        payload: Vec<u8>,
    },
}

/// Subscription to the fleet's event publishers.
///
/// The intake loop is the only caller: it polls `recv` with a bounded
/// timeout, disconnects isolated nodes, and closes the stream on shutdown.
/// No other component may touch the subscription set.
#[async_trait]
pub trait EventStream: Send {
    /// Receives the next decoded message.
    ///
    /// May pend indefinitely; the intake loop bounds each poll with its own
    /// timeout. A `Recv`/`Decode` error drops that message only.
    async fn recv(&mut self) -> Result<ClusterMessage, TransportError>;

    /// Tears down the subscriptions to the given nodes (after isolation).
    fn disconnect(&mut self, nodes: &[String]);

    /// Releases all transport resources (subscriptions and publisher).
    fn close(&mut self);
}

/// Control endpoint for remediation calls.
///
/// All conciliation requests are routed to the elected master's endpoint;
/// `master` names it on each call so implementations stay stateless.
/// Calls are fire-and-forget for the core: effects are observed later through
/// process events, never awaited.
pub trait ControlClient: Send + Sync {
    /// Asks `node` to stop one process instance.
    ///
    /// `wait` asks the remote supervisor to confirm only once the process is
    /// fully stopped; the core always passes `false` (observation via events).
    fn stop_process(
        &self,
        master: &str,
        node: &str,
        namespec: &str,
        wait: bool,
    ) -> Result<(), RemoteError>;

    /// Requests a full cluster restart.
    fn restart(&self, master: &str) -> Result<(), RemoteError>;

    /// Requests a full cluster shutdown.
    fn shutdown(&self, master: &str) -> Result<(), RemoteError>;
}

/// Statistics collaborator; payloads are opaque to the core.
pub trait StatsSink: Send + Sync {
    /// Pushes one metrics payload reported by `node`.
    fn push(&self, node: &str, payload: &[u8]);
}

/// Discards all statistics; useful when no collector is wired.
#[derive(Debug, Default)]
pub struct NullStatsSink;

impl StatsSink for NullStatsSink {
    fn push(&self, _node: &str, _payload: &[u8]) {}
}
