//! # clustervisor
//!
//! **Clustervisor** is a cluster-wide process-supervision reconciliation
//! engine for Rust.
//!
//! Every node of a fleet runs a local supervisor that publishes heartbeats
//! and process state changes; this crate consumes those streams, maintains
//! the authoritative cluster-wide view, detects duplicate-run conflicts and
//! node loss, and drives remediation through the elected master's control
//! endpoint. The crate is designed as the core of a higher-level supervision
//! deployment; transports and UIs plug in at trait boundaries.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │    node n1   │   │    node n2   │   │    node nN   │
//!     │ (tick/proc)  │   │ (tick/proc)  │   │ (tick/proc)  │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  EventStream (transport boundary, decoded ClusterMessage)         │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  EventLoop (single writer)                                        │
//! │  - ClusterContext (nodes, applications, conflicts, master)        │
//! │  - ClusterFsm (INITIALIZATION → DEPLOYMENT → OPERATION ⇄ CONCIL.) │
//! │  - conciliation engine (SENIOR/RECENT/USER/STOP/RESTART)          │
//! │  - periodic liveness pass (SILENT/ISOLATED, invalidation)         │
//! └──────┬─────────────────────────────────────────────┬──────────────┘
//!        │ stop/restart/shutdown                       │ publish(Notice)
//!        ▼                                             ▼
//! ┌──────────────────────────┐   ┌───────────────────────────────────┐
//! │ ControlClient (master's  │   │       Bus (broadcast channel)     │
//! │ control endpoint, fire-  │   │   (capacity: Config::bus_capacity)│
//! │ and-forget)              │   └─────────────────┬─────────────────┘
//! └──────────────────────────┘                     ▼
//!                                      ┌────────────────────────┐
//!                                      │  subscriber_listener   │
//!                                      │    (in EventLoop)      │
//!                                      └───────────┬────────────┘
//!                                                  ▼
//!                                            SubscriberSet
//!                                           (per-sub queues)
//!                                       ┌─────────┼─────────┐
//!                                       ▼         ▼         ▼
//!                                    worker1   worker2   workerN
//!                                       ▼         ▼         ▼
//!                                  sub1.on    sub2.on   subN.on
//!                                  _notice()  _notice() _notice()
//! ```
//!
//! ### Cluster lifecycle
//! ```text
//! INITIALIZATION ── full fleet RUNNING, or synchro_timeout with ≥1 node ──► DEPLOYMENT
//!   (elect master: lowest-sorted RUNNING node, sticky)
//!
//! DEPLOYMENT ── every staged application start settled ──► OPERATION
//!
//! OPERATION ⇄ CONCILIATION
//!   ├─ a process reported RUNNING on >1 node ──► CONCILIATION
//!   │    └─ entry: apply Config::conciliation (USER = wait for a human)
//!   └─ conflict set empty again ──► OPERATION
//!
//! any ── LoopHandle::restart()  ──► RESTARTING ── all stopped ──► INITIALIZATION
//! any ── LoopHandle::shutdown() ──► SHUTTING_DOWN ── all stopped ──► SHUTDOWN
//! ```
//!
//! ## Features
//! | Area               | Description                                                           | Key types / traits                          |
//! |--------------------|-----------------------------------------------------------------------|---------------------------------------------|
//! | **Intake loop**    | Single-writer loop over the fleet's event streams.                    | [`EventLoop`], [`LoopHandle`]               |
//! | **Status model**   | Per-node process observations rolled up to applications.              | [`ProcessStatus`], [`ApplicationStatus`]    |
//! | **Liveness**       | Tick-driven node lattice with optional auto-fencing.                  | [`NodeRegistry`], [`NodeState`]             |
//! | **Conciliation**   | Deterministic duplicate-run resolution through the master.            | [`ConciliationStrategy`]                    |
//! | **Rules**          | Resolved deployment policy, validated fail-fast.                      | [`ProcessRules`], [`ApplicationRules`]      |
//! | **Boundaries**     | Transport, remediation and statistics seams.                          | [`EventStream`], [`ControlClient`], [`StatsSink`] |
//! | **Notices**        | Ordered change feed toward the presentation boundary.                 | [`Notice`], [`Subscribe`]                   |
//! | **Errors**         | Typed errors per boundary.                                            | [`RuntimeError`], [`TransportError`]        |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use clustervisor::{
//!     ClusterMessage, Config, ConciliationStrategy, ControlClient, EventLoop, EventStream,
//!     NullStatsSink, RemoteError, TransportError,
//! };
//!
//! struct MyStream;
//!
//! #[async_trait::async_trait]
//! impl EventStream for MyStream {
//!     async fn recv(&mut self) -> Result<ClusterMessage, TransportError> {
//!         // read from the wire, decode, return
//!         # std::future::pending().await
//!     }
//!     fn disconnect(&mut self, _nodes: &[String]) {}
//!     fn close(&mut self) {}
//! }
//!
//! struct MyControl;
//!
//! impl ControlClient for MyControl {
//!     fn stop_process(&self, _m: &str, _n: &str, _p: &str, _w: bool) -> Result<(), RemoteError> { Ok(()) }
//!     fn restart(&self, _m: &str) -> Result<(), RemoteError> { Ok(()) }
//!     fn shutdown(&self, _m: &str) -> Result<(), RemoteError> { Ok(()) }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = Config::new("n1", ["n1", "n2", "n3"]);
//!     cfg.conciliation = ConciliationStrategy::Senior;
//!
//!     // Build subscribers (optional)
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn clustervisor::Subscribe>> = {
//!         use clustervisor::LogWriter;
//!         vec![Arc::new(LogWriter)]
//!     };
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn clustervisor::Subscribe>> = Vec::new();
//!
//!     let ev = EventLoop::new(cfg, subs, Arc::new(MyControl), Arc::new(NullStatsSink));
//!     let handle = ev.handle();
//!     let token = CancellationToken::new();
//!
//!     // resolved deployment rules come from the configuration boundary
//!     ev.run(Box::new(MyStream), vec![], token).await?;
//!     let _ = handle;
//!     Ok(())
//! }
//! ```
mod config;
mod core;
mod error;
mod events;
mod rules;
mod status;
mod subscribers;
mod transport;

// ---- Public re-exports ----

pub use config::Config;
pub use core::{
    ApplicationSnapshot, ClusterContext, ClusterFsm, ClusterSnapshot, ClusterState,
    ConciliationStrategy, EventLoop, LoopHandle, NodeSnapshot, ProcessEventOutcome,
    ProcessSnapshot,
};
pub use error::{RemoteError, RulesError, RuntimeError, TransportError};
pub use events::{Bus, Notice, NoticeKind};
pub use rules::{
    ApplicationConfig, ApplicationRules, NodeScope, ProcessConfig, ProcessRules,
    RunningFailureStrategy, StartingFailureStrategy,
};
pub use status::{
    ApplicationState, ApplicationStatus, NodeRegistry, NodeState, NodeStatus, ProcessInfo,
    ProcessState, ProcessStatus,
};
pub use subscribers::{Subscribe, SubscriberSet};
pub use transport::{
    ClusterMessage, ControlClient, EventStream, NullStatsSink, ProcessUpdate, StatsSink,
};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
