//! Reconciliation core: context, FSM, conciliation and the intake loop.
//!
//! This module contains the embedded implementation of the clustervisor
//! engine. The public surface is the [`EventLoop`] (and its [`LoopHandle`]),
//! the [`ClusterState`]/[`ConciliationStrategy`] enums and the read-only
//! snapshot types.
//!
//! Internal modules:
//! - [`context`]: the single authoritative view of nodes, applications and conflicts;
//! - [`fsm`]: the cluster lifecycle state machine and failure remedies;
//! - [`conciliation`]: conflict-resolution strategies over the master's control endpoint;
//! - [`event_loop`]: the single-writer intake loop and its command handle.

mod conciliation;
mod context;
mod event_loop;
mod fsm;

pub use conciliation::ConciliationStrategy;
pub use context::{
    ApplicationSnapshot, ClusterContext, ClusterSnapshot, NodeSnapshot, ProcessEventOutcome,
    ProcessSnapshot,
};
pub use event_loop::{EventLoop, LoopHandle};
pub use fsm::{ClusterFsm, ClusterState};
