//! Cluster-wide status model.
//!
//! This module aggregates the raw, per-node event stream into the three
//! levels of state the rest of the core reasons about:
//!
//! - [`NodeRegistry`] / [`NodeStatus`] node liveness built from tick events
//! - [`ProcessStatus`] per-process aggregation across nodes, with conflict
//!   detection
//! - [`ApplicationStatus`] application rollup with major/minor failure
//!   classification and staged-start sequencing
//!
//! All types here are plain data plus deterministic recomputation; they are
//! mutated only from the event intake loop.

mod application;
mod node;
mod process;

pub use application::{ApplicationState, ApplicationStatus};
pub use node::{NodeRegistry, NodeState, NodeStatus};
pub use process::{ProcessInfo, ProcessState, ProcessStatus};
