//! Error types used by the clustervisor core and its boundaries.
//!
//! This module defines the error enums of the crate:
//!
//! - [`RuntimeError`] - errors raised by the reconciliation core itself.
//! - [`TransportError`] - failures while receiving messages from the fleet.
//! - [`RemoteError`] - remediation requests that could not be confirmed.
//! - [`RulesError`] - invalid deployment rules, rejected at load time.
//!
//! All types provide `as_label` (and where useful `as_message`) helpers for
//! logs and metrics. Transport and remote errors are never fatal for the
//! event loop: they are published as notices and the loop continues.

use thiserror::Error;

/// # Errors produced by the reconciliation core.
///
/// These represent failures of the orchestration machinery itself, not of
/// managed processes or remote nodes.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The event loop was started twice on the same instance.
    #[error("event loop is already running")]
    AlreadyRunning,

    /// The command channel to the event loop is closed (loop stopped).
    #[error("event loop is not running; command dropped")]
    LoopClosed,

    /// The administrative command queue is full; the command was dropped.
    #[error("command queue is full; command dropped")]
    QueueFull,

    /// The resolved deployment rules failed validation at load time.
    #[error("invalid deployment rules: {0}")]
    InvalidRules(#[from] RulesError),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::AlreadyRunning => "runtime_already_running",
            RuntimeError::LoopClosed => "runtime_loop_closed",
            RuntimeError::QueueFull => "runtime_queue_full",
            RuntimeError::InvalidRules(_) => "runtime_invalid_rules",
        }
    }
}

/// # Errors produced while receiving fleet messages.
///
/// Receive failures drop the message in flight; the intake loop itself keeps
/// running. Message loss is covered by the liveness timeout.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TransportError {
    /// The message could not be read from the wire.
    #[error("receive failed: {reason}")]
    Recv {
        /// Underlying transport failure description.
        reason: String,
    },

    /// A message arrived but could not be decoded into a
    /// [`ClusterMessage`](crate::transport::ClusterMessage).
    #[error("undecodable message: {reason}")]
    Decode {
        /// Why decoding failed (unknown header, truncated body, ...).
        reason: String,
    },

    /// The subscription socket is closed; no further messages will arrive.
    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::Recv { .. } => "transport_recv",
            TransportError::Decode { .. } => "transport_decode",
            TransportError::Closed => "transport_closed",
        }
    }
}

/// # Remediation requests that were not confirmed.
///
/// A remote error means the cluster state simply did not change; the core
/// never retries on its own. The next conciliation or FSM pass, or a human,
/// reissues the request.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The control endpoint rejected the request.
    #[error("request rejected by {node}: {reason}")]
    Rejected {
        /// Control endpoint that rejected the call.
        node: String,
        /// Rejection detail reported by the endpoint.
        reason: String,
    },

    /// The control endpoint could not be reached.
    #[error("node {node} unreachable")]
    Unreachable {
        /// Control endpoint that did not answer.
        node: String,
    },
}

impl RemoteError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RemoteError::Rejected { .. } => "remote_rejected",
            RemoteError::Unreachable { .. } => "remote_unreachable",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RemoteError::Rejected { node, reason } => {
                format!("rejected by {node}: {reason}")
            }
            RemoteError::Unreachable { node } => format!("{node} unreachable"),
        }
    }
}

/// # Invalid deployment rules.
///
/// Raised while loading the resolved rules, before DEPLOYMENT is reachable.
/// A configuration that fails validation never drives the cluster.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RulesError {
    /// A required process has no node it is allowed to run on.
    #[error("process {namespec} is required but has no eligible node")]
    RequiredWithoutNode {
        /// The offending `application:process` identifier.
        namespec: String,
    },

    /// A required process is excluded from automatic management.
    #[error("process {namespec} is required but has start_sequence=0")]
    RequiredUnmanaged {
        /// The offending `application:process` identifier.
        namespec: String,
    },

    /// `expected_loading` is out of the 0–100 range.
    #[error("process {namespec} has expected_loading={loading} (must be 0-100)")]
    LoadingOutOfRange {
        /// The offending `application:process` identifier.
        namespec: String,
        /// The rejected loading value.
        loading: u32,
    },

    /// The rules name a node that is not part of the configured fleet.
    #[error("process {namespec} references unknown node {node}")]
    UnknownNode {
        /// The offending `application:process` identifier.
        namespec: String,
        /// The unknown node name.
        node: String,
    },
}

impl RulesError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RulesError::RequiredWithoutNode { .. } => "rules_required_without_node",
            RulesError::RequiredUnmanaged { .. } => "rules_required_unmanaged",
            RulesError::LoadingOutOfRange { .. } => "rules_loading_out_of_range",
            RulesError::UnknownNode { .. } => "rules_unknown_node",
        }
    }
}
