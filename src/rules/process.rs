//! # Per-process deployment rules.
//!
//! [`ProcessRules`] captures the policy resolved for one process:
//! - `start_sequence` / `stop_sequence`: staged ordering ranks (0 = not auto-managed)
//! - `required`: the process matters for application health classification
//! - `wait_exit`: the staged starter waits for the process to exit before
//!   advancing to the next rank
//! - `expected_loading`: share (0–100) this process adds to its node's loading
//! - `scope`: the set of nodes the process may run on
//!
//! Rules are derived once at configuration load and immutable afterward.
//! Invalid combinations are rejected by [`ProcessRules::validate`] before the
//! cluster can enter DEPLOYMENT.

use std::collections::BTreeSet;

use crate::error::RulesError;

/// Placement scope of a process: the nodes it is allowed to run on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeScope {
    /// The process may run on any cluster node.
    Any,
    /// The process may run only on the listed nodes.
    Nodes(BTreeSet<String>),
}

impl NodeScope {
    /// True if the given node is inside the scope.
    pub fn allows(&self, node: &str) -> bool {
        match self {
            NodeScope::Any => true,
            NodeScope::Nodes(nodes) => nodes.contains(node),
        }
    }

    /// True if the scope cannot match any node of the fleet.
    fn is_empty(&self) -> bool {
        match self {
            NodeScope::Any => false,
            NodeScope::Nodes(nodes) => nodes.is_empty(),
        }
    }
}

/// Policy resolved for one process, immutable after configuration load.
#[derive(Clone, Debug)]
pub struct ProcessRules {
    /// Rank in the staged start sequence (0 = not auto-started).
    pub start_sequence: u32,
    /// Rank in the staged stop sequence (0 = not auto-stopped).
    pub stop_sequence: u32,
    /// Process failures count toward the application's major failure flag.
    pub required: bool,
    /// The staged starter waits for this process to exit before advancing.
    pub wait_exit: bool,
    /// Expected share of node loading, 0–100.
    pub expected_loading: u32,
    /// Nodes the process may run on.
    pub scope: NodeScope,
}

impl Default for ProcessRules {
    /// Not auto-managed, optional, no loading, any node.
    fn default() -> Self {
        Self {
            start_sequence: 0,
            stop_sequence: 0,
            required: false,
            wait_exit: false,
            expected_loading: 0,
            scope: NodeScope::Any,
        }
    }
}

impl ProcessRules {
    /// Validates the rules against the configured fleet.
    ///
    /// Rejected combinations:
    /// - `required` with an empty eligible node set
    /// - `required` with `start_sequence == 0` (a required process must be
    ///   auto-managed, otherwise its health can never be restored)
    /// - `expected_loading > 100`
    /// - a scoped node that is not part of the fleet
    pub fn validate(&self, namespec: &str, fleet: &[String]) -> Result<(), RulesError> {
        if self.expected_loading > 100 {
            return Err(RulesError::LoadingOutOfRange {
                namespec: namespec.to_string(),
                loading: self.expected_loading,
            });
        }
        if let NodeScope::Nodes(nodes) = &self.scope {
            for node in nodes {
                if !fleet.iter().any(|n| n == node) {
                    return Err(RulesError::UnknownNode {
                        namespec: namespec.to_string(),
                        node: node.clone(),
                    });
                }
            }
        }
        if self.required {
            if self.scope.is_empty() {
                return Err(RulesError::RequiredWithoutNode {
                    namespec: namespec.to_string(),
                });
            }
            if self.start_sequence == 0 {
                return Err(RulesError::RequiredUnmanaged {
                    namespec: namespec.to_string(),
                });
            }
        }
        Ok(())
    }
}
