//! # Node registry and liveness tracking.
//!
//! [`NodeRegistry`] keeps one [`NodeStatus`] per cluster member and derives
//! liveness purely from tick events and the periodic timer pass.
//!
//! ## Liveness lattice
//! ```text
//! UNKNOWN ──tick──► CHECKING ──tick──► RUNNING ◄──tick── SILENT
//!                      │                  │                 ▲
//!                      └──── stale ───────┴──── stale ──────┘
//!
//! SILENT ──fence──► ISOLATING ──timer──► ISOLATED   (never returns
//!                                                    without reset())
//! ```
//!
//! A node is monotonic-until-reset along this lattice: once ISOLATED it only
//! leaves that state through an explicit administrative [`NodeRegistry::reset`].
//! Silence is declared by the timer pass when the last tick is older than the
//! configured threshold (twice the expected tick interval).

use std::collections::BTreeMap;
use std::time::Duration;

/// Liveness state of one cluster member.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// Never heard from since the last reset.
    Unknown,
    /// First tick received; process-state synchronization pending.
    Checking,
    /// Ticking regularly.
    Running,
    /// Missed ticks beyond the silence threshold.
    Silent,
    /// Flagged for isolation; transport teardown pending.
    Isolating,
    /// Cut off from the cluster; requires administrative reset.
    Isolated,
}

impl NodeState {
    /// Short lowercase label for logs and notices.
    pub fn as_label(self) -> &'static str {
        match self {
            NodeState::Unknown => "unknown",
            NodeState::Checking => "checking",
            NodeState::Running => "running",
            NodeState::Silent => "silent",
            NodeState::Isolating => "isolating",
            NodeState::Isolated => "isolated",
        }
    }
}

/// Liveness record of one cluster member.
#[derive(Clone, Debug)]
pub struct NodeStatus {
    /// Node name (its address in the fleet).
    pub name: String,
    /// Current liveness state.
    pub state: NodeState,
    /// Timestamp carried by the last tick (remote wall clock, seconds).
    pub remote_time: u64,
    /// Local monotonic second at which the last tick arrived.
    pub local_time: u64,
}

impl NodeStatus {
    fn new(name: String) -> Self {
        Self {
            name,
            state: NodeState::Unknown,
            remote_time: 0,
            local_time: 0,
        }
    }

    fn isolation_pending_or_done(&self) -> bool {
        matches!(self.state, NodeState::Isolating | NodeState::Isolated)
    }
}

/// Registry of all cluster members, driven by ticks and the periodic timer.
#[derive(Clone, Debug)]
pub struct NodeRegistry {
    nodes: BTreeMap<String, NodeStatus>,
    silence_timeout: u64,
    auto_fence: bool,
}

impl NodeRegistry {
    /// Creates a registry for the given fleet, every node at UNKNOWN.
    pub fn new(
        fleet: impl IntoIterator<Item = impl Into<String>>,
        silence_timeout: Duration,
        auto_fence: bool,
    ) -> Self {
        let nodes = fleet
            .into_iter()
            .map(|n| {
                let name = n.into();
                (name.clone(), NodeStatus::new(name))
            })
            .collect();
        Self {
            nodes,
            silence_timeout: silence_timeout.as_secs().max(1),
            auto_fence,
        }
    }

    /// Records a heartbeat from `node` at local monotonic second `now`.
    ///
    /// First tick moves UNKNOWN to CHECKING; subsequent ticks move
    /// CHECKING/SILENT (and CHECKING after a silence reset) to RUNNING.
    /// Ticks from ISOLATING/ISOLATED nodes are ignored.
    ///
    /// Returns the new state if the node changed state.
    pub fn on_tick(&mut self, node: &str, remote_time: u64, now: u64) -> Option<NodeState> {
        let status = self.nodes.get_mut(node)?;
        if status.isolation_pending_or_done() {
            return None;
        }
        status.remote_time = remote_time;
        status.local_time = now;
        let next = match status.state {
            NodeState::Unknown => NodeState::Checking,
            NodeState::Checking | NodeState::Silent => NodeState::Running,
            NodeState::Running => NodeState::Running,
            // unreachable, filtered above
            other => other,
        };
        if next != status.state {
            status.state = next;
            Some(next)
        } else {
            None
        }
    }

    /// Periodic liveness pass at local monotonic second `now`.
    ///
    /// - CHECKING/RUNNING nodes whose last tick is older than the silence
    ///   threshold become SILENT;
    /// - with auto-fencing, SILENT nodes are escalated to ISOLATING;
    /// - ISOLATING nodes (auto-fenced or flagged administratively) become
    ///   ISOLATED.
    ///
    /// Returns `(silent, isolated)`: the nodes that became SILENT in this
    /// pass, and the nodes that became ISOLATED (their transport
    /// subscriptions must be torn down by the caller).
    pub fn on_timer(&mut self, now: u64) -> (Vec<String>, Vec<String>) {
        let mut silent = Vec::new();
        let mut isolated = Vec::new();
        for status in self.nodes.values_mut() {
            match status.state {
                NodeState::Checking | NodeState::Running => {
                    if now.saturating_sub(status.local_time) > self.silence_timeout {
                        status.state = NodeState::Silent;
                        silent.push(status.name.clone());
                        if self.auto_fence {
                            status.state = NodeState::Isolating;
                        }
                    }
                }
                NodeState::Silent => {
                    if self.auto_fence {
                        status.state = NodeState::Isolating;
                    }
                }
                NodeState::Isolating => {
                    status.state = NodeState::Isolated;
                    isolated.push(status.name.clone());
                }
                NodeState::Unknown | NodeState::Isolated => {}
            }
        }
        (silent, isolated)
    }

    /// Flags a node for isolation; it becomes ISOLATED on the next timer pass.
    ///
    /// No-op for already isolating/isolated nodes and unknown names.
    pub fn flag_isolation(&mut self, node: &str) -> bool {
        match self.nodes.get_mut(node) {
            Some(status) if !status.isolation_pending_or_done() => {
                status.state = NodeState::Isolating;
                true
            }
            _ => false,
        }
    }

    /// Administrative reset: an ISOLATED node returns to UNKNOWN and may tick
    /// its way back into the fleet.
    pub fn reset(&mut self, node: &str) -> bool {
        match self.nodes.get_mut(node) {
            Some(status) if status.state == NodeState::Isolated => {
                *status = NodeStatus::new(status.name.clone());
                true
            }
            _ => false,
        }
    }

    /// Full reset of every node, used when the cluster FSM re-initializes.
    pub fn reset_all(&mut self) {
        for status in self.nodes.values_mut() {
            *status = NodeStatus::new(status.name.clone());
        }
    }

    /// Looks up one node.
    pub fn get(&self, node: &str) -> Option<&NodeStatus> {
        self.nodes.get(node)
    }

    /// All nodes, in name order.
    pub fn iter(&self) -> impl Iterator<Item = &NodeStatus> {
        self.nodes.values()
    }

    /// Names of RUNNING nodes, in name order.
    pub fn running_nodes(&self) -> Vec<String> {
        self.nodes
            .values()
            .filter(|s| s.state == NodeState::Running)
            .map(|s| s.name.clone())
            .collect()
    }

    /// True once every fleet member is RUNNING.
    pub fn all_running(&self) -> bool {
        self.nodes.values().all(|s| s.state == NodeState::Running)
    }
}
