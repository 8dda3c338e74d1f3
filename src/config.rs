//! # Global runtime configuration.
//!
//! [`Config`] defines the reconciliation core's behavior: the expected fleet,
//! liveness timing, the transport poll bound, the conciliation strategy and
//! whether silent nodes are fenced off.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use clustervisor::{ConciliationStrategy, Config};
//!
//! let mut cfg = Config::new("n1", ["n1", "n2", "n3"]);
//! cfg.tick_interval = Duration::from_secs(5);
//! cfg.conciliation = ConciliationStrategy::Senior;
//! cfg.auto_fence = true;
//!
//! assert_eq!(cfg.silence_timeout(), Duration::from_secs(10));
//! ```

use std::time::Duration;

use crate::core::ConciliationStrategy;

/// Global configuration for the reconciliation core.
///
/// Controls fleet membership, liveness timing, the intake-loop cadence and
/// the automatic conciliation strategy. The node list is flat and known in
/// advance; membership never changes at runtime.
#[derive(Clone, Debug)]
pub struct Config {
    /// Name of the local node (the one running this core).
    pub local_node: String,
    /// All cluster members, local node included.
    pub nodes: Vec<String>,
    /// Expected interval between two ticks from the same node.
    pub tick_interval: Duration,
    /// Upper bound of one transport poll inside the intake loop.
    pub poll_timeout: Duration,
    /// Interval between two runs of the periodic liveness task.
    pub periodic_interval: Duration,
    /// Maximum time spent in INITIALIZATION waiting for the full fleet.
    pub synchro_timeout: Duration,
    /// Strategy applied automatically when a conflict is detected.
    pub conciliation: ConciliationStrategy,
    /// Escalate SILENT nodes to ISOLATING/ISOLATED on the next timer pass.
    pub auto_fence: bool,
    /// Capacity of the notice bus channel.
    pub bus_capacity: usize,
    /// Capacity of the administrative command queue.
    pub command_capacity: usize,
}

impl Config {
    /// Creates a configuration for the given fleet with default timing:
    /// - `tick_interval = 5s`, silence declared after 2 missed ticks
    /// - `poll_timeout = 1s`
    /// - `periodic_interval = 5s`
    /// - `synchro_timeout = 15s`
    /// - `conciliation = ConciliationStrategy::User` (manual)
    /// - `auto_fence = false`
    /// - `bus_capacity = 1024`, `command_capacity = 64`
    pub fn new(local_node: impl Into<String>, nodes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            local_node: local_node.into(),
            nodes: nodes.into_iter().map(Into::into).collect(),
            tick_interval: Duration::from_secs(5),
            poll_timeout: Duration::from_secs(1),
            periodic_interval: Duration::from_secs(5),
            synchro_timeout: Duration::from_secs(15),
            conciliation: ConciliationStrategy::User,
            auto_fence: false,
            bus_capacity: 1024,
            command_capacity: 64,
        }
    }

    /// Silence threshold: a node whose last tick is older than twice the
    /// expected tick interval is declared SILENT on the next timer pass.
    pub fn silence_timeout(&self) -> Duration {
        self.tick_interval * 2
    }
}
