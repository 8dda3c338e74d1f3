//! # Per-application deployment rules and failure strategies.
//!
//! [`ApplicationRules`] captures the policy resolved for one application:
//! whether it autostarts when the cluster enters DEPLOYMENT, its rank among
//! applications, and the remedies applied when a required process fails while
//! the application is starting or running.
//!
//! Both strategy sets are closed enums, matched exhaustively wherever they
//! are enforced; adding a strategy is a compile-time-checked change.

/// Remedy applied when a required process cannot be started while its
/// application is being deployed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StartingFailureStrategy {
    /// Abort the application's staged start; ranks not yet started stay stopped.
    #[default]
    Abort,
    /// Keep starting the remaining ranks.
    Continue,
    /// Stop whatever already started in the application.
    Stop,
}

/// Remedy applied when a required process crashes while its application is
/// running.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunningFailureStrategy {
    /// No automatic action; the failure stays visible as a major failure.
    #[default]
    Continue,
    /// Ask the external starter to run the crashed process again.
    RestartProcess,
    /// Stop the whole application, then ask the starter to redeploy it.
    RestartApplication,
    /// Stop the whole application and leave it stopped.
    StopApplication,
}

/// Policy resolved for one application, immutable after configuration load.
#[derive(Clone, Debug)]
pub struct ApplicationRules {
    /// Start the application when the cluster enters DEPLOYMENT.
    pub autostart: bool,
    /// Rank of this application in the fleet-wide deployment ordering.
    pub sequence: u32,
    /// Remedy for required-process failures during the staged start.
    pub starting_failure_strategy: StartingFailureStrategy,
    /// Remedy for required-process crashes while running.
    pub running_failure_strategy: RunningFailureStrategy,
}

impl Default for ApplicationRules {
    /// No autostart, no ordering rank, abort on starting failures, no
    /// automatic remedy on running failures.
    fn default() -> Self {
        Self {
            autostart: false,
            sequence: 0,
            starting_failure_strategy: StartingFailureStrategy::Abort,
            running_failure_strategy: RunningFailureStrategy::Continue,
        }
    }
}
