//! Deployment rules resolved by the configuration boundary.
//!
//! Rules are produced by an external resolution step (deployment-file
//! parsing, pattern/model inheritance) and handed to the core as immutable
//! inputs keyed by application and process name. The core validates them
//! once, fail-fast, before DEPLOYMENT is reachable.
//!
//! ## Contents
//! - [`ProcessRules`], [`NodeScope`] per-process policy and placement
//! - [`ApplicationRules`] per-application policy
//! - [`StartingFailureStrategy`], [`RunningFailureStrategy`] failure remedies

mod application;
mod process;

pub use application::{ApplicationRules, RunningFailureStrategy, StartingFailureStrategy};
pub use process::{NodeScope, ProcessRules};

/// Resolved configuration of one process, as delivered by the configuration
/// boundary.
#[derive(Clone, Debug)]
pub struct ProcessConfig {
    /// Process name inside its application.
    pub name: String,
    /// Resolved process rules.
    pub rules: ProcessRules,
}

/// Resolved configuration of one application and its processes.
#[derive(Clone, Debug)]
pub struct ApplicationConfig {
    /// Application name.
    pub name: String,
    /// Resolved application rules.
    pub rules: ApplicationRules,
    /// The application's processes.
    pub processes: Vec<ProcessConfig>,
}
