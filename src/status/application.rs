//! # Application status rollup and staged-start sequencing.
//!
//! An [`ApplicationStatus`] owns the [`ProcessStatus`] of every process in
//! the application (exclusive ownership: a process belongs to exactly one
//! application) and recomputes its own state on every relevant process event.
//!
//! ## Rollup rules
//! Scan every owned process and classify:
//! - `starting`: state ∈ {STARTING, BACKOFF}
//! - `stopping`: state = STOPPING
//! - `running`: state = RUNNING
//! - failure: state = FATAL, or EXITED with an unexpected exit code;
//!   `major` when the process is required, `minor` otherwise
//!
//! Application state: STARTING if any starting; else STOPPING if any
//! stopping; else RUNNING if any running; else STOPPED. The failure flags are
//! asserted only while the application itself is active (STARTING or
//! RUNNING); a stopped application reports no health failure even when
//! per-process failure conditions remain.

use std::collections::BTreeMap;

use crate::rules::ApplicationRules;
use crate::status::process::{ProcessState, ProcessStatus};

/// Aggregated state of one application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplicationState {
    /// No observation yet.
    Unknown,
    /// At least one process winding down, none starting.
    Stopping,
    /// Nothing starting, stopping or running.
    Stopped,
    /// At least one process starting.
    Starting,
    /// At least one process running, none starting or stopping.
    Running,
}

impl ApplicationState {
    /// Short lowercase label for logs and notices.
    pub fn as_label(self) -> &'static str {
        match self {
            ApplicationState::Unknown => "unknown",
            ApplicationState::Stopping => "stopping",
            ApplicationState::Stopped => "stopped",
            ApplicationState::Starting => "starting",
            ApplicationState::Running => "running",
        }
    }
}

/// Status of one application: state, failure flags, owned processes and the
/// staged-start sequencing derived from process rules.
#[derive(Clone, Debug)]
pub struct ApplicationStatus {
    /// Application name (the fleet-wide group name).
    pub name: String,
    /// Aggregated state.
    pub state: ApplicationState,
    /// A required process is failed while the application is active.
    pub major_failure: bool,
    /// An optional process is failed while the application is active.
    pub minor_failure: bool,
    /// Immutable policy for this application.
    pub rules: ApplicationRules,
    /// Owned processes, keyed by process name.
    processes: BTreeMap<String, ProcessStatus>,
    /// start_sequence rank → process names sharing that rank, rank order.
    sequence: BTreeMap<u32, Vec<String>>,
}

impl ApplicationStatus {
    /// Creates an application with no processes yet.
    pub fn new(name: impl Into<String>, rules: ApplicationRules) -> Self {
        Self {
            name: name.into(),
            state: ApplicationState::Unknown,
            major_failure: false,
            minor_failure: false,
            rules,
            processes: BTreeMap::new(),
            sequence: BTreeMap::new(),
        }
    }

    /// True while the application is active (starting or running).
    pub fn running(&self) -> bool {
        matches!(self.state, ApplicationState::Starting | ApplicationState::Running)
    }

    /// True while the application is inactive.
    pub fn stopped(&self) -> bool {
        matches!(self.state, ApplicationState::Unknown | ApplicationState::Stopped)
    }

    /// Adds a process to the application. The sequencing map is stale until
    /// the next [`Self::sequence_deployment`].
    pub fn add_process(&mut self, process: ProcessStatus) {
        self.processes.insert(process.process.clone(), process);
    }

    /// One owned process by name.
    pub fn process(&self, name: &str) -> Option<&ProcessStatus> {
        self.processes.get(name)
    }

    /// Mutable access to one owned process.
    pub fn process_mut(&mut self, name: &str) -> Option<&mut ProcessStatus> {
        self.processes.get_mut(name)
    }

    /// All owned processes, in name order.
    pub fn processes(&self) -> impl Iterator<Item = &ProcessStatus> {
        self.processes.values()
    }

    /// Mutable iteration over owned processes.
    pub fn processes_mut(&mut self) -> impl Iterator<Item = &mut ProcessStatus> {
        self.processes.values_mut()
    }

    /// Rebuilds the rank → processes partition from the process rules.
    ///
    /// Rank 0 (not auto-managed) is kept out of the map: the staged starter
    /// never drives those processes.
    pub fn sequence_deployment(&mut self) {
        self.sequence.clear();
        for process in self.processes.values() {
            if process.rules.start_sequence == 0 {
                continue;
            }
            self.sequence
                .entry(process.rules.start_sequence)
                .or_default()
                .push(process.process.clone());
        }
    }

    /// The staged-start partition: rank → process names, ascending rank.
    pub fn deployment_sequence(&self) -> &BTreeMap<u32, Vec<String>> {
        &self.sequence
    }

    /// Recomputes state and failure flags from the owned processes.
    ///
    /// Idempotent: with no intervening process event, a second run yields the
    /// same `(state, major_failure, minor_failure)`.
    ///
    /// Returns `true` if state or either failure flag changed.
    pub fn update_status(&mut self) -> bool {
        let (mut starting, mut running, mut stopping) = (false, false, false);
        let (mut major_failure, mut minor_failure) = (false, false);
        for process in self.processes.values() {
            match process.state {
                ProcessState::Running => running = true,
                ProcessState::Starting | ProcessState::Backoff => starting = true,
                // STOPPING is transitional, not a stopped state
                ProcessState::Stopping => stopping = true,
                ProcessState::Fatal => {
                    if process.rules.required {
                        major_failure = true;
                    } else {
                        minor_failure = true;
                    }
                }
                ProcessState::Exited if !process.expected_exit => {
                    if process.rules.required {
                        major_failure = true;
                    } else {
                        minor_failure = true;
                    }
                }
                // all other stopped-like states are normal
                _ => {}
            }
        }

        let state = if starting {
            ApplicationState::Starting
        } else if stopping {
            ApplicationState::Stopping
        } else if running {
            ApplicationState::Running
        } else {
            ApplicationState::Stopped
        };

        let prev = (self.state, self.major_failure, self.minor_failure);
        self.state = state;
        // failure flags only while the application itself is active
        self.major_failure = major_failure && self.running();
        self.minor_failure = minor_failure && self.running();
        prev != (self.state, self.major_failure, self.minor_failure)
    }
}
