//! # Per-process status aggregation across nodes.
//!
//! A [`ProcessStatus`] folds the per-node observations of one logical process
//! into a single state, using a fixed precedence:
//!
//! ```text
//! RUNNING > STARTING / BACKOFF > STOPPING > terminal (EXITED/FATAL/STOPPED/UNKNOWN)
//! ```
//!
//! The set of nodes currently reporting the process RUNNING is kept
//! alongside; more than one entry in that set is a **conflict**, tracked as
//! an orthogonal flag rather than folded into the state, and stays visible
//! until conciliation reduces the set to at most one node.

use std::collections::{BTreeMap, BTreeSet};

use crate::rules::ProcessRules;
use crate::transport::ProcessUpdate;

/// Raw process state as reported by a node's local supervisor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessState {
    /// Never started or no observation yet.
    Unknown,
    /// Stopped by request.
    Stopped,
    /// Start requested, not yet up long enough.
    Starting,
    /// Up and past its startup guard time.
    Running,
    /// Crashed during startup; the local supervisor retries.
    Backoff,
    /// Stop requested, still winding down.
    Stopping,
    /// Exited on its own (exit code may or may not be expected).
    Exited,
    /// Gave up: the local supervisor could not keep it alive.
    Fatal,
}

impl ProcessState {
    /// Aggregation precedence, higher wins. Total order so the aggregate is
    /// deterministic for any per-node combination.
    fn precedence(self) -> u8 {
        match self {
            ProcessState::Running => 7,
            ProcessState::Starting => 6,
            ProcessState::Backoff => 5,
            ProcessState::Stopping => 4,
            ProcessState::Fatal => 3,
            ProcessState::Exited => 2,
            ProcessState::Stopped => 1,
            ProcessState::Unknown => 0,
        }
    }

    /// True for STARTING/BACKOFF.
    pub fn is_starting(self) -> bool {
        matches!(self, ProcessState::Starting | ProcessState::Backoff)
    }

    /// Short lowercase label for logs and notices.
    pub fn as_label(self) -> &'static str {
        match self {
            ProcessState::Unknown => "unknown",
            ProcessState::Stopped => "stopped",
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Backoff => "backoff",
            ProcessState::Stopping => "stopping",
            ProcessState::Exited => "exited",
            ProcessState::Fatal => "fatal",
        }
    }
}

/// One node's view of the process.
#[derive(Clone, Debug)]
pub struct ProcessInfo {
    /// Reported state on that node.
    pub state: ProcessState,
    /// Seconds running on that node (0 unless RUNNING).
    pub uptime: u64,
    /// For EXITED: whether the exit code was expected.
    pub expected_exit: bool,
}

/// Aggregated status of one logical process across the fleet.
#[derive(Clone, Debug)]
pub struct ProcessStatus {
    /// Owning application name.
    pub application: String,
    /// Process name inside the application.
    pub process: String,
    /// Immutable policy for this process.
    pub rules: ProcessRules,
    /// Aggregated state over all reporting nodes.
    pub state: ProcessState,
    /// Exit-expected flag of the observation that won the aggregation.
    pub expected_exit: bool,
    /// Per-node observations, keyed by node name.
    infos: BTreeMap<String, ProcessInfo>,
    /// Nodes currently reporting the process RUNNING, in name order.
    running_nodes: BTreeSet<String>,
}

impl ProcessStatus {
    /// Creates a process status with no observation yet.
    pub fn new(application: impl Into<String>, process: impl Into<String>, rules: ProcessRules) -> Self {
        Self {
            application: application.into(),
            process: process.into(),
            rules,
            state: ProcessState::Unknown,
            expected_exit: true,
            infos: BTreeMap::new(),
            running_nodes: BTreeSet::new(),
        }
    }

    /// The unique `application:process` identifier.
    pub fn namespec(&self) -> String {
        format!("{}:{}", self.application, self.process)
    }

    /// Nodes currently reporting the process RUNNING, in name order.
    pub fn running_nodes(&self) -> &BTreeSet<String> {
        &self.running_nodes
    }

    /// The observation reported by one node, if any.
    pub fn info(&self, node: &str) -> Option<&ProcessInfo> {
        self.infos.get(node)
    }

    /// True if the process is reported RUNNING on more than one node.
    pub fn conflicting(&self) -> bool {
        self.running_nodes.len() > 1
    }

    /// Applies one node's snapshot and re-aggregates.
    ///
    /// Returns `true` if the aggregated state changed.
    pub fn apply_update(&mut self, node: &str, update: &ProcessUpdate) -> bool {
        self.infos.insert(
            node.to_string(),
            ProcessInfo {
                state: update.state,
                uptime: update.uptime,
                expected_exit: update.expected_exit,
            },
        );
        self.evaluate()
    }

    /// Drops one node's observation (node silent or isolated).
    ///
    /// If the process was running there and no other node still reports it
    /// alive, the loss is classified as a crash: the aggregate becomes FATAL
    /// so failure classification can react.
    ///
    /// Returns `true` if the aggregated state changed.
    pub fn invalidate_node(&mut self, node: &str) -> bool {
        let Some(dropped) = self.infos.remove(node) else {
            return false;
        };
        let was_alive = dropped.state == ProcessState::Running || dropped.state.is_starting();
        let changed = self.evaluate();
        if was_alive && self.running_nodes.is_empty() && !self.state.is_starting() {
            let crashed = self.state != ProcessState::Fatal;
            self.state = ProcessState::Fatal;
            self.expected_exit = false;
            return changed || crashed;
        }
        changed
    }

    /// Clears every observation (full cluster reset).
    pub fn reset(&mut self) {
        self.infos.clear();
        self.running_nodes.clear();
        self.state = ProcessState::Unknown;
        self.expected_exit = true;
    }

    /// Re-aggregates state and running set from the per-node observations.
    ///
    /// The winning observation is the one with the highest precedence; ties
    /// resolve to the lowest node name (map iteration order), so the result
    /// is deterministic.
    fn evaluate(&mut self) -> bool {
        self.running_nodes = self
            .infos
            .iter()
            .filter(|(_, info)| info.state == ProcessState::Running)
            .map(|(node, _)| node.clone())
            .collect();

        let mut state = ProcessState::Unknown;
        let mut expected_exit = true;
        let mut best = 0u8;
        for info in self.infos.values() {
            let p = info.state.precedence();
            if p > best {
                best = p;
                state = info.state;
                expected_exit = info.expected_exit;
            }
        }

        let changed = state != self.state;
        self.state = state;
        self.expected_exit = expected_exit;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(state: ProcessState, uptime: u64) -> ProcessUpdate {
        ProcessUpdate {
            application: "web".to_string(),
            process: "worker".to_string(),
            state,
            expected_exit: true,
            uptime,
        }
    }

    fn status() -> ProcessStatus {
        ProcessStatus::new("web", "worker", ProcessRules::default())
    }

    #[test]
    fn test_running_wins_precedence() {
        let mut st = status();
        st.apply_update("n1", &update(ProcessState::Stopped, 0));
        st.apply_update("n2", &update(ProcessState::Running, 12));
        st.apply_update("n3", &update(ProcessState::Stopping, 0));
        assert_eq!(st.state, ProcessState::Running);
        assert!(!st.conflicting());
    }

    #[test]
    fn test_starting_beats_stopping_and_terminals() {
        let mut st = status();
        st.apply_update("n1", &update(ProcessState::Fatal, 0));
        st.apply_update("n2", &update(ProcessState::Backoff, 0));
        assert_eq!(st.state, ProcessState::Backoff);
        st.apply_update("n3", &update(ProcessState::Starting, 0));
        assert_eq!(st.state, ProcessState::Starting);
    }

    #[test]
    fn test_conflict_flag_tracks_running_set() {
        let mut st = status();
        st.apply_update("n1", &update(ProcessState::Running, 100));
        assert!(!st.conflicting());
        st.apply_update("n2", &update(ProcessState::Running, 10));
        assert!(st.conflicting());
        assert_eq!(
            st.running_nodes().iter().cloned().collect::<Vec<_>>(),
            vec!["n1".to_string(), "n2".to_string()]
        );
        // n2 confirms the stop: conflict clears, still running on n1
        st.apply_update("n2", &update(ProcessState::Stopped, 0));
        assert!(!st.conflicting());
        assert_eq!(st.state, ProcessState::Running);
    }

    #[test]
    fn test_invalidate_running_node_is_a_crash() {
        let mut st = status();
        st.apply_update("n1", &update(ProcessState::Running, 50));
        assert!(st.invalidate_node("n1"));
        assert_eq!(st.state, ProcessState::Fatal);
        assert!(!st.expected_exit);
        assert!(st.running_nodes().is_empty());
    }

    #[test]
    fn test_invalidate_one_of_two_keeps_running() {
        let mut st = status();
        st.apply_update("n1", &update(ProcessState::Running, 50));
        st.apply_update("n2", &update(ProcessState::Running, 10));
        st.invalidate_node("n2");
        assert_eq!(st.state, ProcessState::Running);
        assert!(!st.conflicting());
    }

    #[test]
    fn test_invalidate_stopped_node_is_not_a_crash() {
        let mut st = status();
        st.apply_update("n1", &update(ProcessState::Stopped, 0));
        st.invalidate_node("n1");
        assert_eq!(st.state, ProcessState::Unknown);
    }

    #[test]
    fn test_namespec_format() {
        assert_eq!(status().namespec(), "web:worker");
    }
}
