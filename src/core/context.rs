//! # Cluster context: the single authoritative view of the fleet.
//!
//! [`ClusterContext`] owns the node registry, every application status, the
//! conflict set and the elected master identity. It is created once, mutated
//! only from the event intake loop (single-writer discipline), and reset only
//! when the cluster FSM re-initializes.
//!
//! Read access for the presentation boundary goes through plain-data
//! snapshots ([`ClusterSnapshot`], [`NodeSnapshot`], [`ApplicationSnapshot`],
//! [`ProcessSnapshot`]); no external reader ever holds a live reference into
//! the context.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::Config;
use crate::error::RulesError;
use crate::rules::ApplicationConfig;
use crate::status::{
    ApplicationState, ApplicationStatus, NodeRegistry, NodeState, ProcessState, ProcessStatus,
};
use crate::transport::ProcessUpdate;

/// What one process event changed, as seen by the FSM.
#[derive(Clone, Debug)]
pub struct ProcessEventOutcome {
    /// `application:process` of the updated process.
    pub namespec: String,
    /// Owning application name.
    pub application: String,
    /// The aggregated process state changed.
    pub process_changed: bool,
    /// The application state or failure flags changed.
    pub application_changed: bool,
    /// The process was conflicting before this event.
    pub conflict_before: bool,
    /// The process is conflicting after this event.
    pub conflict_now: bool,
    /// The process is now failed (FATAL, or EXITED with unexpected code).
    pub failed: bool,
    /// The failed process is required by its application.
    pub required: bool,
}

/// Authoritative cluster-wide state, owned by the event intake loop.
#[derive(Clone, Debug)]
pub struct ClusterContext {
    local_node: String,
    registry: NodeRegistry,
    applications: BTreeMap<String, ApplicationStatus>,
    master: Option<String>,
    /// Applications with an in-flight running-failure remedy.
    pending_remedies: BTreeSet<String>,
    /// Applications whose staged start was aborted by a starting failure.
    aborted_deployments: BTreeSet<String>,
    /// Processes to restart once their conciliation stops are confirmed.
    pending_restarts: BTreeSet<String>,
}

impl ClusterContext {
    /// Creates an empty context for the configured fleet.
    pub fn new(cfg: &Config) -> Self {
        Self {
            local_node: cfg.local_node.clone(),
            registry: NodeRegistry::new(
                cfg.nodes.iter().cloned(),
                cfg.silence_timeout(),
                cfg.auto_fence,
            ),
            applications: BTreeMap::new(),
            master: None,
            pending_remedies: BTreeSet::new(),
            aborted_deployments: BTreeSet::new(),
            pending_restarts: BTreeSet::new(),
        }
    }

    /// Loads the resolved deployment rules, fail-fast.
    ///
    /// Every process is validated against the fleet before anything is
    /// stored; an invalid rule set leaves the context untouched and the
    /// cluster never reaches DEPLOYMENT.
    pub fn load(&mut self, applications: Vec<ApplicationConfig>, fleet: &[String]) -> Result<(), RulesError> {
        for app in &applications {
            for proc in &app.processes {
                let namespec = format!("{}:{}", app.name, proc.name);
                proc.rules.validate(&namespec, fleet)?;
            }
        }
        for app_cfg in applications {
            let mut app = ApplicationStatus::new(app_cfg.name.clone(), app_cfg.rules);
            for proc in app_cfg.processes {
                app.add_process(ProcessStatus::new(app_cfg.name.clone(), proc.name, proc.rules));
            }
            app.sequence_deployment();
            self.applications.insert(app.name.clone(), app);
        }
        Ok(())
    }

    /// The node registry.
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Mutable node registry (intake loop only).
    pub fn registry_mut(&mut self) -> &mut NodeRegistry {
        &mut self.registry
    }

    /// One application by name.
    pub fn application(&self, name: &str) -> Option<&ApplicationStatus> {
        self.applications.get(name)
    }

    /// All applications, in name order.
    pub fn applications(&self) -> impl Iterator<Item = &ApplicationStatus> {
        self.applications.values()
    }

    /// One process by `application:process` identifier.
    pub fn find_process(&self, namespec: &str) -> Option<&ProcessStatus> {
        let (app, proc) = namespec.split_once(':')?;
        self.applications.get(app)?.process(proc)
    }

    /// Applies one node's process snapshot, creating the application and
    /// process on first discovery (a running process may belong to an
    /// application absent from the configuration).
    ///
    /// Updates from ISOLATING/ISOLATED nodes are dropped: a fenced node makes
    /// no further liveness transition, so an observation accepted here would
    /// never be invalidated again.
    pub fn apply_process_update(&mut self, node: &str, update: &ProcessUpdate) -> ProcessEventOutcome {
        let fenced = self
            .registry
            .get(node)
            .map(|n| matches!(n.state, NodeState::Isolating | NodeState::Isolated))
            .unwrap_or(false);
        if fenced {
            return ProcessEventOutcome {
                namespec: update.namespec(),
                application: update.application.clone(),
                process_changed: false,
                application_changed: false,
                conflict_before: false,
                conflict_now: false,
                failed: false,
                required: false,
            };
        }

        let app = self
            .applications
            .entry(update.application.clone())
            .or_insert_with(|| ApplicationStatus::new(update.application.clone(), Default::default()));
        if app.process(&update.process).is_none() {
            app.add_process(ProcessStatus::new(
                update.application.clone(),
                update.process.clone(),
                Default::default(),
            ));
            app.sequence_deployment();
        }

        // the entry was created above if missing
        let Some(process) = app.process_mut(&update.process) else {
            return ProcessEventOutcome {
                namespec: update.namespec(),
                application: update.application.clone(),
                process_changed: false,
                application_changed: false,
                conflict_before: false,
                conflict_now: false,
                failed: false,
                required: false,
            };
        };
        let conflict_before = process.conflicting();
        let process_changed = process.apply_update(node, update);
        let conflict_now = process.conflicting();
        let failed = matches!(process.state, ProcessState::Fatal)
            || (process.state == ProcessState::Exited && !process.expected_exit);
        let required = process.rules.required;
        let namespec = process.namespec();
        let application_changed = app.update_status();

        ProcessEventOutcome {
            namespec,
            application: update.application.clone(),
            process_changed,
            application_changed,
            conflict_before,
            conflict_now,
            failed,
            required,
        }
    }

    /// Drops the given nodes' observations from every process and recomputes
    /// the affected applications.
    ///
    /// Returns the namespecs whose aggregated state changed.
    pub fn invalidate_nodes(&mut self, nodes: &[String]) -> Vec<String> {
        let mut changed = Vec::new();
        for app in self.applications.values_mut() {
            let mut touched = false;
            for process in app.processes_mut() {
                for node in nodes {
                    if process.invalidate_node(node) {
                        touched = true;
                        changed.push(process.namespec());
                    }
                }
            }
            if touched {
                app.update_status();
            }
        }
        changed
    }

    /// Namespecs of every process currently running on more than one node,
    /// in name order.
    pub fn conflicts(&self) -> Vec<String> {
        self.applications
            .values()
            .flat_map(|app| app.processes())
            .filter(|p| p.conflicting())
            .map(|p| p.namespec())
            .collect()
    }

    /// True if any conflict is unresolved.
    pub fn has_conflicts(&self) -> bool {
        self.applications
            .values()
            .flat_map(|app| app.processes())
            .any(|p| p.conflicting())
    }

    /// Elects (or re-elects) the master: the lowest-sorted RUNNING node.
    ///
    /// Keeps the current master while it is still RUNNING. Returns the new
    /// master name if the election changed it.
    pub fn elect_master(&mut self) -> Option<String> {
        let running = self.registry.running_nodes();
        if let Some(master) = &self.master {
            if running.iter().any(|n| n == master) {
                return None;
            }
        }
        let elected = running.first().cloned();
        if elected != self.master {
            self.master = elected.clone();
            return elected;
        }
        None
    }

    /// The elected master, if any.
    pub fn master(&self) -> Option<&str> {
        self.master.as_deref()
    }

    /// True if this node is the elected master.
    pub fn is_master_local(&self) -> bool {
        self.master.as_deref() == Some(self.local_node.as_str())
    }

    /// Name of the local node.
    pub fn local_node(&self) -> &str {
        &self.local_node
    }

    /// Sum of `expected_loading` of the processes running on `node`.
    pub fn node_loading(&self, node: &str) -> u32 {
        self.applications
            .values()
            .flat_map(|app| app.processes())
            .filter(|p| p.running_nodes().contains(node))
            .map(|p| p.rules.expected_loading)
            .sum()
    }

    /// Namespecs of the processes running on `node`, in name order.
    pub fn node_processes(&self, node: &str) -> Vec<String> {
        self.applications
            .values()
            .flat_map(|app| app.processes())
            .filter(|p| p.running_nodes().contains(node))
            .map(|p| p.namespec())
            .collect()
    }

    /// True once nothing runs, starts or stops anywhere in the fleet.
    pub fn all_stopped(&self) -> bool {
        self.applications.values().all(|app| {
            !matches!(
                app.state,
                ApplicationState::Starting | ApplicationState::Running | ApplicationState::Stopping
            )
        })
    }

    /// True once no application is still in its staged start.
    ///
    /// Applications whose deployment was aborted by a starting failure are
    /// not waited for.
    pub fn deployment_settled(&self) -> bool {
        self.applications
            .values()
            .filter(|app| !self.aborted_deployments.contains(&app.name))
            .all(|app| app.state != ApplicationState::Starting)
    }

    /// Marks an application as having an in-flight running-failure remedy.
    /// Returns `false` if one is already pending (first-detected-wins).
    pub fn begin_remedy(&mut self, application: &str) -> bool {
        self.pending_remedies.insert(application.to_string())
    }

    /// Clears the pending remedy once the application's major failure is gone.
    pub fn end_remedy(&mut self, application: &str) -> bool {
        self.pending_remedies.remove(application)
    }

    /// True if a remedy is pending for the application.
    pub fn remedy_pending(&self, application: &str) -> bool {
        self.pending_remedies.contains(application)
    }

    /// Records a staged-start abort for the application.
    pub fn abort_deployment(&mut self, application: &str) {
        self.aborted_deployments.insert(application.to_string());
    }

    /// Marks a process for restart once its conciliation stops complete.
    pub fn mark_restart(&mut self, namespec: &str) {
        self.pending_restarts.insert(namespec.to_string());
    }

    /// Takes the pending restart mark for a process, if set.
    pub fn take_restart(&mut self, namespec: &str) -> bool {
        self.pending_restarts.remove(namespec)
    }

    /// Full reset: every node back to UNKNOWN, every observation dropped,
    /// master cleared. Applications are kept (they come from configuration)
    /// but their processes lose all per-node state.
    pub fn reset(&mut self) {
        self.registry.reset_all();
        self.master = None;
        self.pending_remedies.clear();
        self.aborted_deployments.clear();
        self.pending_restarts.clear();
        for app in self.applications.values_mut() {
            for process in app.processes_mut() {
                process.reset();
            }
            app.update_status();
        }
    }

    /// Read-only snapshot for the presentation boundary.
    pub fn snapshot(&self, cluster_state: &'static str) -> ClusterSnapshot {
        ClusterSnapshot {
            state: cluster_state,
            master: self.master.clone(),
            nodes: self
                .registry
                .iter()
                .map(|n| NodeSnapshot {
                    name: n.name.clone(),
                    state: n.state,
                    remote_time: n.remote_time,
                    loading: self.node_loading(&n.name),
                    processes: self.node_processes(&n.name),
                })
                .collect(),
            applications: self
                .applications
                .values()
                .map(|app| ApplicationSnapshot {
                    name: app.name.clone(),
                    state: app.state,
                    major_failure: app.major_failure,
                    minor_failure: app.minor_failure,
                    processes: app
                        .processes()
                        .map(|p| ProcessSnapshot {
                            namespec: p.namespec(),
                            state: p.state,
                            running_nodes: p.running_nodes().iter().cloned().collect(),
                            conflicting: p.conflicting(),
                        })
                        .collect(),
                })
                .collect(),
            conflicts: self.conflicts(),
        }
    }
}

/// Point-in-time view of the whole cluster.
#[derive(Clone, Debug)]
pub struct ClusterSnapshot {
    /// Cluster FSM state label.
    pub state: &'static str,
    /// Elected master, if any.
    pub master: Option<String>,
    /// Per-node liveness, loading and process list.
    pub nodes: Vec<NodeSnapshot>,
    /// Per-application status.
    pub applications: Vec<ApplicationSnapshot>,
    /// Current conflict set (namespecs).
    pub conflicts: Vec<String>,
}

/// Point-in-time view of one node.
#[derive(Clone, Debug)]
pub struct NodeSnapshot {
    /// Node name.
    pub name: String,
    /// Liveness state.
    pub state: NodeState,
    /// Timestamp carried by the last tick.
    pub remote_time: u64,
    /// Sum of expected_loading of the processes running here.
    pub loading: u32,
    /// Namespecs running here.
    pub processes: Vec<String>,
}

/// Point-in-time view of one application.
#[derive(Clone, Debug)]
pub struct ApplicationSnapshot {
    /// Application name.
    pub name: String,
    /// Aggregated state.
    pub state: ApplicationState,
    /// Required-process failure while active.
    pub major_failure: bool,
    /// Optional-process failure while active.
    pub minor_failure: bool,
    /// Owned processes.
    pub processes: Vec<ProcessSnapshot>,
}

/// Point-in-time view of one process.
#[derive(Clone, Debug)]
pub struct ProcessSnapshot {
    /// `application:process` identifier.
    pub namespec: String,
    /// Aggregated state.
    pub state: ProcessState,
    /// Nodes reporting it RUNNING.
    pub running_nodes: Vec<String>,
    /// True while running on more than one node.
    pub conflicting: bool,
}
