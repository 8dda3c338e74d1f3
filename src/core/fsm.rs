//! # Cluster finite-state machine.
//!
//! [`ClusterFsm`] drives the whole cluster through its lifecycle:
//!
//! ```text
//! INITIALIZATION ──quorum/timeout──► DEPLOYMENT ──staged start done──► OPERATION
//!                                                                        │  ▲
//!                                                    conflict detected   ▼  │ conflict set empty
//!                                                                  CONCILIATION
//!
//! any state ──admin──► RESTARTING ──all stopped──► INITIALIZATION (full reset)
//! any state ──admin──► SHUTTING_DOWN ──all stopped──► SHUTDOWN (terminal)
//! ```
//!
//! Every handler runs synchronously inside the event intake loop's dispatch
//! of one event; the FSM never blocks and never touches the transport other
//! than through the fire-and-forget control client.
//!
//! Failure propagation: a required-process crash while its application runs
//! triggers the configured remedy locally, without changing the cluster
//! state, unless the remedy cascades into a new conflict, which re-enters
//! CONCILIATION like any other conflict.

use crate::config::Config;
use crate::core::conciliation::{conciliate, ConciliationStrategy};
use crate::core::context::{ClusterContext, ProcessEventOutcome};
use crate::events::{Bus, Notice, NoticeKind};
use crate::rules::{RunningFailureStrategy, StartingFailureStrategy};
use crate::status::ApplicationState;
use crate::transport::{ControlClient, ProcessUpdate};

/// Lifecycle state of the whole cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClusterState {
    /// Waiting for the fleet to report in.
    Initialization,
    /// Staged application start in progress.
    Deployment,
    /// Nominal supervision.
    Operation,
    /// At least one process runs on more than one node.
    Conciliation,
    /// Stopping everything before a full re-initialization.
    Restarting,
    /// Stopping everything for good.
    ShuttingDown,
    /// Terminal.
    Shutdown,
}

impl ClusterState {
    /// Short lowercase label for logs and notices.
    pub fn as_label(self) -> &'static str {
        match self {
            ClusterState::Initialization => "initialization",
            ClusterState::Deployment => "deployment",
            ClusterState::Operation => "operation",
            ClusterState::Conciliation => "conciliation",
            ClusterState::Restarting => "restarting",
            ClusterState::ShuttingDown => "shutting_down",
            ClusterState::Shutdown => "shutdown",
        }
    }
}

/// The cluster state machine; all handlers are called from the intake loop.
#[derive(Debug)]
pub struct ClusterFsm {
    state: ClusterState,
    /// Local monotonic second at which INITIALIZATION began.
    init_started_at: u64,
}

impl ClusterFsm {
    /// Creates the machine in INITIALIZATION, with the synchronization
    /// timeout counted from `now`.
    pub fn new(now: u64) -> Self {
        Self {
            state: ClusterState::Initialization,
            init_started_at: now,
        }
    }

    /// Current cluster state.
    pub fn state(&self) -> ClusterState {
        self.state
    }

    /// Handles one tick event.
    pub fn on_tick_event(
        &mut self,
        ctx: &mut ClusterContext,
        cfg: &Config,
        node: &str,
        remote_time: u64,
        now: u64,
        control: &dyn ControlClient,
        bus: &Bus,
    ) {
        if let Some(state) = ctx.registry_mut().on_tick(node, remote_time, now) {
            bus.publish(
                Notice::new(NoticeKind::NodeStateChanged)
                    .with_node(node)
                    .with_reason(state.as_label()),
            );
        }
        self.evaluate(ctx, cfg, now, control, bus);
    }

    /// Handles one process event.
    pub fn on_process_event(
        &mut self,
        ctx: &mut ClusterContext,
        cfg: &Config,
        node: &str,
        update: &ProcessUpdate,
        now: u64,
        control: &dyn ControlClient,
        bus: &Bus,
    ) {
        let outcome = ctx.apply_process_update(node, update);
        self.publish_status_notices(ctx, node, &outcome, bus);
        self.handle_failure(ctx, &outcome, control, bus);
        self.settle_restart_mark(ctx, &outcome.namespec, bus);
        self.evaluate(ctx, cfg, now, control, bus);
    }

    /// Periodic liveness pass; returns the nodes isolated in this pass so
    /// the intake loop can tear down their transport subscriptions.
    ///
    /// While the cluster sits in CONCILIATION the configured strategy is
    /// re-applied on every pass: it covers conflicts detected after entry and
    /// reissues stop requests that were not confirmed (remote error, lost
    /// event). Nodes that already left the running set get no new stop.
    pub fn on_timer_event(
        &mut self,
        ctx: &mut ClusterContext,
        cfg: &Config,
        now: u64,
        control: &dyn ControlClient,
        bus: &Bus,
    ) -> Vec<String> {
        let (silent, isolated) = ctx.registry_mut().on_timer(now);
        for node in &silent {
            bus.publish(
                Notice::new(NoticeKind::NodeStateChanged)
                    .with_node(node.clone())
                    .with_reason("silent"),
            );
        }
        for node in &isolated {
            bus.publish(
                Notice::new(NoticeKind::NodeStateChanged)
                    .with_node(node.clone())
                    .with_reason("isolated"),
            );
            bus.publish(Notice::new(NoticeKind::NodeIsolated).with_node(node.clone()));
        }

        // a lost node no longer reports anything: drop its observations
        let mut gone = silent;
        for node in &isolated {
            if !gone.contains(node) {
                gone.push(node.clone());
            }
        }
        if !gone.is_empty() {
            let conflicts_before = ctx.conflicts();
            let changed = ctx.invalidate_nodes(&gone);
            for namespec in &changed {
                if let Some(process) = ctx.find_process(namespec) {
                    bus.publish(
                        Notice::new(NoticeKind::ProcessStateChanged)
                            .with_process(namespec.clone())
                            .with_reason(process.state.as_label()),
                    );
                }
            }
            for namespec in conflicts_before {
                if ctx.find_process(&namespec).map(|p| !p.conflicting()).unwrap_or(true) {
                    bus.publish(Notice::new(NoticeKind::ConflictResolved).with_process(namespec.clone()));
                    self.settle_restart_mark(ctx, &namespec, bus);
                }
            }
            self.handle_invalidation_failures(ctx, control, bus);
        }

        // the master may be among the lost nodes
        if let Some(master) = ctx.elect_master() {
            bus.publish(Notice::new(NoticeKind::MasterElected).with_node(master));
        }

        // an ongoing CONCILIATION gets a fresh automatic pass; entry into
        // CONCILIATION below runs its own
        if self.state == ClusterState::Conciliation {
            conciliate(ctx, cfg.conciliation, control, bus);
        }

        self.evaluate(ctx, cfg, now, control, bus);
        isolated
    }

    /// Administrative cluster restart: forward to the master's control
    /// endpoint and start stopping.
    pub fn on_restart_request(
        &mut self,
        ctx: &mut ClusterContext,
        control: &dyn ControlClient,
        bus: &Bus,
    ) {
        if let Some(master) = ctx.master() {
            if let Err(err) = control.restart(master) {
                bus.publish(
                    Notice::new(NoticeKind::RemoteCallFailed)
                        .with_node(master)
                        .with_reason(err.as_message()),
                );
            }
        }
        self.set_state(ClusterState::Restarting, bus);
    }

    /// Administrative cluster shutdown.
    pub fn on_shutdown_request(
        &mut self,
        ctx: &mut ClusterContext,
        control: &dyn ControlClient,
        bus: &Bus,
    ) {
        if let Some(master) = ctx.master() {
            if let Err(err) = control.shutdown(master) {
                bus.publish(
                    Notice::new(NoticeKind::RemoteCallFailed)
                        .with_node(master)
                        .with_reason(err.as_message()),
                );
            }
        }
        self.set_state(ClusterState::ShuttingDown, bus);
    }

    /// Manual conciliation trigger (presentation boundary), any strategy.
    pub fn on_conciliate_request(
        &mut self,
        ctx: &mut ClusterContext,
        cfg: &Config,
        strategy: ConciliationStrategy,
        now: u64,
        control: &dyn ControlClient,
        bus: &Bus,
    ) {
        conciliate(ctx, strategy, control, bus);
        self.evaluate(ctx, cfg, now, control, bus);
    }

    /// Manual conflict resolution: keep the instance on `node`, stop every
    /// other one. Routed through the master like any conciliation request.
    pub fn on_keep_request(
        &mut self,
        ctx: &mut ClusterContext,
        namespec: &str,
        node: &str,
        control: &dyn ControlClient,
        bus: &Bus,
    ) {
        let Some(master) = ctx.master().map(str::to_string) else {
            return;
        };
        let Some(process) = ctx.find_process(namespec) else {
            return;
        };
        let excluded: Vec<String> = process
            .running_nodes()
            .iter()
            .filter(|n| n.as_str() != node)
            .cloned()
            .collect();
        for target in excluded {
            if let Err(err) = control.stop_process(&master, &target, namespec, false) {
                bus.publish(
                    Notice::new(NoticeKind::RemoteCallFailed)
                        .with_node(target)
                        .with_process(namespec)
                        .with_reason(err.as_message()),
                );
            }
        }
    }

    /// Manual stop of one process instance, master-routed.
    pub fn on_stop_request(
        &mut self,
        ctx: &mut ClusterContext,
        namespec: &str,
        node: &str,
        control: &dyn ControlClient,
        bus: &Bus,
    ) {
        let Some(master) = ctx.master().map(str::to_string) else {
            return;
        };
        if let Err(err) = control.stop_process(&master, node, namespec, false) {
            bus.publish(
                Notice::new(NoticeKind::RemoteCallFailed)
                    .with_node(node)
                    .with_process(namespec)
                    .with_reason(err.as_message()),
            );
        }
    }

    // ---------------------------
    // Internals
    // ---------------------------

    fn publish_status_notices(
        &self,
        ctx: &ClusterContext,
        node: &str,
        outcome: &ProcessEventOutcome,
        bus: &Bus,
    ) {
        if outcome.process_changed {
            if let Some(process) = ctx.find_process(&outcome.namespec) {
                bus.publish(
                    Notice::new(NoticeKind::ProcessStateChanged)
                        .with_process(outcome.namespec.clone())
                        .with_node(node)
                        .with_reason(process.state.as_label()),
                );
            }
        }
        if outcome.application_changed {
            if let Some(app) = ctx.application(&outcome.application) {
                bus.publish(
                    Notice::new(NoticeKind::ApplicationStateChanged)
                        .with_process(app.name.clone())
                        .with_reason(format!(
                            "{} major_failure={} minor_failure={}",
                            app.state.as_label(),
                            app.major_failure,
                            app.minor_failure
                        )),
                );
            }
        }
        if outcome.conflict_now && !outcome.conflict_before {
            let nodes = ctx
                .find_process(&outcome.namespec)
                .map(|p| format!("{:?}", p.running_nodes()))
                .unwrap_or_default();
            bus.publish(
                Notice::new(NoticeKind::ConflictDetected)
                    .with_process(outcome.namespec.clone())
                    .with_reason(nodes),
            );
        }
        if outcome.conflict_before && !outcome.conflict_now {
            bus.publish(Notice::new(NoticeKind::ConflictResolved).with_process(outcome.namespec.clone()));
        }
    }

    /// Applies the configured failure strategy after one process event.
    ///
    /// Only required-process failures trigger remedies; optional failures
    /// stay visible as the minor flag. When several required processes of
    /// one application fail close together, the first detected failure wins:
    /// one remedy at a time per application.
    fn handle_failure(
        &mut self,
        ctx: &mut ClusterContext,
        outcome: &ProcessEventOutcome,
        control: &dyn ControlClient,
        bus: &Bus,
    ) {
        let Some(app) = ctx.application(&outcome.application) else {
            return;
        };
        if !app.major_failure {
            // remedy completed (or failure cleared otherwise)
            ctx.end_remedy(&outcome.application);
            return;
        }
        if !outcome.failed || !outcome.required {
            return;
        }
        match app.state {
            ApplicationState::Starting => {
                self.apply_starting_strategy(ctx, &outcome.application, control, bus);
            }
            ApplicationState::Running => {
                self.apply_running_strategy(ctx, &outcome.application, &outcome.namespec, control, bus);
            }
            _ => {}
        }
    }

    /// After node invalidation there is no per-process outcome; scan for
    /// applications newly in major failure and remedy them.
    fn handle_invalidation_failures(
        &mut self,
        ctx: &mut ClusterContext,
        control: &dyn ControlClient,
        bus: &Bus,
    ) {
        let failed: Vec<(String, ApplicationState)> = ctx
            .applications()
            .filter(|app| app.major_failure)
            .map(|app| (app.name.clone(), app.state))
            .collect();
        let recovered: Vec<String> = ctx
            .applications()
            .filter(|app| !app.major_failure && ctx.remedy_pending(&app.name))
            .map(|app| app.name.clone())
            .collect();
        for name in recovered {
            ctx.end_remedy(&name);
        }
        for (name, state) in failed {
            match state {
                ApplicationState::Starting => {
                    self.apply_starting_strategy(ctx, &name, control, bus);
                }
                ApplicationState::Running => {
                    // the crashed process is the FATAL one inside the application
                    let namespec = ctx
                        .application(&name)
                        .and_then(|app| {
                            app.processes()
                                .find(|p| {
                                    p.rules.required
                                        && matches!(p.state, crate::status::ProcessState::Fatal)
                                })
                                .map(|p| p.namespec())
                        });
                    if let Some(namespec) = namespec {
                        self.apply_running_strategy(ctx, &name, &namespec, control, bus);
                    }
                }
                _ => {}
            }
        }
    }

    fn apply_starting_strategy(
        &mut self,
        ctx: &mut ClusterContext,
        application: &str,
        control: &dyn ControlClient,
        bus: &Bus,
    ) {
        let Some(app) = ctx.application(application) else {
            return;
        };
        match app.rules.starting_failure_strategy {
            StartingFailureStrategy::Continue => {}
            StartingFailureStrategy::Abort => {
                ctx.abort_deployment(application);
                bus.publish(
                    Notice::new(NoticeKind::ApplicationStateChanged)
                        .with_process(application)
                        .with_reason("staged start aborted"),
                );
            }
            StartingFailureStrategy::Stop => {
                self.stop_application(ctx, application, control, bus);
            }
        }
    }

    fn apply_running_strategy(
        &mut self,
        ctx: &mut ClusterContext,
        application: &str,
        namespec: &str,
        control: &dyn ControlClient,
        bus: &Bus,
    ) {
        if !ctx.begin_remedy(application) {
            // an earlier failure already holds the remedy slot
            return;
        }
        let Some(app) = ctx.application(application) else {
            return;
        };
        match app.rules.running_failure_strategy {
            RunningFailureStrategy::Continue => {}
            RunningFailureStrategy::RestartProcess => {
                bus.publish(
                    Notice::new(NoticeKind::RestartRequested)
                        .with_process(namespec)
                        .with_reason("restart_process"),
                );
            }
            RunningFailureStrategy::RestartApplication => {
                self.stop_application(ctx, application, control, bus);
                bus.publish(
                    Notice::new(NoticeKind::RestartRequested)
                        .with_process(application)
                        .with_reason("restart_application"),
                );
            }
            RunningFailureStrategy::StopApplication => {
                self.stop_application(ctx, application, control, bus);
            }
        }
    }

    /// Stops every running instance of every process of the application,
    /// master-routed.
    fn stop_application(
        &self,
        ctx: &ClusterContext,
        application: &str,
        control: &dyn ControlClient,
        bus: &Bus,
    ) {
        let Some(master) = ctx.master().map(str::to_string) else {
            return;
        };
        let Some(app) = ctx.application(application) else {
            return;
        };
        let targets: Vec<(String, String)> = app
            .processes()
            .flat_map(|p| {
                let namespec = p.namespec();
                p.running_nodes()
                    .iter()
                    .map(move |node| (node.clone(), namespec.clone()))
            })
            .collect();
        for (node, namespec) in targets {
            if let Err(err) = control.stop_process(&master, &node, &namespec, false) {
                bus.publish(
                    Notice::new(NoticeKind::RemoteCallFailed)
                        .with_node(node)
                        .with_process(namespec)
                        .with_reason(err.as_message()),
                );
            }
        }
    }

    /// RESTART conciliation completes once the process stopped everywhere:
    /// ask the external starter to run it again through the normal sequencer.
    fn settle_restart_mark(&self, ctx: &mut ClusterContext, namespec: &str, bus: &Bus) {
        let stopped_everywhere = ctx
            .find_process(namespec)
            .map(|p| p.running_nodes().is_empty())
            .unwrap_or(false);
        if stopped_everywhere && ctx.take_restart(namespec) {
            bus.publish(
                Notice::new(NoticeKind::RestartRequested)
                    .with_process(namespec)
                    .with_reason("conciliation_restart"),
            );
        }
    }

    /// Runs state transitions until no more apply.
    fn evaluate(
        &mut self,
        ctx: &mut ClusterContext,
        cfg: &Config,
        now: u64,
        control: &dyn ControlClient,
        bus: &Bus,
    ) {
        loop {
            let next = match self.state {
                ClusterState::Initialization => {
                    let quorum = ctx.registry().all_running();
                    let timed_out = now.saturating_sub(self.init_started_at)
                        >= cfg.synchro_timeout.as_secs()
                        && !ctx.registry().running_nodes().is_empty();
                    if quorum || timed_out {
                        if let Some(master) = ctx.elect_master() {
                            bus.publish(Notice::new(NoticeKind::MasterElected).with_node(master));
                        }
                        Some(ClusterState::Deployment)
                    } else {
                        None
                    }
                }
                ClusterState::Deployment => {
                    if ctx.deployment_settled() {
                        Some(ClusterState::Operation)
                    } else {
                        None
                    }
                }
                ClusterState::Operation => {
                    if ctx.has_conflicts() {
                        Some(ClusterState::Conciliation)
                    } else {
                        None
                    }
                }
                ClusterState::Conciliation => {
                    if !ctx.has_conflicts() {
                        Some(ClusterState::Operation)
                    } else {
                        None
                    }
                }
                ClusterState::Restarting => {
                    if ctx.all_stopped() {
                        ctx.reset();
                        self.init_started_at = now;
                        Some(ClusterState::Initialization)
                    } else {
                        None
                    }
                }
                ClusterState::ShuttingDown => {
                    if ctx.all_stopped() {
                        Some(ClusterState::Shutdown)
                    } else {
                        None
                    }
                }
                ClusterState::Shutdown => None,
            };
            let Some(next) = next else { break };
            self.set_state(next, bus);
            if next == ClusterState::Conciliation {
                // automatic pass with the configured strategy (USER = manual)
                conciliate(ctx, cfg.conciliation, control, bus);
            }
            if next == ClusterState::Initialization {
                // a fresh INITIALIZATION needs new ticks before leaving
                break;
            }
        }
    }

    fn set_state(&mut self, state: ClusterState, bus: &Bus) {
        if self.state != state {
            self.state = state;
            bus.publish(
                Notice::new(NoticeKind::ClusterStateChanged).with_reason(state.as_label()),
            );
        }
    }

}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::RemoteError;
    use crate::rules::{
        ApplicationConfig, ApplicationRules, ProcessConfig, ProcessRules,
    };
    use crate::status::ProcessState;

    #[derive(Default)]
    struct RecordingControl {
        stops: Mutex<Vec<(String, String)>>,
    }

    impl ControlClient for RecordingControl {
        fn stop_process(
            &self,
            _master: &str,
            node: &str,
            namespec: &str,
            _wait: bool,
        ) -> Result<(), RemoteError> {
            self.stops
                .lock()
                .unwrap()
                .push((node.to_string(), namespec.to_string()));
            Ok(())
        }

        fn restart(&self, _master: &str) -> Result<(), RemoteError> {
            Ok(())
        }

        fn shutdown(&self, _master: &str) -> Result<(), RemoteError> {
            Ok(())
        }
    }

    fn config() -> Config {
        let mut cfg = Config::new("n1", ["n1", "n2", "n3"]);
        cfg.conciliation = ConciliationStrategy::Senior;
        cfg
    }

    fn context(cfg: &Config, running_strategy: RunningFailureStrategy) -> ClusterContext {
        let mut ctx = ClusterContext::new(cfg);
        ctx.load(
            vec![ApplicationConfig {
                name: "web".to_string(),
                rules: ApplicationRules {
                    autostart: true,
                    sequence: 1,
                    running_failure_strategy: running_strategy,
                    ..ApplicationRules::default()
                },
                processes: vec![
                    ProcessConfig {
                        name: "worker".to_string(),
                        rules: ProcessRules {
                            start_sequence: 1,
                            required: true,
                            ..ProcessRules::default()
                        },
                    },
                    ProcessConfig {
                        name: "cache".to_string(),
                        rules: ProcessRules {
                            start_sequence: 2,
                            ..ProcessRules::default()
                        },
                    },
                ],
            }],
            &cfg.nodes,
        )
        .unwrap();
        ctx
    }

    fn update(app: &str, proc: &str, state: ProcessState, uptime: u64) -> ProcessUpdate {
        ProcessUpdate {
            application: app.to_string(),
            process: proc.to_string(),
            state,
            expected_exit: true,
            uptime,
        }
    }

    fn tick_all(
        fsm: &mut ClusterFsm,
        ctx: &mut ClusterContext,
        cfg: &Config,
        control: &dyn ControlClient,
        bus: &Bus,
    ) {
        // two rounds so every node passes CHECKING and reaches RUNNING
        for now in [0, 5] {
            for node in ["n1", "n2", "n3"] {
                fsm.on_tick_event(ctx, cfg, node, now, now, control, bus);
            }
        }
    }

    #[test]
    fn test_initialization_to_operation_on_full_quorum() {
        let cfg = config();
        let mut ctx = context(&cfg, RunningFailureStrategy::Continue);
        let mut fsm = ClusterFsm::new(0);
        let control = RecordingControl::default();
        let bus = Bus::new(64);

        assert_eq!(fsm.state(), ClusterState::Initialization);
        tick_all(&mut fsm, &mut ctx, &cfg, &control, &bus);
        // quorum reached; nothing is starting, so DEPLOYMENT settles at once
        assert_eq!(fsm.state(), ClusterState::Operation);
        assert_eq!(ctx.master(), Some("n1"));
    }

    #[test]
    fn test_initialization_times_out_with_partial_fleet() {
        let cfg = config();
        let mut ctx = context(&cfg, RunningFailureStrategy::Continue);
        let mut fsm = ClusterFsm::new(0);
        let control = RecordingControl::default();
        let bus = Bus::new(64);

        fsm.on_tick_event(&mut ctx, &cfg, "n2", 0, 0, &control, &bus);
        fsm.on_tick_event(&mut ctx, &cfg, "n2", 5, 5, &control, &bus);
        assert_eq!(fsm.state(), ClusterState::Initialization);
        // synchro timeout (15s) elapses with only n2 up
        fsm.on_tick_event(&mut ctx, &cfg, "n2", 16, 16, &control, &bus);
        assert_eq!(fsm.state(), ClusterState::Operation);
        assert_eq!(ctx.master(), Some("n2"));
    }

    #[test]
    fn test_deployment_waits_for_staged_start() {
        let cfg = config();
        let mut ctx = context(&cfg, RunningFailureStrategy::Continue);
        let mut fsm = ClusterFsm::new(0);
        let control = RecordingControl::default();
        let bus = Bus::new(64);

        // worker starts while the fleet reports in: deployment must wait
        ctx.apply_process_update("n1", &update("web", "worker", ProcessState::Starting, 0));
        tick_all(&mut fsm, &mut ctx, &cfg, &control, &bus);
        assert_eq!(fsm.state(), ClusterState::Deployment);

        fsm.on_process_event(
            &mut ctx,
            &cfg,
            "n1",
            &update("web", "worker", ProcessState::Running, 1),
            10,
            &control,
            &bus,
        );
        assert_eq!(fsm.state(), ClusterState::Operation);
    }

    #[test]
    fn test_conflict_enters_and_leaves_conciliation() {
        let cfg = config();
        let mut ctx = context(&cfg, RunningFailureStrategy::Continue);
        let mut fsm = ClusterFsm::new(0);
        let control = RecordingControl::default();
        let bus = Bus::new(64);
        tick_all(&mut fsm, &mut ctx, &cfg, &control, &bus);

        fsm.on_process_event(
            &mut ctx,
            &cfg,
            "n1",
            &update("web", "worker", ProcessState::Running, 100),
            10,
            &control,
            &bus,
        );
        assert_eq!(fsm.state(), ClusterState::Operation);
        fsm.on_process_event(
            &mut ctx,
            &cfg,
            "n2",
            &update("web", "worker", ProcessState::Running, 10),
            11,
            &control,
            &bus,
        );
        assert_eq!(fsm.state(), ClusterState::Conciliation);
        // SENIOR strategy ran on entry: the younger instance on n2 gets the stop
        assert_eq!(
            *control.stops.lock().unwrap(),
            vec![("n2".to_string(), "web:worker".to_string())]
        );

        // n2 confirms: back to OPERATION
        fsm.on_process_event(
            &mut ctx,
            &cfg,
            "n2",
            &update("web", "worker", ProcessState::Stopped, 0),
            12,
            &control,
            &bus,
        );
        assert_eq!(fsm.state(), ClusterState::Operation);
        assert!(!ctx.has_conflicts());
    }

    #[test]
    fn test_conflict_arising_mid_conciliation_is_auto_resolved() {
        let cfg = config();
        let mut ctx = context(&cfg, RunningFailureStrategy::Continue);
        let mut fsm = ClusterFsm::new(0);
        let control = RecordingControl::default();
        let bus = Bus::new(64);
        tick_all(&mut fsm, &mut ctx, &cfg, &control, &bus);

        // worker conflicts: SENIOR stops the younger instance on entry
        fsm.on_process_event(
            &mut ctx,
            &cfg,
            "n1",
            &update("web", "worker", ProcessState::Running, 100),
            6,
            &control,
            &bus,
        );
        fsm.on_process_event(
            &mut ctx,
            &cfg,
            "n2",
            &update("web", "worker", ProcessState::Running, 10),
            6,
            &control,
            &bus,
        );
        assert_eq!(fsm.state(), ClusterState::Conciliation);
        assert_eq!(
            *control.stops.lock().unwrap(),
            vec![("n2".to_string(), "web:worker".to_string())]
        );

        // n2 never confirms; meanwhile cache starts conflicting on n1/n3
        fsm.on_process_event(
            &mut ctx,
            &cfg,
            "n1",
            &update("web", "cache", ProcessState::Running, 100),
            7,
            &control,
            &bus,
        );
        fsm.on_process_event(
            &mut ctx,
            &cfg,
            "n3",
            &update("web", "cache", ProcessState::Running, 5),
            7,
            &control,
            &bus,
        );
        assert_eq!(fsm.state(), ClusterState::Conciliation);

        // the periodic pass conciliates the whole conflict set again
        let _ = fsm.on_timer_event(&mut ctx, &cfg, 8, &control, &bus);
        assert_eq!(
            *control.stops.lock().unwrap(),
            vec![
                ("n2".to_string(), "web:worker".to_string()),
                ("n3".to_string(), "web:cache".to_string()),
                ("n2".to_string(), "web:worker".to_string()),
            ]
        );

        // both stops confirm: back to OPERATION
        fsm.on_process_event(
            &mut ctx,
            &cfg,
            "n3",
            &update("web", "cache", ProcessState::Stopped, 0),
            9,
            &control,
            &bus,
        );
        fsm.on_process_event(
            &mut ctx,
            &cfg,
            "n2",
            &update("web", "worker", ProcessState::Stopped, 0),
            9,
            &control,
            &bus,
        );
        assert_eq!(fsm.state(), ClusterState::Operation);
        assert!(!ctx.has_conflicts());
    }

    #[test]
    fn test_silent_node_invalidates_processes_and_flags_failure() {
        let cfg = config();
        let mut ctx = context(&cfg, RunningFailureStrategy::Continue);
        let mut fsm = ClusterFsm::new(0);
        let control = RecordingControl::default();
        let bus = Bus::new(64);
        tick_all(&mut fsm, &mut ctx, &cfg, &control, &bus);

        // required worker and optional cache both run on n3 only
        fsm.on_process_event(
            &mut ctx,
            &cfg,
            "n3",
            &update("web", "worker", ProcessState::Running, 50),
            6,
            &control,
            &bus,
        );
        fsm.on_process_event(
            &mut ctx,
            &cfg,
            "n3",
            &update("web", "cache", ProcessState::Running, 50),
            6,
            &control,
            &bus,
        );
        // keep n1/n2 alive, let n3 go silent past 2T
        for now in [10, 15] {
            fsm.on_tick_event(&mut ctx, &cfg, "n1", now, now, &control, &bus);
            fsm.on_tick_event(&mut ctx, &cfg, "n2", now, now, &control, &bus);
        }
        let isolated = fsm.on_timer_event(&mut ctx, &cfg, 16, &control, &bus);
        assert!(isolated.is_empty()); // no auto-fence

        let app = ctx.application("web").unwrap();
        assert!(app.process("worker").unwrap().running_nodes().is_empty());
        // only those processes were running: the application stopped, so the
        // failure flags are forced off by the rollup
        assert_eq!(app.state, ApplicationState::Stopped);
        assert!(!app.major_failure);
    }

    #[test]
    fn test_running_failure_restart_process_remedy() {
        let cfg = config();
        let mut ctx = context(&cfg, RunningFailureStrategy::RestartProcess);
        let mut fsm = ClusterFsm::new(0);
        let control = RecordingControl::default();
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        tick_all(&mut fsm, &mut ctx, &cfg, &control, &bus);

        fsm.on_process_event(
            &mut ctx,
            &cfg,
            "n1",
            &update("web", "worker", ProcessState::Running, 10),
            6,
            &control,
            &bus,
        );
        fsm.on_process_event(
            &mut ctx,
            &cfg,
            "n1",
            &update("web", "cache", ProcessState::Running, 10),
            6,
            &control,
            &bus,
        );
        fsm.on_process_event(
            &mut ctx,
            &cfg,
            "n1",
            &update("web", "worker", ProcessState::Fatal, 0),
            7,
            &control,
            &bus,
        );

        // the remedy asked the external starter to restart the worker
        let mut restart_seen = false;
        while let Ok(notice) = rx.try_recv() {
            if notice.kind == NoticeKind::RestartRequested {
                assert_eq!(notice.process.as_deref(), Some("web:worker"));
                restart_seen = true;
            }
        }
        assert!(restart_seen);
        // first-detected-wins: the remedy slot is held
        assert!(ctx.remedy_pending("web"));
        // cluster state is untouched by a local remedy
        assert_eq!(fsm.state(), ClusterState::Operation);
    }

    #[test]
    fn test_running_failure_stop_application_remedy() {
        let cfg = config();
        let mut ctx = context(&cfg, RunningFailureStrategy::StopApplication);
        let mut fsm = ClusterFsm::new(0);
        let control = RecordingControl::default();
        let bus = Bus::new(64);
        tick_all(&mut fsm, &mut ctx, &cfg, &control, &bus);

        fsm.on_process_event(
            &mut ctx,
            &cfg,
            "n1",
            &update("web", "worker", ProcessState::Running, 10),
            6,
            &control,
            &bus,
        );
        fsm.on_process_event(
            &mut ctx,
            &cfg,
            "n2",
            &update("web", "cache", ProcessState::Running, 10),
            6,
            &control,
            &bus,
        );
        fsm.on_process_event(
            &mut ctx,
            &cfg,
            "n1",
            &update("web", "worker", ProcessState::Fatal, 0),
            7,
            &control,
            &bus,
        );

        // the surviving cache instance was told to stop
        assert_eq!(
            *control.stops.lock().unwrap(),
            vec![("n2".to_string(), "web:cache".to_string())]
        );
    }

    #[test]
    fn test_starting_failure_abort_settles_deployment() {
        let mut cfg = config();
        cfg.conciliation = ConciliationStrategy::User;
        let mut ctx = ClusterContext::new(&cfg);
        ctx.load(
            vec![ApplicationConfig {
                name: "web".to_string(),
                rules: ApplicationRules {
                    autostart: true,
                    starting_failure_strategy: StartingFailureStrategy::Abort,
                    ..ApplicationRules::default()
                },
                processes: vec![
                    ProcessConfig {
                        name: "worker".to_string(),
                        rules: ProcessRules {
                            start_sequence: 1,
                            required: true,
                            ..ProcessRules::default()
                        },
                    },
                    ProcessConfig {
                        name: "cache".to_string(),
                        rules: ProcessRules {
                            start_sequence: 2,
                            ..ProcessRules::default()
                        },
                    },
                ],
            }],
            &cfg.nodes,
        )
        .unwrap();
        let mut fsm = ClusterFsm::new(0);
        let control = RecordingControl::default();
        let bus = Bus::new(64);

        // cache is starting, worker dies: the application stays STARTING
        ctx.apply_process_update("n1", &update("web", "cache", ProcessState::Starting, 0));
        tick_all(&mut fsm, &mut ctx, &cfg, &control, &bus);
        assert_eq!(fsm.state(), ClusterState::Deployment);

        fsm.on_process_event(
            &mut ctx,
            &cfg,
            "n1",
            &update("web", "worker", ProcessState::Fatal, 0),
            6,
            &control,
            &bus,
        );
        // the abort lets DEPLOYMENT settle without waiting for web
        assert_eq!(fsm.state(), ClusterState::Operation);
    }

    #[test]
    fn test_shutdown_request_reaches_terminal_state() {
        let cfg = config();
        let mut ctx = context(&cfg, RunningFailureStrategy::Continue);
        let mut fsm = ClusterFsm::new(0);
        let control = RecordingControl::default();
        let bus = Bus::new(64);
        tick_all(&mut fsm, &mut ctx, &cfg, &control, &bus);

        fsm.on_process_event(
            &mut ctx,
            &cfg,
            "n1",
            &update("web", "worker", ProcessState::Running, 10),
            6,
            &control,
            &bus,
        );
        fsm.on_shutdown_request(&mut ctx, &control, &bus);
        assert_eq!(fsm.state(), ClusterState::ShuttingDown);

        // nodes confirm everything stopped
        fsm.on_process_event(
            &mut ctx,
            &cfg,
            "n1",
            &update("web", "worker", ProcessState::Stopped, 0),
            8,
            &control,
            &bus,
        );
        assert_eq!(fsm.state(), ClusterState::Shutdown);
    }

    #[test]
    fn test_restart_request_reinitializes_after_stop() {
        let cfg = config();
        let mut ctx = context(&cfg, RunningFailureStrategy::Continue);
        let mut fsm = ClusterFsm::new(0);
        let control = RecordingControl::default();
        let bus = Bus::new(64);
        tick_all(&mut fsm, &mut ctx, &cfg, &control, &bus);

        fsm.on_restart_request(&mut ctx, &control, &bus);
        assert_eq!(fsm.state(), ClusterState::Restarting);
        // nothing was running: the reset happens on the next pass
        let _ = fsm.on_timer_event(&mut ctx, &cfg, 20, &control, &bus);
        assert_eq!(fsm.state(), ClusterState::Initialization);
        assert!(ctx.master().is_none());
    }
}
