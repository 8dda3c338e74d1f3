//! # Conciliation: resolving processes running on more than one node.
//!
//! When the same logical process is reported RUNNING on several nodes, a
//! [`ConciliationStrategy`] decides which instance survives. The engine walks
//! the current conflict set, determines the retained node by the strategy's
//! deterministic rule, and issues stop requests for every other running
//! instance through the master's control endpoint (only the master may
//! authoritatively command cross-node stops).
//!
//! The conflict flag stays set until the excluded nodes actually report the
//! process stopped; reapplying a strategy never reissues a stop to a node
//! that already left the running set, so the engine is idempotent.

use crate::core::context::ClusterContext;
use crate::events::{Bus, Notice, NoticeKind};
use crate::transport::ControlClient;

/// Closed set of conflict-resolution strategies.
///
/// Every strategy is matched exhaustively; adding one is a compile-time
/// checked change, not a string lookup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConciliationStrategy {
    /// Keep the node where the process has been running longest.
    Senior,
    /// Keep the most recently started instance.
    Recent,
    /// No automatic action; conflicts are surfaced for manual resolution.
    #[default]
    User,
    /// Stop the process everywhere.
    Stop,
    /// Stop everywhere, then restart through the normal staged sequencer.
    Restart,
}

impl ConciliationStrategy {
    /// Short lowercase label for logs and notices.
    pub fn as_label(self) -> &'static str {
        match self {
            ConciliationStrategy::Senior => "senior",
            ConciliationStrategy::Recent => "recent",
            ConciliationStrategy::User => "user",
            ConciliationStrategy::Stop => "stop",
            ConciliationStrategy::Restart => "restart",
        }
    }
}

/// Applies `strategy` to every conflict in the context.
///
/// Stop requests go to the master's control endpoint; a remote error is
/// published as [`NoticeKind::RemoteCallFailed`] and the request is simply
/// not confirmed (the conflict stays until a later pass). Does nothing
/// without an elected master.
pub fn conciliate(
    ctx: &mut ClusterContext,
    strategy: ConciliationStrategy,
    control: &dyn ControlClient,
    bus: &Bus,
) {
    let Some(master) = ctx.master().map(str::to_string) else {
        return;
    };
    let conflicts = ctx.conflicts();
    for namespec in conflicts {
        conciliate_one(ctx, strategy, &master, &namespec, control, bus);
    }
}

/// Resolves one conflicted process; see [`conciliate`].
pub fn conciliate_one(
    ctx: &mut ClusterContext,
    strategy: ConciliationStrategy,
    master: &str,
    namespec: &str,
    control: &dyn ControlClient,
    bus: &Bus,
) {
    let Some(process) = ctx.find_process(namespec) else {
        return;
    };
    if !process.conflicting() {
        return;
    }

    let retained = match strategy {
        ConciliationStrategy::User => return,
        ConciliationStrategy::Senior => pick_node(process, true),
        ConciliationStrategy::Recent => pick_node(process, false),
        ConciliationStrategy::Stop => None,
        ConciliationStrategy::Restart => None,
    };

    let excluded: Vec<String> = process
        .running_nodes()
        .iter()
        .filter(|node| Some(node.as_str()) != retained.as_deref())
        .cloned()
        .collect();

    if strategy == ConciliationStrategy::Restart {
        ctx.mark_restart(namespec);
    }

    for node in &excluded {
        // wait=false: the effect is observed through later process events
        if let Err(err) = control.stop_process(master, node, namespec, false) {
            bus.publish(
                Notice::new(NoticeKind::RemoteCallFailed)
                    .with_node(node.clone())
                    .with_process(namespec)
                    .with_reason(err.as_message()),
            );
        }
    }

    let mut notice = Notice::new(NoticeKind::ConciliationApplied)
        .with_process(namespec)
        .with_reason(strategy.as_label());
    if let Some(node) = retained {
        notice = notice.with_node(node);
    }
    bus.publish(notice);
}

/// Deterministic retained-node rule for SENIOR (`oldest = true`) and RECENT.
///
/// Ties resolve to the lowest node name: the running set iterates in name
/// order and a strictly-better uptime is required to displace the current
/// pick.
fn pick_node(process: &crate::status::ProcessStatus, oldest: bool) -> Option<String> {
    let mut best: Option<(String, u64)> = None;
    for node in process.running_nodes() {
        let uptime = process.info(node).map(|i| i.uptime).unwrap_or(0);
        let better = match &best {
            None => true,
            Some((_, current)) => {
                if oldest {
                    uptime > *current
                } else {
                    uptime < *current
                }
            }
        };
        if better {
            best = Some((node.clone(), uptime));
        }
    }
    best.map(|(node, _)| node)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::config::Config;
    use crate::error::RemoteError;
    use crate::rules::{ApplicationConfig, ProcessConfig, ProcessRules};
    use crate::status::ProcessState;
    use crate::transport::ProcessUpdate;

    /// Records stop requests instead of sending them.
    #[derive(Default)]
    struct RecordingControl {
        stops: Mutex<Vec<(String, String, String)>>,
        fail: bool,
    }

    impl ControlClient for RecordingControl {
        fn stop_process(
            &self,
            master: &str,
            node: &str,
            namespec: &str,
            _wait: bool,
        ) -> Result<(), RemoteError> {
            if self.fail {
                return Err(RemoteError::Unreachable {
                    node: node.to_string(),
                });
            }
            self.stops.lock().unwrap().push((
                master.to_string(),
                node.to_string(),
                namespec.to_string(),
            ));
            Ok(())
        }

        fn restart(&self, _master: &str) -> Result<(), RemoteError> {
            Ok(())
        }

        fn shutdown(&self, _master: &str) -> Result<(), RemoteError> {
            Ok(())
        }
    }

    fn conflicted_ctx() -> ClusterContext {
        let cfg = Config::new("n1", ["n1", "n2", "n3"]);
        let mut ctx = ClusterContext::new(&cfg);
        ctx.load(
            vec![ApplicationConfig {
                name: "web".to_string(),
                rules: Default::default(),
                processes: vec![ProcessConfig {
                    name: "worker".to_string(),
                    rules: ProcessRules {
                        start_sequence: 1,
                        ..ProcessRules::default()
                    },
                }],
            }],
            &cfg.nodes,
        )
        .unwrap();
        for node in ["n1", "n2"] {
            ctx.registry_mut().on_tick(node, 0, 0);
            ctx.registry_mut().on_tick(node, 5, 5);
        }
        ctx.elect_master();
        assert_eq!(ctx.master(), Some("n1"));
        ctx
    }

    fn report_running(ctx: &mut ClusterContext, node: &str, uptime: u64) {
        ctx.apply_process_update(
            node,
            &ProcessUpdate {
                application: "web".to_string(),
                process: "worker".to_string(),
                state: ProcessState::Running,
                expected_exit: true,
                uptime,
            },
        );
    }

    #[test]
    fn test_senior_stops_younger_instance_only() {
        let mut ctx = conflicted_ctx();
        report_running(&mut ctx, "n1", 100);
        report_running(&mut ctx, "n2", 10);
        let control = RecordingControl::default();
        let bus = Bus::new(16);

        conciliate(&mut ctx, ConciliationStrategy::Senior, &control, &bus);

        let stops = control.stops.lock().unwrap();
        assert_eq!(
            *stops,
            vec![("n1".to_string(), "n2".to_string(), "web:worker".to_string())]
        );
    }

    #[test]
    fn test_recent_keeps_youngest() {
        let mut ctx = conflicted_ctx();
        report_running(&mut ctx, "n1", 100);
        report_running(&mut ctx, "n2", 10);
        let control = RecordingControl::default();
        let bus = Bus::new(16);

        conciliate(&mut ctx, ConciliationStrategy::Recent, &control, &bus);

        let stops = control.stops.lock().unwrap();
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].1, "n1");
    }

    #[test]
    fn test_stop_strategy_stops_everywhere() {
        let mut ctx = conflicted_ctx();
        report_running(&mut ctx, "n1", 100);
        report_running(&mut ctx, "n2", 10);
        let control = RecordingControl::default();
        let bus = Bus::new(16);

        conciliate(&mut ctx, ConciliationStrategy::Stop, &control, &bus);

        let stops = control.stops.lock().unwrap();
        let nodes: Vec<&str> = stops.iter().map(|(_, n, _)| n.as_str()).collect();
        assert_eq!(nodes, vec!["n1", "n2"]);
    }

    #[test]
    fn test_user_strategy_takes_no_action() {
        let mut ctx = conflicted_ctx();
        report_running(&mut ctx, "n1", 100);
        report_running(&mut ctx, "n2", 10);
        let control = RecordingControl::default();
        let bus = Bus::new(16);

        conciliate(&mut ctx, ConciliationStrategy::User, &control, &bus);

        assert!(control.stops.lock().unwrap().is_empty());
        assert!(ctx.has_conflicts());
    }

    #[test]
    fn test_restart_marks_process_for_redeploy() {
        let mut ctx = conflicted_ctx();
        report_running(&mut ctx, "n1", 100);
        report_running(&mut ctx, "n2", 10);
        let control = RecordingControl::default();
        let bus = Bus::new(16);

        conciliate(&mut ctx, ConciliationStrategy::Restart, &control, &bus);

        assert_eq!(control.stops.lock().unwrap().len(), 2);
        assert!(ctx.take_restart("web:worker"));
    }

    #[test]
    fn test_reapplying_skips_already_stopped_nodes() {
        let mut ctx = conflicted_ctx();
        report_running(&mut ctx, "n1", 100);
        report_running(&mut ctx, "n2", 10);
        let control = RecordingControl::default();
        let bus = Bus::new(16);

        conciliate(&mut ctx, ConciliationStrategy::Senior, &control, &bus);
        // n2 confirms the stop
        ctx.apply_process_update(
            "n2",
            &ProcessUpdate {
                application: "web".to_string(),
                process: "worker".to_string(),
                state: ProcessState::Stopped,
                expected_exit: true,
                uptime: 0,
            },
        );
        conciliate(&mut ctx, ConciliationStrategy::Senior, &control, &bus);

        // the second pass found no conflict, so no new stop was issued
        assert_eq!(control.stops.lock().unwrap().len(), 1);
        assert!(!ctx.has_conflicts());
    }

    #[test]
    fn test_remote_error_is_surfaced_not_fatal() {
        let mut ctx = conflicted_ctx();
        report_running(&mut ctx, "n1", 100);
        report_running(&mut ctx, "n2", 10);
        let control = RecordingControl {
            fail: true,
            ..RecordingControl::default()
        };
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();

        conciliate(&mut ctx, ConciliationStrategy::Senior, &control, &bus);

        let notice = rx.try_recv().unwrap();
        assert_eq!(notice.kind, NoticeKind::RemoteCallFailed);
        // conflict remains until the stop is confirmed
        assert!(ctx.has_conflicts());
    }

    #[test]
    fn test_tie_on_uptime_resolves_to_lowest_node() {
        let mut ctx = conflicted_ctx();
        report_running(&mut ctx, "n1", 50);
        report_running(&mut ctx, "n2", 50);
        let control = RecordingControl::default();
        let bus = Bus::new(16);

        conciliate(&mut ctx, ConciliationStrategy::Senior, &control, &bus);

        let stops = control.stops.lock().unwrap();
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].1, "n2");
    }
}
