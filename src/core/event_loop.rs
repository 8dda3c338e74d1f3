//! # Event intake loop: the single writer of the cluster context.
//!
//! [`EventLoop`] owns the [`ClusterContext`] and the [`ClusterFsm`] and is the
//! only component allowed to mutate them. It polls the transport with a
//! bounded timeout, dispatches decoded messages to the FSM, runs the periodic
//! liveness pass, and serves administrative commands sent through a
//! [`LoopHandle`].
//!
//! ## High-level architecture
//! ```text
//! Inputs to run():
//!   Box<dyn EventStream>, Vec<ApplicationConfig>  ──►  EventLoop::run(stream, apps, token)
//!
//! Loop body (one iteration):
//!   select! {
//!     token.cancelled()                  → break
//!     rx.recv()  (LoopHandle commands)   → dispatch: conciliate / stop / keep /
//!                                                    restart / shutdown / snapshot
//!     timeout(poll_timeout, stream.recv())
//!        Tick{node, ts}                  → fsm.on_tick_event
//!        Process{node, update}           → fsm.on_process_event
//!        Statistics{node, payload}       → stats.push (opaque)
//!        Err(Closed)                     → break
//!        Err(other) / poll bound elapsed → publish TransportFailed / continue
//!   }
//!   every periodic_interval:
//!     fsm.on_timer_event  → stream.disconnect(isolated nodes)
//!
//! Notice flow:
//!   FSM ── publish(Notice) ──► Bus ──► listener ──► SubscriberSet::emit
//!
//! Exit path (cancel, transport closed, or FSM reaches SHUTDOWN):
//!   stream.close()   → all transport resources released
//! ```
//!
//! Time inside the loop is monotonic seconds since `run()` started; remote
//! wall-clock timestamps are stored for display but never compared with the
//! local clock.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::core::conciliation::ConciliationStrategy;
use crate::core::context::{ClusterContext, ClusterSnapshot};
use crate::core::fsm::{ClusterFsm, ClusterState};
use crate::error::{RuntimeError, TransportError};
use crate::events::{Bus, Notice, NoticeKind};
use crate::rules::ApplicationConfig;
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::transport::{ClusterMessage, ControlClient, EventStream, StatsSink};

/// Administrative commands accepted by the running loop.
enum Command {
    /// Apply a conciliation strategy to every current conflict.
    Conciliate(ConciliationStrategy),
    /// Stop one process instance on one node.
    StopProcess { namespec: String, node: String },
    /// Keep the instance on `node`, stop the process everywhere else.
    KeepProcess { namespec: String, node: String },
    /// Full cluster restart.
    Restart,
    /// Full cluster shutdown.
    Shutdown,
    /// Read-only snapshot for the presentation boundary.
    Snapshot {
        reply: oneshot::Sender<ClusterSnapshot>,
    },
}

/// Cloneable, non-blocking handle to a running [`EventLoop`].
///
/// Commands are queued; unknown targets are ignored by the core (the
/// authoritative answer is always a later [`snapshot`](Self::snapshot)).
#[derive(Clone)]
pub struct LoopHandle {
    tx: mpsc::Sender<Command>,
}

impl LoopHandle {
    fn send(&self, cmd: Command) -> Result<(), RuntimeError> {
        self.tx.try_send(cmd).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => RuntimeError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => RuntimeError::LoopClosed,
        })
    }

    /// Applies `strategy` to every current conflict.
    pub fn conciliate(&self, strategy: ConciliationStrategy) -> Result<(), RuntimeError> {
        self.send(Command::Conciliate(strategy))
    }

    /// Stops one process instance on one node (manual conflict resolution).
    pub fn stop_process(
        &self,
        namespec: impl Into<String>,
        node: impl Into<String>,
    ) -> Result<(), RuntimeError> {
        self.send(Command::StopProcess {
            namespec: namespec.into(),
            node: node.into(),
        })
    }

    /// Keeps the instance on `node` and stops the process everywhere else.
    pub fn keep_process(
        &self,
        namespec: impl Into<String>,
        node: impl Into<String>,
    ) -> Result<(), RuntimeError> {
        self.send(Command::KeepProcess {
            namespec: namespec.into(),
            node: node.into(),
        })
    }

    /// Requests a full cluster restart.
    pub fn restart(&self) -> Result<(), RuntimeError> {
        self.send(Command::Restart)
    }

    /// Requests a full cluster shutdown.
    pub fn shutdown(&self) -> Result<(), RuntimeError> {
        self.send(Command::Shutdown)
    }

    /// Returns a point-in-time snapshot of the whole cluster.
    pub async fn snapshot(&self) -> Result<ClusterSnapshot, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply: tx })?;
        rx.await.map_err(|_| RuntimeError::LoopClosed)
    }
}

/// Owns the context and FSM; single writer, single instance of `run()`.
pub struct EventLoop {
    cfg: Config,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    control: Arc<dyn ControlClient>,
    stats: Arc<dyn StatsSink>,
    command_tx: mpsc::Sender<Command>,
    command_rx: Mutex<Option<mpsc::Receiver<Command>>>,
}

impl EventLoop {
    /// Creates the loop with its bus, subscriber set and command queue.
    pub fn new(
        cfg: Config,
        subscribers: Vec<Arc<dyn Subscribe>>,
        control: Arc<dyn ControlClient>,
        stats: Arc<dyn StatsSink>,
    ) -> Self {
        let bus = Bus::new(cfg.bus_capacity);
        let (command_tx, command_rx) = mpsc::channel(cfg.command_capacity.max(1));
        Self {
            cfg,
            bus,
            subs: Arc::new(SubscriberSet::new(subscribers)),
            control,
            stats,
            command_tx,
            command_rx: Mutex::new(Some(command_rx)),
        }
    }

    /// The notice bus, for additional ad-hoc subscriptions.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// A cloneable command handle to this loop.
    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            tx: self.command_tx.clone(),
        }
    }

    /// Runs the intake loop until the token is cancelled, the transport
    /// closes, or the FSM reaches SHUTDOWN.
    ///
    /// Loads the resolved rules fail-fast, then drives the FSM from
    /// transport messages, the periodic liveness pass and administrative
    /// commands. On exit every transport resource is released via
    /// [`EventStream::close`].
    pub async fn run(
        &self,
        mut stream: Box<dyn EventStream>,
        applications: Vec<ApplicationConfig>,
        token: CancellationToken,
    ) -> Result<(), RuntimeError> {
        let mut rx = match self.command_rx.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        }
        .ok_or(RuntimeError::AlreadyRunning)?;

        let mut ctx = ClusterContext::new(&self.cfg);
        ctx.load(applications, &self.cfg.nodes)?;
        self.subscriber_listener();

        let epoch = tokio::time::Instant::now();
        let mut fsm = ClusterFsm::new(0);
        let periodic = self.cfg.periodic_interval.as_secs().max(1);
        let mut next_periodic = periodic;

        loop {
            let now = epoch.elapsed().as_secs();
            tokio::select! {
                _ = token.cancelled() => break,
                Some(cmd) = rx.recv() => {
                    self.dispatch(cmd, &mut ctx, &mut fsm, now);
                }
                polled = tokio::time::timeout(self.cfg.poll_timeout, stream.recv()) => {
                    match polled {
                        Ok(Ok(message)) => self.handle_message(message, &mut ctx, &mut fsm, now),
                        Ok(Err(TransportError::Closed)) => {
                            self.bus.publish(
                                Notice::new(NoticeKind::TransportFailed)
                                    .with_reason("transport closed"),
                            );
                            break;
                        }
                        Ok(Err(err)) => {
                            // the message in flight is lost; liveness covers it
                            self.bus.publish(
                                Notice::new(NoticeKind::TransportFailed)
                                    .with_reason(err.to_string()),
                            );
                        }
                        Err(_) => {} // poll bound elapsed, nothing arrived
                    }
                }
            }

            let now = epoch.elapsed().as_secs();
            if now >= next_periodic {
                let isolated =
                    fsm.on_timer_event(&mut ctx, &self.cfg, now, &*self.control, &self.bus);
                if !isolated.is_empty() {
                    stream.disconnect(&isolated);
                }
                next_periodic = now + periodic;
            }

            if fsm.state() == ClusterState::Shutdown {
                break;
            }
        }

        stream.close();
        Ok(())
    }

    /// Subscribes to the bus and forwards notices to the subscriber set
    /// (fire-and-forget).
    fn subscriber_listener(&self) {
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subs);
        tokio::spawn(async move {
            while let Ok(notice) = rx.recv().await {
                set.emit(&notice);
            }
        });
    }

    fn handle_message(
        &self,
        message: ClusterMessage,
        ctx: &mut ClusterContext,
        fsm: &mut ClusterFsm,
        now: u64,
    ) {
        match message {
            ClusterMessage::Tick { node, timestamp } => {
                fsm.on_tick_event(ctx, &self.cfg, &node, timestamp, now, &*self.control, &self.bus);
            }
            ClusterMessage::Process { node, update } => {
                fsm.on_process_event(ctx, &self.cfg, &node, &update, now, &*self.control, &self.bus);
            }
            ClusterMessage::Statistics { node, payload } => {
                self.stats.push(&node, &payload);
            }
        }
    }

    fn dispatch(&self, cmd: Command, ctx: &mut ClusterContext, fsm: &mut ClusterFsm, now: u64) {
        match cmd {
            Command::Conciliate(strategy) => {
                fsm.on_conciliate_request(ctx, &self.cfg, strategy, now, &*self.control, &self.bus);
            }
            Command::StopProcess { namespec, node } => {
                fsm.on_stop_request(ctx, &namespec, &node, &*self.control, &self.bus);
            }
            Command::KeepProcess { namespec, node } => {
                fsm.on_keep_request(ctx, &namespec, &node, &*self.control, &self.bus);
            }
            Command::Restart => {
                fsm.on_restart_request(ctx, &*self.control, &self.bus);
            }
            Command::Shutdown => {
                fsm.on_shutdown_request(ctx, &*self.control, &self.bus);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(ctx.snapshot(fsm.state().as_label()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::RemoteError;
    use crate::status::ProcessState;
    use crate::transport::{NullStatsSink, ProcessUpdate};

    struct NullControl;

    impl ControlClient for NullControl {
        fn stop_process(
            &self,
            _master: &str,
            _node: &str,
            _namespec: &str,
            _wait: bool,
        ) -> Result<(), RemoteError> {
            Ok(())
        }

        fn restart(&self, _master: &str) -> Result<(), RemoteError> {
            Ok(())
        }

        fn shutdown(&self, _master: &str) -> Result<(), RemoteError> {
            Ok(())
        }
    }

    struct ChannelStream {
        rx: mpsc::Receiver<ClusterMessage>,
        closed: Arc<AtomicBool>,
        disconnected: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl EventStream for ChannelStream {
        async fn recv(&mut self) -> Result<ClusterMessage, TransportError> {
            match self.rx.recv().await {
                Some(message) => Ok(message),
                None => Err(TransportError::Closed),
            }
        }

        fn disconnect(&mut self, nodes: &[String]) {
            self.disconnected.lock().unwrap().extend(nodes.iter().cloned());
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn stream() -> (mpsc::Sender<ClusterMessage>, ChannelStream, Arc<AtomicBool>) {
        let (tx, rx) = mpsc::channel(64);
        let closed = Arc::new(AtomicBool::new(false));
        let s = ChannelStream {
            rx,
            closed: closed.clone(),
            disconnected: Arc::new(Mutex::new(Vec::new())),
        };
        (tx, s, closed)
    }

    fn event_loop() -> Arc<EventLoop> {
        let cfg = Config::new("n1", ["n1", "n2"]);
        Arc::new(EventLoop::new(
            cfg,
            vec![],
            Arc::new(NullControl),
            Arc::new(NullStatsSink),
        ))
    }

    fn tick(node: &str, ts: u64) -> ClusterMessage {
        ClusterMessage::Tick {
            node: node.to_string(),
            timestamp: ts,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_drive_election_and_snapshot() {
        let ev = event_loop();
        let handle = ev.handle();
        let token = CancellationToken::new();
        let (tx, s, closed) = stream();
        let task = tokio::spawn({
            let ev = ev.clone();
            let token = token.clone();
            async move { ev.run(Box::new(s), vec![], token).await }
        });

        for ts in [0, 5] {
            tx.send(tick("n1", ts)).await.unwrap();
            tx.send(tick("n2", ts)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.state, "operation");
        assert_eq!(snap.master.as_deref(), Some("n1"));

        token.cancel();
        task.await.unwrap().unwrap();
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_events_reach_the_context() {
        let ev = event_loop();
        let handle = ev.handle();
        let token = CancellationToken::new();
        let (tx, s, _closed) = stream();
        let task = tokio::spawn({
            let ev = ev.clone();
            let token = token.clone();
            async move { ev.run(Box::new(s), vec![], token).await }
        });

        tx.send(ClusterMessage::Process {
            node: "n2".to_string(),
            update: ProcessUpdate {
                application: "web".to_string(),
                process: "worker".to_string(),
                state: ProcessState::Running,
                expected_exit: true,
                uptime: 3,
            },
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let snap = handle.snapshot().await.unwrap();
        let app = snap.applications.iter().find(|a| a.name == "web").unwrap();
        assert_eq!(app.processes[0].namespec, "web:worker");
        assert_eq!(app.processes[0].running_nodes, vec!["n2".to_string()]);

        token.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_close_stops_the_loop() {
        let ev = event_loop();
        let token = CancellationToken::new();
        let (tx, s, closed) = stream();
        let task = tokio::spawn({
            let ev = ev.clone();
            async move { ev.run(Box::new(s), vec![], token).await }
        });

        drop(tx);
        task.await.unwrap().unwrap();
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_command_reaches_terminal_state() {
        let ev = event_loop();
        let handle = ev.handle();
        let token = CancellationToken::new();
        let (tx, s, closed) = stream();
        let task = tokio::spawn({
            let ev = ev.clone();
            async move { ev.run(Box::new(s), vec![], token).await }
        });

        for ts in [0, 5] {
            tx.send(tick("n1", ts)).await.unwrap();
            tx.send(tick("n2", ts)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.shutdown().unwrap();

        // nothing runs anywhere, so the next periodic pass settles SHUTDOWN
        task.await.unwrap().unwrap();
        assert!(closed.load(Ordering::SeqCst));
        assert!(matches!(handle.restart(), Err(RuntimeError::LoopClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_statistics_are_forwarded_to_the_sink() {
        struct RecordingStats(Mutex<Vec<(String, Vec<u8>)>>);

        impl StatsSink for RecordingStats {
            fn push(&self, node: &str, payload: &[u8]) {
                self.0.lock().unwrap().push((node.to_string(), payload.to_vec()));
            }
        }

        let stats = Arc::new(RecordingStats(Mutex::new(Vec::new())));
        let cfg = Config::new("n1", ["n1", "n2"]);
        let ev = Arc::new(EventLoop::new(cfg, vec![], Arc::new(NullControl), stats.clone()));
        let token = CancellationToken::new();
        let (tx, s, _closed) = stream();
        let task = tokio::spawn({
            let ev = ev.clone();
            let token = token.clone();
            async move { ev.run(Box::new(s), vec![], token).await }
        });

        tx.send(ClusterMessage::Statistics {
            node: "n2".to_string(),
            payload: vec![1, 2, 3],
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        token.cancel();
        task.await.unwrap().unwrap();
        let recorded = stats.0.lock().unwrap();
        assert_eq!(recorded.as_slice(), &[("n2".to_string(), vec![1, 2, 3])]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_run_is_rejected() {
        let ev = event_loop();
        let token = CancellationToken::new();
        token.cancel();
        let (_tx, s, _closed) = stream();
        ev.run(Box::new(s), vec![], token.clone()).await.unwrap();

        let (_tx2, s2, _closed2) = stream();
        let err = ev.run(Box::new(s2), vec![], token).await.unwrap_err();
        assert!(matches!(err, RuntimeError::AlreadyRunning));
    }
}
