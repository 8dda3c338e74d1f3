//! # Simple logging subscriber for debugging and demos.
//!
//! [`LogWriter`] prints notices to stdout in a human-readable format.
//! This is primarily useful for development, debugging, and examples.
//!
//! ## Output format
//! ```text
//! [node] n2 state=silent
//! [isolated] n2
//! [process] web:worker state=fatal node=n1
//! [application] web state=running major_failure=true minor_failure=false
//! [cluster] state=conciliation
//! [master] n1
//! [conflict] web:worker nodes=["n1", "n2"]
//! [conciliation] web:worker strategy=senior kept=n1
//! [remote-call-failed] node=n2 err="n2 unreachable"
//! ```

use async_trait::async_trait;

use crate::events::{Notice, NoticeKind};
use crate::subscribers::Subscribe;

/// Simple stdout logging subscriber.
///
/// Enabled via the `logging` feature. Prints human-readable notice lines to
/// stdout for debugging and demonstration purposes.
///
/// Not intended for production use: implement a custom [`Subscribe`] for
/// structured logging or metrics collection.
pub struct LogWriter;

fn opt(field: &Option<std::sync::Arc<str>>) -> &str {
    field.as_deref().unwrap_or("?")
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_notice(&self, n: &Notice) {
        match n.kind {
            NoticeKind::NodeStateChanged => {
                println!("[node] {} state={}", opt(&n.node), opt(&n.reason));
            }
            NoticeKind::NodeIsolated => {
                println!("[isolated] {}", opt(&n.node));
            }
            NoticeKind::ProcessStateChanged => {
                if let Some(node) = &n.node {
                    println!("[process] {} state={} node={}", opt(&n.process), opt(&n.reason), node);
                } else {
                    println!("[process] {} state={}", opt(&n.process), opt(&n.reason));
                }
            }
            NoticeKind::ApplicationStateChanged => {
                println!("[application] {} {}", opt(&n.process), opt(&n.reason));
            }
            NoticeKind::RestartRequested => {
                println!("[restart-requested] {} by={}", opt(&n.process), opt(&n.reason));
            }
            NoticeKind::ClusterStateChanged => {
                println!("[cluster] state={}", opt(&n.reason));
            }
            NoticeKind::MasterElected => {
                println!("[master] {}", opt(&n.node));
            }
            NoticeKind::ConflictDetected => {
                println!("[conflict] {} nodes={}", opt(&n.process), opt(&n.reason));
            }
            NoticeKind::ConflictResolved => {
                println!("[conflict-resolved] {}", opt(&n.process));
            }
            NoticeKind::ConciliationApplied => {
                if let Some(node) = &n.node {
                    println!(
                        "[conciliation] {} strategy={} kept={}",
                        opt(&n.process),
                        opt(&n.reason),
                        node
                    );
                } else {
                    println!("[conciliation] {} strategy={}", opt(&n.process), opt(&n.reason));
                }
            }
            NoticeKind::RemoteCallFailed => {
                println!(
                    "[remote-call-failed] node={} err={:?}",
                    opt(&n.node),
                    opt(&n.reason)
                );
            }
            NoticeKind::TransportFailed => {
                println!("[transport-failed] err={:?}", opt(&n.reason));
            }
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
