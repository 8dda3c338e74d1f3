//! Runtime notices: types and broadcast bus.
//!
//! This module groups the notice **data model** and the **bus** used to
//! publish/subscribe to notices emitted by the reconciliation core: state
//! changes, failure flags, conflicts, remediation outcomes.
//!
//! ## Contents
//! - [`NoticeKind`], [`Notice`] notice classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: the event intake loop (the single writer of cluster
//!   state) and the conciliation engine running inside it.
//! - **Consumers**: the subscriber fan-out
//!   ([`SubscriberSet`](crate::subscribers::SubscriberSet)) feeding the
//!   presentation boundary (web view, RPC introspection, logging).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Notice, NoticeKind};
