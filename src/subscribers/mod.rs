//! # Notice subscribers: the presentation boundary's attachment point.
//!
//! The core publishes [`Notice`](crate::events::Notice)s on the bus; this
//! module delivers them to pluggable consumers (web UI feeds, RPC relays,
//! loggers) without ever blocking the intake loop.
//!
//! ## Architecture
//! ```text
//! Notice flow:
//!   intake loop ── publish(Notice) ──► Bus ──► listener ──► SubscriberSet::emit
//!                                                               │
//!                                                    ┌──────────┼──────────┐
//!                                                    ▼          ▼          ▼
//!                                               [queue S1] [queue S2] [queue SN]
//!                                                    │          │          │
//!                                               worker S1  worker S2  worker SN
//!                                                    │          │          │
//!                                           sub.on_notice(&Notice) per subscriber
//! ```
//!
//! - [`Subscribe`] - the consumer trait.
//! - [`SubscriberSet`] - non-blocking fan-out with per-subscriber bounded
//!   queues and worker tasks.
//! - [`LogWriter`] - stdout logger, behind the `logging` feature.

mod set;
mod subscriber;

#[cfg(feature = "logging")]
mod log;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
