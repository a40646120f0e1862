//! # Event sinks.
//!
//! Every [`Event`](crate::Event) published by a session reaches each registered
//! [`Subscribe`] implementation through the [`SubscriberSet`].
//!
//! ```text
//! session runner ── publish(Event) ──► Bus ──► fan-out listener ──► SubscriberSet::emit
//!                                                                     │
//!                                           ┌──────────────┬──────────┼──────────────┐
//!                                           ▼              ▼          ▼              ▼
//!                                     SessionTracker  OutwardForwarder LogWriter   custom
//! ```
//!
//! ## Built-in sinks
//! - [`SessionTracker`]: latest status per session (always installed by the supervisor).
//! - [`OutwardForwarder`]: `{status, progress?}` JSON for a push transport.
//! - [`LogWriter`]: one log line per event (feature `logging`).

#[cfg(feature = "logging")]
mod log;
mod outward;
mod set;
mod subscribe;
mod tracker;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use outward::{OutwardForwarder, OutwardMessage, strip_cal_marker};
pub use set::{SubscriberSet, SubscriptionHandle};
pub use subscribe::Subscribe;
pub use tracker::{SessionStatus, SessionTracker};
