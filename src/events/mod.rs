//! Session events: data model and broadcast bus.
//!
//! - [`StatusEvent`], [`TimeoutKind`]: what a session reports.
//! - [`Event`]: a status event with session id, sensor, timestamp and sequence number.
//! - [`Bus`]: thin wrapper over `tokio::sync::broadcast`.
//!
//! Publishers are the session runners. Consumers are the supervisor's fan-out listener
//! (feeding [`SubscriberSet`](crate::SubscriberSet)) and any receiver obtained from
//! [`Supervisor::events`](crate::Supervisor::events).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, StatusEvent, TimeoutKind};
