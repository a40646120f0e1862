//! # Event sink trait
//!
//! `Subscribe` is the extension point for plugging observers into the supervisor. Each
//! subscriber is driven by a dedicated worker task fed by its own bounded queue owned by
//! the [`SubscriberSet`](crate::SubscriberSet).
//!
//! ## Contract
//! - Implementations may be slow (I/O, a websocket push); they never block the session
//!   that produced the event nor other subscribers.
//! - Each subscriber declares its queue capacity via [`Subscribe::queue_capacity`]. On
//!   overflow the **oldest** queued events are dropped for that subscriber (warn).
//! - A terminal event ([`Event::is_terminal`]) closes its session: nothing else arrives
//!   for that session id.
//!
//! ## Example
//! ```rust
//! use calvisor::{Event, Subscribe};
//!
//! struct Audit;
//!
//! #[async_trait::async_trait]
//! impl Subscribe for Audit {
//!     async fn on_event(&self, ev: &Event) {
//!         let _ = (ev.session, ev.status.as_label());
//!     }
//!     fn name(&self) -> &'static str { "audit" }
//!     fn queue_capacity(&self) -> usize { 64 }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Contract for event sinks.
///
/// Called from a subscriber-dedicated worker task. Implementations should avoid
/// blocking the async runtime (prefer async I/O and cooperative waits).
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handle a single event for this subscriber.
    async fn on_event(&self, event: &Event);

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Capacity of this subscriber's queue.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
