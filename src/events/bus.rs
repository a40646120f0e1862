//! # Broadcast bus for session events.
//!
//! ```text
//! session runner 1 ──┐
//! session runner 2 ──┼──► Bus ──┬──► fan-out listener ──► SubscriberSet
//! session runner N ──┘          └──► Supervisor::events() receivers
//! ```
//!
//! Publishing never blocks and never fails. The ring buffer is shared by all receivers;
//! a receiver that falls more than `capacity` events behind sees `Lagged(n)` and skips
//! the `n` oldest. Events published with no receiver attached are dropped.

use tokio::sync::broadcast;

use super::event::Event;

/// Cloneable handle to the event broadcast channel.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus holding at most `capacity` (at least 1) undelivered events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Fire-and-forget publish.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// A receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of attached receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::SensorKind;
    use crate::events::StatusEvent;
    use crate::session::SessionId;

    #[tokio::test]
    async fn slow_receiver_lags_instead_of_blocking() {
        let bus = Bus::new(2);
        let mut rx = bus.subscribe();
        for _ in 0..5 {
            bus.publish(Event::new(SessionId::from_raw(1), SensorKind::Gyro, StatusEvent::Connecting));
        }
        assert!(matches!(rx.recv().await, Err(broadcast::error::RecvError::Lagged(3))));
        assert!(rx.recv().await.is_ok());
    }
}
