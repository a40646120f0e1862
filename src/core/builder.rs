use std::sync::Arc;

use crate::core::{Config, Supervisor};
use crate::events::Bus;
use crate::link::Connector;
use crate::subscribers::{SessionTracker, Subscribe, SubscriberSet};

/// Builder for a [`Supervisor`].
pub struct SupervisorBuilder {
    cfg: Config,
    connector: Arc<dyn Connector>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl SupervisorBuilder {
    /// Creates a builder with the given configuration and transport.
    pub fn new<C: Connector>(cfg: Config, connector: C) -> Self {
        Self::with_shared_connector(cfg, Arc::new(connector))
    }

    /// Like [`new`](Self::new) with a connector shared with other owners.
    pub fn with_shared_connector(cfg: Config, connector: Arc<dyn Connector>) -> Self {
        Self {
            cfg,
            connector,
            subscribers: Vec::new(),
        }
    }

    /// Sets the initial event sinks. More can be added later with
    /// [`Supervisor::subscribe`].
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the supervisor.
    ///
    /// Must be called inside a tokio runtime: the subscriber workers and the bus
    /// fan-out listener are spawned here, so no event is missed by the initial sinks.
    pub fn build(self) -> Arc<Supervisor> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let tracker = Arc::new(SessionTracker::new());

        let mut subscribers = self.subscribers;
        subscribers.push(tracker.clone());
        let subs = Arc::new(SubscriberSet::new(subscribers));

        let sup = Arc::new(Supervisor::new_internal(
            self.cfg,
            self.connector,
            bus,
            subs,
            tracker,
        ));
        sup.subscriber_listener();
        sup
    }
}
