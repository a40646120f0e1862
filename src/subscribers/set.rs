//! # SubscriberSet: non-blocking fan-out over a changing set of sinks
//!
//! [`SubscriberSet`] distributes each [`Event`] to every registered subscriber
//! **without awaiting** their processing. Subscribers can be added and removed while
//! sessions run.
//!
//! ## What it guarantees
//! - `emit(&Event)` returns immediately.
//! - Per-subscriber FIFO (queue order).
//! - A full queue drops its **oldest** events; the worker reports how many it missed.
//! - Panics inside subscribers are caught and logged (isolation). The worker keeps going.
//!
//! ## What it does **not** guarantee
//! - No global ordering across different subscribers.
//! - No redelivery of dropped events.
//!
//! ## Diagram
//! ```text
//!    emit(&Event)
//!        │                        (Arc-clone per subscriber)
//!        ├────────────────► [ring S1] ─► worker S1 ─► on_event()
//!        ├────────────────► [ring S2] ─► worker S2 ─► on_event()
//!        └────────────────► [ring SN] ─► worker SN ─► on_event()
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::events::Event;

use super::Subscribe;

/// Identifies one registration in a [`SubscriberSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
}

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Per-subscriber ring with metadata.
struct SubscriberChannel {
    name: &'static str,
    sender: broadcast::Sender<Arc<Event>>,
    worker: JoinHandle<()>,
}

/// Fan-out with per-subscriber bounded drop-oldest queues and worker tasks.
pub struct SubscriberSet {
    channels: Mutex<HashMap<u64, SubscriberChannel>>,
    next_id: AtomicU64,
}

impl SubscriberSet {
    /// Creates a set and spawns one worker per subscriber.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>) -> Self {
        let set = Self {
            channels: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        };
        for sub in subs {
            set.add(sub);
        }
        set
    }

    /// Registers `sub` and spawns its worker.
    pub fn add(&self, sub: Arc<dyn Subscribe>) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = sub.name();
        let (sender, rx) = broadcast::channel::<Arc<Event>>(sub.queue_capacity().max(1));
        let worker = tokio::spawn(drain(sub, rx));

        self.channels().insert(
            id,
            SubscriberChannel {
                name,
                sender,
                worker,
            },
        );
        debug!(subscriber = name, id, "subscriber added");
        SubscriptionHandle { id }
    }

    /// Unregisters a subscriber. Events already queued are still delivered.
    ///
    /// Returns `false` if the handle was unknown (already removed).
    pub fn remove(&self, handle: SubscriptionHandle) -> bool {
        match self.channels().remove(&handle.id) {
            Some(channel) => {
                debug!(subscriber = channel.name, id = handle.id, "subscriber removed");
                true
            }
            None => false,
        }
    }

    /// Fan-out one event to all subscribers (non-blocking).
    pub fn emit(&self, event: &Event) {
        let ev = Arc::new(event.clone());
        for channel in self.channels().values() {
            let _ = channel.sender.send(Arc::clone(&ev));
        }
    }

    /// Graceful shutdown: close all queues and await worker completion.
    pub async fn shutdown(&self) {
        let drained: Vec<SubscriberChannel> =
            self.channels().drain().map(|(_, channel)| channel).collect();

        let mut workers = Vec::with_capacity(drained.len());
        for channel in drained {
            drop(channel.sender);
            workers.push(channel.worker);
        }
        for worker in workers {
            let _ = worker.await;
        }
    }

    /// True if there are no subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels().is_empty()
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels().len()
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<u64, SubscriberChannel>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Worker loop of one subscriber. Ends when its sender is dropped.
async fn drain(sub: Arc<dyn Subscribe>, mut rx: broadcast::Receiver<Arc<Event>>) {
    loop {
        match rx.recv().await {
            Ok(ev) => {
                let fut = sub.on_event(ev.as_ref());
                if let Err(panic) = AssertUnwindSafe(fut).catch_unwind().await {
                    warn!(
                        subscriber = sub.name(),
                        session = %ev.session,
                        panic = panic_message(panic.as_ref()),
                        "subscriber panicked"
                    );
                }
            }
            Err(RecvError::Lagged(dropped)) => {
                warn!(subscriber = sub.name(), dropped, "subscriber lagging, oldest events dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
