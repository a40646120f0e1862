//! # Latest status per session, with sequence-based ordering.
//!
//! ```text
//! Bus ──► fan-out ──► SessionTracker::on_event ──► HashMap<SessionId, SessionStatus>
//! ```
//!
//! ## Rules
//! - Events with `seq <= last_seq` for their session are **rejected** (stale).
//! - A terminal event **removes** the entry, so the map only holds sessions in flight.
//! - Reads are **eventually consistent** with the sessions themselves.
//!
//! A session publishes its events in order and the fan-out keeps that order per sink,
//! so nothing for a session arrives after its terminal event.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::command::SensorKind;
use crate::events::{Event, StatusEvent};
use crate::session::SessionId;
use crate::subscribers::Subscribe;

/// Last known status of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub sensor: SensorKind,
    pub last_seq: u64,
    pub last: StatusEvent,
}

/// Thread-safe tracker of session statuses.
#[derive(Default)]
pub struct SessionTracker {
    state: RwLock<HashMap<SessionId, SessionStatus>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `ev` if it is newer than the last event seen for its session.
    ///
    /// ```text
    /// update(Progress,   seq=100) → last=Progress
    /// update(Connecting, seq=99)  → rejected (stale)
    /// update(Succeeded,  seq=101) → entry removed
    /// ```
    pub async fn update(&self, ev: &Event) -> bool {
        let mut state = self.state.write().await;
        if state
            .get(&ev.session)
            .is_some_and(|entry| ev.seq <= entry.last_seq)
        {
            return false;
        }
        if ev.status.is_terminal() {
            state.remove(&ev.session);
        } else {
            state.insert(
                ev.session,
                SessionStatus {
                    sensor: ev.sensor,
                    last_seq: ev.seq,
                    last: ev.status.clone(),
                },
            );
        }
        true
    }

    /// Sessions that have not reached a terminal event, sorted by id.
    pub async fn active(&self) -> Vec<(SessionId, SensorKind)> {
        let state = self.state.read().await;
        let mut active: Vec<_> = state.iter().map(|(id, st)| (*id, st.sensor)).collect();
        active.sort_unstable_by_key(|(id, _)| *id);
        active
    }

    /// Latest status of a session still in flight.
    pub async fn get(&self, id: SessionId) -> Option<SessionStatus> {
        self.state.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.is_empty()
    }
}

#[async_trait]
impl Subscribe for SessionTracker {
    async fn on_event(&self, ev: &Event) {
        self.update(ev).await;
    }

    fn name(&self) -> &'static str {
        "session_tracker"
    }
}
