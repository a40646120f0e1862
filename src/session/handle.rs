use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::command::SensorKind;

use super::{SessionId, SessionReport, SessionState};

/// Caller-side view of a running session.
///
/// Dropping the handle does not stop the session; use [`cancel`](Self::cancel).
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    sensor: SensorKind,
    cancel: CancellationToken,
    state: watch::Receiver<SessionState>,
    join: JoinHandle<SessionReport>,
}

impl SessionHandle {
    pub(crate) fn new(
        id: SessionId,
        sensor: SensorKind,
        cancel: CancellationToken,
        state: watch::Receiver<SessionState>,
        join: JoinHandle<SessionReport>,
    ) -> Self {
        Self {
            id,
            sensor,
            cancel,
            state,
            join,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn sensor(&self) -> SensorKind {
        self.sensor
    }

    /// Latest state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Requests cancellation. The session fails with `"cancelled"` within one poll interval.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the session to end.
    pub async fn wait(self) -> SessionReport {
        match self.join.await {
            Ok(report) => report,
            Err(e) => {
                let reason = if e.is_panic() {
                    "session task panicked"
                } else {
                    "cancelled"
                };
                SessionReport::failed(self.id, self.sensor, reason)
            }
        }
    }
}
