//! # Calibration sessions.
//!
//! - [`state`]: the pure [`CalibrationSession`] machine.
//! - `runner`: drives one machine against a locked [`DeviceLink`](crate::DeviceLink).
//! - [`SessionHandle`]: caller-side view of a running session.
//!
//! ```text
//! Supervisor::start_session ──► spawn(runner) ──► SessionHandle
//!                                  │  lock DeviceLink (one session per device)
//!                                  │  loop: receive ≤ min(deadlines, poll) ► classify ► apply
//!                                  │        └► StatusEvent ► Bus
//!                                  ▼
//!                             SessionReport (via SessionHandle::wait)
//! ```

mod handle;
mod runner;
pub mod state;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::command::{SensorKind, SubSteps};
use crate::events::StatusEvent;
use crate::link::SensorHealthSnapshot;

pub use handle::SessionHandle;
pub(crate) use runner::SessionRunner;
pub use state::{CalibrationSession, SessionInput, SessionState, SessionTiming};

static SESSION_SEQ: AtomicU64 = AtomicU64::new(1);

/// Process-unique session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn next() -> Self {
        SessionId(SESSION_SEQ.fetch_add(1, Ordering::Relaxed))
    }

    /// Wraps a raw id (tests, deserialization).
    pub fn from_raw(raw: u64) -> Self {
        SessionId(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Final record of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub id: SessionId,
    pub sensor: SensorKind,
    /// Terminal state.
    pub state: SessionState,
    /// The authoritative last event.
    pub last_event: Option<StatusEvent>,
    pub progress_percent: u8,
    pub completed_sub_steps: SubSteps,
    pub pending_sub_steps: SubSteps,
    /// `SYS_STATUS` sampled before the request, when asked for.
    pub health_before: Option<SensorHealthSnapshot>,
    /// `SYS_STATUS` sampled after the terminal state, when asked for.
    pub health_after: Option<SensorHealthSnapshot>,
    pub elapsed: Duration,
}

impl SessionReport {
    /// Report of a session that never ran to a terminal state on its own.
    pub(crate) fn failed(id: SessionId, sensor: SensorKind, reason: &str) -> Self {
        SessionReport {
            id,
            sensor,
            state: SessionState::Failed,
            last_event: Some(StatusEvent::Failed(Arc::from(reason))),
            progress_percent: 0,
            completed_sub_steps: SubSteps::empty(),
            pending_sub_steps: sensor.sub_steps(),
            health_before: None,
            health_after: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == SessionState::Succeeded
    }

    /// Sensor health after the session, when it was sampled and the sensor is reported.
    pub fn sensor_healthy(&self) -> Option<bool> {
        let bit = self.sensor.health_bit()?;
        self.health_after?.is_healthy(bit)
    }
}
