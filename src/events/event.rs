//! # Normalized session events.
//!
//! [`StatusEvent`] is what a calibration session reports; [`Event`] wraps it with the
//! session identity, a wall-clock timestamp and a global sequence number.
//!
//! ## Ordering guarantees
//! `seq` increases monotonically across all sessions. Within one session events are
//! published in order; sinks that may see them reordered (e.g. after a lag) use `seq`
//! to discard stale ones.
//!
//! ## Example
//! ```rust
//! use calvisor::{Event, SensorKind, SessionId, StatusEvent};
//!
//! let a = Event::new(SessionId::from_raw(1), SensorKind::Gyro, StatusEvent::Connecting);
//! let b = Event::new(SessionId::from_raw(1), SensorKind::Gyro, StatusEvent::Succeeded);
//! assert!(a.seq < b.seq);
//! assert!(b.is_terminal());
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::command::{Orientation, SensorKind, SubSteps};
use crate::session::SessionId;

static EVENT_SEQ: AtomicU64 = AtomicU64::new(1);

/// Which bounded wait expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutKind {
    /// No device heartbeat within `heartbeat_timeout`.
    Heartbeat,
    /// No acknowledgment within `ack_timeout` (after all resends).
    Ack,
    /// The absolute per-session ceiling.
    Session,
}

impl TimeoutKind {
    pub fn as_label(&self) -> &'static str {
        match self {
            TimeoutKind::Heartbeat => "heartbeat",
            TimeoutKind::Ack => "ack",
            TimeoutKind::Session => "session",
        }
    }
}

/// One state change of a calibration session.
///
/// `Succeeded`, `Failed`, `CommandRejected` and `TimedOut` are terminal: nothing follows
/// them for the same session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// Waiting for exclusive use of the device link.
    Connecting,
    /// Link acquired, waiting for a device heartbeat.
    AwaitingHeartbeat,
    /// Device heartbeat seen; the request goes out next.
    LinkAlive { system_id: u8, component_id: u8 },
    /// Request written (again, when `confirmation > 0`).
    CommandSent { confirmation: u8 },
    CommandAccepted,
    /// The device refused the request with this `MAV_RESULT` code.
    CommandRejected(u8),
    /// Percent changed, or the device asked the operator to do something (`note`).
    Progress {
        percent: Option<u8>,
        note: Option<Arc<str>>,
    },
    /// One orientation finished; `remaining` are still to do.
    SubStepCompleted { id: Orientation, remaining: SubSteps },
    Succeeded,
    /// Terminal failure with a reason (device text, link fault or `"cancelled"`).
    Failed(Arc<str>),
    TimedOut(TimeoutKind),
}

impl StatusEvent {
    /// True for events that close a session.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StatusEvent::CommandRejected(_)
                | StatusEvent::Succeeded
                | StatusEvent::Failed(_)
                | StatusEvent::TimedOut(_)
        )
    }

    /// Stable snake_case name of the variant.
    pub fn as_label(&self) -> &'static str {
        match self {
            StatusEvent::Connecting => "connecting",
            StatusEvent::AwaitingHeartbeat => "awaiting_heartbeat",
            StatusEvent::LinkAlive { .. } => "link_alive",
            StatusEvent::CommandSent { .. } => "command_sent",
            StatusEvent::CommandAccepted => "command_accepted",
            StatusEvent::CommandRejected(_) => "command_rejected",
            StatusEvent::Progress { .. } => "progress",
            StatusEvent::SubStepCompleted { .. } => "sub_step_completed",
            StatusEvent::Succeeded => "succeeded",
            StatusEvent::Failed(_) => "failed",
            StatusEvent::TimedOut(_) => "timed_out",
        }
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusEvent::LinkAlive {
                system_id,
                component_id,
            } => write!(f, "link_alive system={system_id} component={component_id}"),
            StatusEvent::CommandSent { confirmation } => {
                write!(f, "command_sent confirmation={confirmation}")
            }
            StatusEvent::CommandRejected(code) => write!(f, "command_rejected result={code}"),
            StatusEvent::Progress { percent, note } => {
                f.write_str("progress")?;
                if let Some(p) = percent {
                    write!(f, " percent={p}")?;
                }
                if let Some(n) = note {
                    write!(f, " note={n:?}")?;
                }
                Ok(())
            }
            StatusEvent::SubStepCompleted { id, remaining } => {
                write!(f, "sub_step_completed side={id} remaining=[{remaining}]")
            }
            StatusEvent::Failed(reason) => write!(f, "failed reason={reason:?}"),
            StatusEvent::TimedOut(kind) => write!(f, "timed_out waiting_for={}", kind.as_label()),
            other => f.write_str(other.as_label()),
        }
    }
}

/// A [`StatusEvent`] with its session context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Global, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock time of emission.
    pub at: SystemTime,
    pub session: SessionId,
    pub sensor: SensorKind,
    pub status: StatusEvent,
}

impl Event {
    /// Stamps `status` with the next sequence number and the current time.
    pub fn new(session: SessionId, sensor: SensorKind, status: StatusEvent) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            session,
            sensor,
            status,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_variants() {
        assert!(StatusEvent::Succeeded.is_terminal());
        assert!(StatusEvent::CommandRejected(4).is_terminal());
        assert!(StatusEvent::TimedOut(TimeoutKind::Ack).is_terminal());
        assert!(!StatusEvent::CommandAccepted.is_terminal());
        assert!(
            !StatusEvent::Progress {
                percent: Some(1),
                note: None
            }
            .is_terminal()
        );
    }

    #[test]
    fn display_is_compact() {
        let ev = StatusEvent::SubStepCompleted {
            id: Orientation::Back,
            remaining: [Orientation::Up, Orientation::Down].into_iter().collect(),
        };
        assert_eq!(ev.to_string(), "sub_step_completed side=back remaining=[up, down]");
        assert_eq!(StatusEvent::Succeeded.to_string(), "succeeded");
    }
}
