//! # Outward adapter: events as `{status, progress?}` JSON.
//!
//! [`OutwardMessage`] is the message a push transport (a websocket server, a UI bridge)
//! hands to its observers. [`OutwardForwarder`] is a sink that serializes each message
//! and pushes it into a bounded channel the transport drains. A full channel drops
//! progress lines instead of waiting; the terminal line of a session waits for room.
//!
//! ```text
//! Event ─► OutwardForwarder::on_event ─► OutwardMessage::from_status ─► serde_json
//!             ├─ non-terminal ─► mpsc::Sender::try_send ─► transport (dropped when full)
//!             └─ terminal     ─► mpsc::Sender::send     ─► transport
//! ```
//!
//! Waiting only holds up this sink's own worker, never a session.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use crate::events::{Event, StatusEvent, TimeoutKind};
use crate::session::SessionId;
use crate::subscribers::Subscribe;

/// One status line for observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutwardMessage {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

impl OutwardMessage {
    fn status(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            progress: None,
        }
    }

    /// Renders `ev` for observers. `None` for events with nothing to show.
    ///
    /// Failures are prefixed `failed: ` and success `success: `, so a client can detect
    /// the end of a session from the text alone.
    pub fn from_status(ev: &StatusEvent) -> Option<Self> {
        let msg = match ev {
            StatusEvent::Connecting => Self::status("Connecting to device..."),
            StatusEvent::AwaitingHeartbeat => Self::status("Waiting for heartbeat..."),
            StatusEvent::LinkAlive {
                system_id,
                component_id,
            } => Self::status(format!(
                "Heartbeat from system {system_id} component {component_id}"
            )),
            StatusEvent::CommandSent { confirmation: 0 } => {
                Self::status("Calibration command sent")
            }
            StatusEvent::CommandSent { confirmation } => Self::status(format!(
                "Calibration command resent (confirmation={confirmation})"
            )),
            StatusEvent::CommandAccepted => Self::status("Calibration command accepted"),
            StatusEvent::CommandRejected(code) => Self::status(format!(
                "failed: Calibration command rejected (result={code})"
            )),
            StatusEvent::Progress {
                percent: Some(p), ..
            } => Self {
                status: format!("Calibration progress: {p}%"),
                progress: Some(*p),
            },
            StatusEvent::Progress {
                percent: None,
                note: Some(note),
            } => {
                let text = strip_cal_marker(note);
                if text.is_empty() {
                    return None;
                }
                Self::status(text)
            }
            StatusEvent::Progress {
                percent: None,
                note: None,
            } => return None,
            StatusEvent::SubStepCompleted { id, remaining } => {
                Self::status(format!("Completed {id} side. Remaining: {remaining}"))
            }
            StatusEvent::Succeeded => Self::status("success: Calibration completed successfully"),
            StatusEvent::Failed(reason) => {
                Self::status(format!("failed: {}", strip_cal_marker(reason)))
            }
            StatusEvent::TimedOut(TimeoutKind::Heartbeat) => {
                Self::status("failed: No heartbeat received")
            }
            StatusEvent::TimedOut(TimeoutKind::Ack) => {
                Self::status("failed: No acknowledgment received")
            }
            StatusEvent::TimedOut(TimeoutKind::Session) => {
                Self::status("failed: Calibration timed out")
            }
        };
        Some(msg)
    }
}

/// Removes a leading `[cal]` marker (any case) and surrounding whitespace.
pub fn strip_cal_marker(text: &str) -> &str {
    let t = text.trim();
    match t.get(..5) {
        Some(head) if head.eq_ignore_ascii_case("[cal]") => t[5..].trim_start(),
        _ => t,
    }
}

/// Sink that forwards outward JSON lines into a bounded channel.
pub struct OutwardForwarder {
    tx: mpsc::Sender<String>,
    session: Option<SessionId>,
}

impl OutwardForwarder {
    /// A forwarder and the receiving end for the transport. `capacity` is at least 1.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, session: None }, rx)
    }

    /// Forward only events of `session`.
    pub fn for_session(mut self, session: SessionId) -> Self {
        self.session = Some(session);
        self
    }
}

#[async_trait]
impl Subscribe for OutwardForwarder {
    async fn on_event(&self, ev: &Event) {
        if self.session.is_some_and(|s| s != ev.session) {
            return;
        }
        let Some(msg) = OutwardMessage::from_status(&ev.status) else {
            return;
        };
        let line = match serde_json::to_string(&msg) {
            Ok(line) => line,
            Err(e) => {
                warn!(session = %ev.session, error = %e, "outward message not serializable");
                return;
            }
        };
        if ev.status.is_terminal() {
            // Fails only when the transport is gone.
            let _ = self.tx.send(line).await;
            return;
        }
        match self.tx.try_send(line) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(session = %ev.session, "outward channel full, message dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    fn name(&self) -> &'static str {
        "outward"
    }
}
