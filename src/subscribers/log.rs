//! # Logging sink for debugging and demos.
//!
//! [`LogWriter`] renders every event as one `tracing::info!` line.
//!
//! ## Output format
//! ```text
//! [connecting] session=3 sensor=accel
//! [command-sent] session=3 sensor=accel confirmation=0
//! [progress] session=3 sensor=accel percent=45
//! [sub-step] session=3 sensor=accel side=back remaining=[front, left, right, up, down]
//! [failed] session=3 sensor=accel reason="cancelled"
//! ```

use async_trait::async_trait;
use tracing::info;

use crate::events::{Event, StatusEvent};
use crate::subscribers::Subscribe;

/// Human-readable logging sink. Enabled via the `logging` feature.
///
/// Not intended for production use; implement a custom [`Subscribe`] for structured
/// logging or metrics collection.
pub struct LogWriter;

impl LogWriter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let (session, sensor) = (e.session, e.sensor);
        match &e.status {
            StatusEvent::Connecting => info!("[connecting] session={session} sensor={sensor}"),
            StatusEvent::AwaitingHeartbeat => {
                info!("[awaiting-heartbeat] session={session} sensor={sensor}")
            }
            StatusEvent::LinkAlive {
                system_id,
                component_id,
            } => info!(
                "[link-alive] session={session} sensor={sensor} system={system_id} component={component_id}"
            ),
            StatusEvent::CommandSent { confirmation } => info!(
                "[command-sent] session={session} sensor={sensor} confirmation={confirmation}"
            ),
            StatusEvent::CommandAccepted => info!("[accepted] session={session} sensor={sensor}"),
            StatusEvent::CommandRejected(code) => {
                info!("[rejected] session={session} sensor={sensor} result={code}")
            }
            StatusEvent::Progress {
                percent: Some(p), ..
            } => info!("[progress] session={session} sensor={sensor} percent={p}"),
            StatusEvent::Progress { note, .. } => info!(
                "[instruction] session={session} sensor={sensor} note={:?}",
                note.as_deref().unwrap_or("")
            ),
            StatusEvent::SubStepCompleted { id, remaining } => info!(
                "[sub-step] session={session} sensor={sensor} side={id} remaining=[{remaining}]"
            ),
            StatusEvent::Succeeded => info!("[succeeded] session={session} sensor={sensor}"),
            StatusEvent::Failed(reason) => {
                info!("[failed] session={session} sensor={sensor} reason={reason:?}")
            }
            StatusEvent::TimedOut(kind) => info!(
                "[timed-out] session={session} sensor={sensor} waiting_for={}",
                kind.as_label()
            ),
        }
    }

    fn name(&self) -> &'static str {
        "log_writer"
    }
}
