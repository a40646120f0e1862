//! # Drives one calibration session against a device link.
//!
//! The runner owns a [`CalibrationSession`] and the device lock for the session's whole
//! lifetime. It never busy-polls: each wait is a single bounded receive whose deadline is
//! the nearest of the machine deadline, the next GCS heartbeat, and `poll_interval`.
//!
//! ## Event flow
//! ```text
//! Start ─► lock DeviceLink ─► TransportOpened ─► (live link? Heartbeat : wait)
//!       ─► Dispatcher::request ─► CommandWritten.. ─► Ack(outcome)
//!       ─► loop { receive ─► classify ─► Text | Heartbeat ; Tick } until terminal
//! ```
//!
//! ## Rules
//! - Exactly one consumer drains the link while the session runs.
//! - Cancel and device close are raced against every wait (`select!`, biased).
//! - Every emitted [`StatusEvent`] is published once and mirrored into the state watch.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedMutexGuard, watch};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classify::classify;
use crate::command::{CalibrationRequest, Dispatcher, SensorKind};
use crate::core::Config;
use crate::error::LinkError;
use crate::events::{Bus, Event, StatusEvent};
use crate::link::{DeviceLink, LinkSession, MAV_STATE_CALIBRATING, Message, SensorHealthSnapshot};

use super::{CalibrationSession, SessionId, SessionInput, SessionReport, SessionState};

/// Why a wait ended early.
enum Interrupt {
    Cancelled,
    Closed,
}

pub(crate) struct SessionRunner {
    pub(crate) id: SessionId,
    pub(crate) kind: SensorKind,
    pub(crate) cfg: Arc<Config>,
    pub(crate) device: DeviceLink,
    pub(crate) bus: Bus,
    pub(crate) cancel: CancellationToken,
    pub(crate) state_tx: watch::Sender<SessionState>,
    pub(crate) verify_health: bool,
}

impl SessionRunner {
    /// Runs the session to a terminal state.
    pub(crate) async fn run(self) -> SessionReport {
        let started = Instant::now();
        let mut machine =
            CalibrationSession::new(self.kind, self.cfg.timing_for(self.kind), started);
        self.step(&mut machine, SessionInput::Start);

        let mut health = (None, None);
        if let Some(mut link) = self.acquire(&mut machine).await {
            health.0 = self.sample_health(&mut link).await;
            self.drive(&mut machine, &mut link).await;
            health.1 = self.sample_health(&mut link).await;
        }

        SessionReport {
            id: self.id,
            sensor: self.kind,
            state: machine.state(),
            last_event: machine.last_event().cloned(),
            progress_percent: machine.progress_percent(),
            completed_sub_steps: machine.completed_sub_steps(),
            pending_sub_steps: machine.pending_sub_steps(),
            health_before: health.0,
            health_after: health.1,
            elapsed: started.elapsed(),
        }
    }

    /// `Connecting`: waits for exclusive use of the device.
    async fn acquire(&self, machine: &mut CalibrationSession) -> Option<OwnedMutexGuard<LinkSession>> {
        let closed = self.device.closed();
        let deadline = machine.session_deadline()?;

        let input = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => SessionInput::Cancel,
            _ = closed.cancelled() => SessionInput::LinkLost(LinkError::Closed),
            _ = time::sleep_until(deadline) => SessionInput::Tick,
            link = self.device.lock() => {
                if link.is_closed() {
                    SessionInput::LinkLost(LinkError::Closed)
                } else {
                    self.step(machine, SessionInput::TransportOpened);
                    return Some(link);
                }
            }
        };
        self.step(machine, input);
        None
    }

    /// Everything from `AwaitingHeartbeat` to a terminal state.
    async fn drive(&self, machine: &mut CalibrationSession, link: &mut LinkSession) {
        let closed = self.device.closed();
        let poll = self.cfg.poll_interval_clamped();
        let gcs_interval = self.cfg.gcs_heartbeat();
        let mut next_gcs = Instant::now();

        if link.is_alive(Instant::now()) {
            let (system_id, component_id) = link.target();
            self.step(
                machine,
                SessionInput::Heartbeat {
                    system_id,
                    component_id,
                },
            );
        }

        while !machine.state().is_terminal() {
            if let Some(interval) = gcs_interval {
                if Instant::now() >= next_gcs {
                    if let Err(e) = link.send_heartbeat().await {
                        debug!(session = %self.id, error = %e, "gcs heartbeat not sent");
                    }
                    next_gcs = Instant::now() + interval;
                }
            }

            if machine.state() == SessionState::CommandSent {
                self.dispatch(machine, link, &closed).await;
                continue;
            }

            let mut wake = Instant::now() + poll;
            if let Some(d) = machine.deadline() {
                wake = wake.min(d);
            }
            if gcs_interval.is_some() {
                wake = wake.min(next_gcs);
            }

            let received = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(Interrupt::Cancelled),
                _ = closed.cancelled() => Err(Interrupt::Closed),
                res = link.receive_until(wake, None) => Ok(res),
            };

            match received {
                Err(Interrupt::Cancelled) => self.step(machine, SessionInput::Cancel),
                Err(Interrupt::Closed) => {
                    self.step(machine, SessionInput::LinkLost(LinkError::Closed))
                }
                Ok(Err(e)) => self.step(machine, SessionInput::LinkLost(e)),
                Ok(Ok(Some(msg))) => self.on_message(machine, msg),
                Ok(Ok(None)) => {}
            }
            self.step(machine, SessionInput::Tick);
        }
    }

    /// `CommandSent` → `AwaitingAck` → ack outcome, bounded by the session ceiling.
    async fn dispatch(
        &self,
        machine: &mut CalibrationSession,
        link: &mut LinkSession,
        closed: &CancellationToken,
    ) {
        let Some(deadline) = machine.session_deadline() else {
            return;
        };
        let dispatcher: Dispatcher = self.cfg.dispatcher();
        let request = CalibrationRequest::new(self.kind);

        let outcome = {
            let on_sent = |req: &CalibrationRequest| {
                self.step(
                    machine,
                    SessionInput::CommandWritten {
                        confirmation: req.confirmation(),
                    },
                );
            };
            tokio::select! {
                biased;
                _ = closed.cancelled() => Some(Err(LinkError::Closed)),
                res = time::timeout_at(deadline, dispatcher.request(link, request, &self.cancel, on_sent)) => res.ok(),
            }
        };

        let input = match outcome {
            Some(Ok(ack)) => SessionInput::Ack(ack),
            Some(Err(_)) if self.cancel.is_cancelled() => SessionInput::Cancel,
            Some(Err(e)) => SessionInput::LinkLost(e),
            None => SessionInput::Tick,
        };
        self.step(machine, input);
    }

    fn on_message(&self, machine: &mut CalibrationSession, msg: Message) {
        match msg {
            Message::StatusText { text, .. } => {
                let class = classify(&text, machine.context());
                debug!(session = %self.id, text = %text, ?class, "status text");
                self.step(machine, SessionInput::Text(class));
            }
            Message::Heartbeat {
                system_id,
                component_id,
                system_status,
            } => {
                if system_status == MAV_STATE_CALIBRATING {
                    debug!(session = %self.id, "device reports calibrating");
                }
                self.step(
                    machine,
                    SessionInput::Heartbeat {
                        system_id,
                        component_id,
                    },
                );
            }
            Message::CommandAck { command, result } => {
                debug!(session = %self.id, command, result, "late ack ignored");
            }
            Message::SysStatus(_) | Message::Other { .. } => {}
        }
    }

    async fn sample_health(&self, link: &mut LinkSession) -> Option<SensorHealthSnapshot> {
        if !self.verify_health
            || self.cancel.is_cancelled()
            || self.device.is_closed()
            || link.is_closed()
        {
            return None;
        }
        let timeout: Duration = self.cfg.health_sample_timeout;
        let res = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            res = link.sample_health(timeout) => res,
        };
        match res {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!(session = %self.id, error = %e, "health sample failed");
                None
            }
        }
    }

    /// Applies `input` and publishes the resulting event, if any.
    fn step(&self, machine: &mut CalibrationSession, input: SessionInput) {
        let Some(status) = machine.apply(input, Instant::now()) else {
            return;
        };
        self.state_tx.send_replace(machine.state());

        match &status {
            StatusEvent::Succeeded => {
                info!(session = %self.id, sensor = %self.kind, "calibration succeeded")
            }
            StatusEvent::Failed(reason) => {
                warn!(session = %self.id, sensor = %self.kind, reason = %reason, "calibration failed")
            }
            StatusEvent::CommandRejected(code) => {
                warn!(session = %self.id, sensor = %self.kind, result = code, "calibration request rejected")
            }
            StatusEvent::TimedOut(kind) => {
                warn!(session = %self.id, sensor = %self.kind, waiting_for = kind.as_label(), "calibration timed out")
            }
            other => debug!(session = %self.id, sensor = %self.kind, event = %other, "session event"),
        }
        self.bus.publish(Event::new(self.id, self.kind, status));
    }
}
