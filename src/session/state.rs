//! # The calibration session state machine.
//!
//! [`CalibrationSession`] is pure: it owns no I/O and no clock. The runner feeds it
//! [`SessionInput`]s stamped with the current time and publishes whatever
//! [`StatusEvent`] comes back.
//!
//! ```text
//! Idle ─Start─► Connecting ─TransportOpened─► AwaitingHeartbeat ─Heartbeat─► CommandSent
//!                                                   │ heartbeat_timeout          │ CommandWritten
//!                                                   ▼                            ▼
//!                                                TimedOut ◄──ack_timeout──── AwaitingAck
//!                                                                   Rejected │   │ Accepted
//!                                                                            ▼   ▼
//!                          Failed ◄──Failed text── InProgress ◄─────────── (Failed)
//!                                                   │  ▲  Progress / SubStep
//!                                  Succeeded text   │  └──┘
//!                                  or quiet period  ▼
//!                                               Succeeded
//! ```
//!
//! ## Rules
//! - Terminal states (`Succeeded`, `Failed`, `TimedOut`) absorb every input.
//! - `session_timeout` is absolute from `Start`; it is checked before any other input
//!   except cancellation.
//! - Heartbeat and ack deadlines run from entry into their state; a resend restarts the
//!   ack deadline.
//! - Quiet completion: in `InProgress`, after the ack and at least one status line, a
//!   silence of `quiet_period` counts as success. Some firmware never prints an explicit
//!   completion line, so this is a heuristic, not a protocol guarantee.
//! - `Progress` with an unchanged percent emits nothing.
//! - Cancellation, or the link closing, fails the session with reason `"cancelled"`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::classify::{Classification, Context};
use crate::command::{AckOutcome, SensorKind, SubSteps};
use crate::error::LinkError;
use crate::events::{StatusEvent, TimeoutKind};

/// Lifecycle position of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Connecting,
    AwaitingHeartbeat,
    CommandSent,
    AwaitingAck,
    InProgress,
    Succeeded,
    Failed,
    TimedOut,
}

impl SessionState {
    pub const ALL: [SessionState; 9] = [
        SessionState::Idle,
        SessionState::Connecting,
        SessionState::AwaitingHeartbeat,
        SessionState::CommandSent,
        SessionState::AwaitingAck,
        SessionState::InProgress,
        SessionState::Succeeded,
        SessionState::Failed,
        SessionState::TimedOut,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Succeeded | SessionState::Failed | SessionState::TimedOut
        )
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::AwaitingHeartbeat => "awaiting_heartbeat",
            SessionState::CommandSent => "command_sent",
            SessionState::AwaitingAck => "awaiting_ack",
            SessionState::InProgress => "in_progress",
            SessionState::Succeeded => "succeeded",
            SessionState::Failed => "failed",
            SessionState::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Something that happened to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInput {
    Start,
    /// Exclusive access to the device link was obtained.
    TransportOpened,
    Heartbeat { system_id: u8, component_id: u8 },
    /// The request was written with this confirmation counter.
    CommandWritten { confirmation: u8 },
    Ack(AckOutcome),
    /// A classified status line.
    Text(Classification),
    /// Time passed; deadlines are evaluated.
    Tick,
    Cancel,
    LinkLost(LinkError),
}

/// Timeouts of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    pub heartbeat_timeout: Duration,
    pub ack_timeout: Duration,
    pub quiet_period: Duration,
    pub session_timeout: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(10),
            ack_timeout: Duration::from_secs(10),
            quiet_period: Duration::from_secs(5),
            session_timeout: Duration::from_secs(120),
        }
    }
}

/// Mutable record of one calibration attempt. Never reused.
#[derive(Debug, Clone)]
pub struct CalibrationSession {
    kind: SensorKind,
    timing: SessionTiming,
    state: SessionState,
    started_at: Option<Instant>,
    entered_at: Instant,
    last_activity_at: Option<Instant>,
    ack_received: bool,
    text_after_ack: bool,
    progress_percent: u8,
    last_emitted_percent: Option<u8>,
    completed: SubSteps,
    pending: SubSteps,
    target: Option<(u8, u8)>,
    last_event: Option<StatusEvent>,
}

impl CalibrationSession {
    /// A session in `Idle`. Sub-stepped kinds start with every orientation pending.
    pub fn new(kind: SensorKind, timing: SessionTiming, now: Instant) -> Self {
        Self {
            kind,
            timing,
            state: SessionState::Idle,
            started_at: None,
            entered_at: now,
            last_activity_at: None,
            ack_received: false,
            text_after_ack: false,
            progress_percent: 0,
            last_emitted_percent: None,
            completed: SubSteps::empty(),
            pending: kind.sub_steps(),
            target: None,
            last_event: None,
        }
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn timing(&self) -> &SessionTiming {
        &self.timing
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn last_activity_at(&self) -> Option<Instant> {
        self.last_activity_at
    }

    pub fn ack_received(&self) -> bool {
        self.ack_received
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    pub fn completed_sub_steps(&self) -> SubSteps {
        self.completed
    }

    pub fn pending_sub_steps(&self) -> SubSteps {
        self.pending
    }

    /// Device addressing seen in `AwaitingHeartbeat`.
    pub fn target(&self) -> Option<(u8, u8)> {
        self.target
    }

    /// The latest event this session emitted.
    pub fn last_event(&self) -> Option<&StatusEvent> {
        self.last_event.as_ref()
    }

    /// What the classifier needs to know about this session.
    pub fn context(&self) -> Context {
        Context {
            in_session: self.state != SessionState::Idle && !self.state.is_terminal(),
            awaiting_sub_steps: !self.pending.is_empty(),
        }
    }

    /// Absolute ceiling, once started.
    pub fn session_deadline(&self) -> Option<Instant> {
        if self.state.is_terminal() {
            return None;
        }
        self.started_at.map(|s| s + self.timing.session_timeout)
    }

    /// Earliest instant at which a [`SessionInput::Tick`] can change the state.
    pub fn deadline(&self) -> Option<Instant> {
        let session = self.session_deadline()?;
        let state = match self.state {
            SessionState::AwaitingHeartbeat => Some(self.entered_at + self.timing.heartbeat_timeout),
            SessionState::AwaitingAck => Some(self.entered_at + self.timing.ack_timeout),
            SessionState::InProgress => self.quiet_deadline(),
            _ => None,
        };
        Some(state.map_or(session, |d| d.min(session)))
    }

    /// Advances the machine. Returns the event to publish, if any.
    pub fn apply(&mut self, input: SessionInput, now: Instant) -> Option<StatusEvent> {
        if self.state.is_terminal() {
            return None;
        }

        let event = match input {
            SessionInput::Cancel | SessionInput::LinkLost(LinkError::Closed) => {
                self.finish(SessionState::Failed, StatusEvent::Failed(Arc::from("cancelled")))
            }
            SessionInput::LinkLost(e) => self.finish(
                SessionState::Failed,
                StatusEvent::Failed(Arc::from(format!("link lost: {e}"))),
            ),
            _ if self.session_expired(now) => {
                self.finish(SessionState::TimedOut, StatusEvent::TimedOut(TimeoutKind::Session))
            }
            SessionInput::Tick => self.on_tick(now),
            SessionInput::Text(class) if self.state == SessionState::InProgress => {
                self.on_text(class, now)
            }
            other => self.on_step(other, now),
        };

        if let Some(ev) = &event {
            self.last_event = Some(ev.clone());
        }
        event
    }

    fn on_step(&mut self, input: SessionInput, now: Instant) -> Option<StatusEvent> {
        use SessionInput as In;
        use SessionState as S;

        match (self.state, input) {
            (S::Idle, In::Start) => {
                self.started_at = Some(now);
                self.enter(S::Connecting, now);
                Some(StatusEvent::Connecting)
            }
            (S::Connecting, In::TransportOpened) => {
                self.enter(S::AwaitingHeartbeat, now);
                Some(StatusEvent::AwaitingHeartbeat)
            }
            (
                S::AwaitingHeartbeat,
                In::Heartbeat {
                    system_id,
                    component_id,
                },
            ) => {
                self.target = Some((system_id, component_id));
                self.enter(S::CommandSent, now);
                Some(StatusEvent::LinkAlive {
                    system_id,
                    component_id,
                })
            }
            (S::CommandSent, In::CommandWritten { confirmation }) => {
                self.enter(S::AwaitingAck, now);
                Some(StatusEvent::CommandSent { confirmation })
            }
            (S::AwaitingAck, In::CommandWritten { confirmation }) => {
                self.entered_at = now;
                Some(StatusEvent::CommandSent { confirmation })
            }
            (S::AwaitingAck, In::Ack(AckOutcome::Accepted)) => {
                self.ack_received = true;
                self.last_activity_at = Some(now);
                self.enter(S::InProgress, now);
                Some(StatusEvent::CommandAccepted)
            }
            (S::AwaitingAck, In::Ack(AckOutcome::Rejected(code))) => {
                self.finish(S::Failed, StatusEvent::CommandRejected(code))
            }
            (S::AwaitingAck, In::Ack(AckOutcome::NoResponse)) => {
                self.finish(S::TimedOut, StatusEvent::TimedOut(TimeoutKind::Ack))
            }
            _ => None,
        }
    }

    fn on_text(&mut self, class: Classification, now: Instant) -> Option<StatusEvent> {
        self.last_activity_at = Some(now);
        self.text_after_ack = true;

        match class {
            Classification::Failed(reason) => {
                self.finish(SessionState::Failed, StatusEvent::Failed(reason))
            }
            Classification::Succeeded => {
                self.finish(SessionState::Succeeded, StatusEvent::Succeeded)
            }
            Classification::Progress(pct) => {
                self.progress_percent = pct;
                if self.last_emitted_percent == Some(pct) {
                    return None;
                }
                self.last_emitted_percent = Some(pct);
                Some(StatusEvent::Progress {
                    percent: Some(pct),
                    note: None,
                })
            }
            Classification::SubStep(side) => {
                if !self.pending.remove(side) {
                    return None;
                }
                self.completed.insert(side);
                Some(StatusEvent::SubStepCompleted {
                    id: side,
                    remaining: self.pending,
                })
            }
            Classification::Instruction(note) => Some(StatusEvent::Progress {
                percent: None,
                note: Some(note),
            }),
            Classification::Ignore => None,
        }
    }

    fn on_tick(&mut self, now: Instant) -> Option<StatusEvent> {
        match self.state {
            SessionState::AwaitingHeartbeat
                if now >= self.entered_at + self.timing.heartbeat_timeout =>
            {
                self.finish(
                    SessionState::TimedOut,
                    StatusEvent::TimedOut(TimeoutKind::Heartbeat),
                )
            }
            SessionState::AwaitingAck if now >= self.entered_at + self.timing.ack_timeout => {
                self.finish(SessionState::TimedOut, StatusEvent::TimedOut(TimeoutKind::Ack))
            }
            SessionState::InProgress if self.quiet_deadline().is_some_and(|d| now >= d) => {
                self.finish(SessionState::Succeeded, StatusEvent::Succeeded)
            }
            _ => None,
        }
    }

    /// Silence never completes a session with orientations still pending.
    fn quiet_deadline(&self) -> Option<Instant> {
        if !(self.ack_received && self.text_after_ack) || !self.pending.is_empty() {
            return None;
        }
        self.last_activity_at.map(|t| t + self.timing.quiet_period)
    }

    fn session_expired(&self, now: Instant) -> bool {
        self.session_deadline().is_some_and(|d| now >= d)
    }

    fn enter(&mut self, state: SessionState, now: Instant) {
        self.state = state;
        self.entered_at = now;
    }

    fn finish(&mut self, state: SessionState, event: StatusEvent) -> Option<StatusEvent> {
        self.state = state;
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::command::Orientation;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn timing() -> SessionTiming {
        SessionTiming::default()
    }

    /// Drives a fresh session to `InProgress` at `t0`.
    fn in_progress(kind: SensorKind, t0: Instant) -> CalibrationSession {
        let mut s = CalibrationSession::new(kind, timing(), t0);
        s.apply(SessionInput::Start, t0);
        s.apply(SessionInput::TransportOpened, t0);
        s.apply(
            SessionInput::Heartbeat {
                system_id: 1,
                component_id: 1,
            },
            t0,
        );
        s.apply(SessionInput::CommandWritten { confirmation: 0 }, t0);
        assert_eq!(
            s.apply(SessionInput::Ack(AckOutcome::Accepted), t0),
            Some(StatusEvent::CommandAccepted)
        );
        assert_eq!(s.state(), SessionState::InProgress);
        s
    }

    fn text(s: &mut CalibrationSession, line: &str, now: Instant) -> Option<StatusEvent> {
        let class = classify(line, s.context());
        s.apply(SessionInput::Text(class), now)
    }

    fn all_inputs() -> Vec<SessionInput> {
        vec![
            SessionInput::Start,
            SessionInput::TransportOpened,
            SessionInput::Heartbeat {
                system_id: 1,
                component_id: 1,
            },
            SessionInput::CommandWritten { confirmation: 0 },
            SessionInput::Ack(AckOutcome::Accepted),
            SessionInput::Ack(AckOutcome::Rejected(2)),
            SessionInput::Ack(AckOutcome::NoResponse),
            SessionInput::Text(Classification::Succeeded),
            SessionInput::Text(Classification::Failed(Arc::from("x"))),
            SessionInput::Text(Classification::Progress(50)),
            SessionInput::Text(Classification::SubStep(Orientation::Up)),
            SessionInput::Text(Classification::Instruction(Arc::from("hold vehicle still"))),
            SessionInput::Text(Classification::Ignore),
            SessionInput::Tick,
            SessionInput::Cancel,
            SessionInput::LinkLost(LinkError::Closed),
            SessionInput::LinkLost(LinkError::io("boom")),
        ]
    }

    #[test]
    fn happy_path_emits_one_event_per_transition() {
        let t0 = Instant::now();
        let mut s = CalibrationSession::new(SensorKind::Gyro, timing(), t0);

        assert_eq!(s.apply(SessionInput::Start, t0), Some(StatusEvent::Connecting));
        assert_eq!(
            s.apply(SessionInput::TransportOpened, t0),
            Some(StatusEvent::AwaitingHeartbeat)
        );
        assert_eq!(
            s.apply(
                SessionInput::Heartbeat {
                    system_id: 1,
                    component_id: 2
                },
                t0
            ),
            Some(StatusEvent::LinkAlive {
                system_id: 1,
                component_id: 2
            })
        );
        assert_eq!(s.state(), SessionState::CommandSent);
        assert_eq!(
            s.apply(SessionInput::CommandWritten { confirmation: 0 }, t0),
            Some(StatusEvent::CommandSent { confirmation: 0 })
        );
        assert_eq!(
            s.apply(SessionInput::Ack(AckOutcome::Accepted), t0),
            Some(StatusEvent::CommandAccepted)
        );
        assert_eq!(
            text(&mut s, "[cal] progress <40>", t0 + secs(1)),
            Some(StatusEvent::Progress {
                percent: Some(40),
                note: None
            })
        );
        assert_eq!(
            text(&mut s, "[cal] calibration done: gyro", t0 + secs(2)),
            Some(StatusEvent::Succeeded)
        );
        assert_eq!(s.state(), SessionState::Succeeded);
        assert_eq!(s.target(), Some((1, 2)));
        assert_eq!(s.last_event(), Some(&StatusEvent::Succeeded));
    }

    #[test]
    fn terminal_states_absorb_every_input() {
        let t0 = Instant::now();
        let terminals: Vec<(SessionState, CalibrationSession)> = vec![
            {
                let mut s = in_progress(SensorKind::Gyro, t0);
                text(&mut s, "calibration done", t0);
                (SessionState::Succeeded, s)
            },
            {
                let mut s = in_progress(SensorKind::Gyro, t0);
                s.apply(SessionInput::Cancel, t0);
                (SessionState::Failed, s)
            },
            {
                let mut s = CalibrationSession::new(SensorKind::Gyro, timing(), t0);
                s.apply(SessionInput::Start, t0);
                s.apply(SessionInput::Tick, t0 + secs(120));
                (SessionState::TimedOut, s)
            },
        ];

        for (expected, session) in terminals {
            assert_eq!(session.state(), expected);
            for input in all_inputs() {
                for later in [0, 1, 500] {
                    let mut s = session.clone();
                    assert_eq!(s.apply(input.clone(), t0 + secs(later)), None, "{expected} + {input:?}");
                    assert_eq!(s.state(), expected);
                }
            }
            assert_eq!(session.deadline(), None);
        }
    }

    /// Quiet completion is a heuristic for firmware without a completion line.
    #[test]
    fn quiet_period_after_activity_means_success() {
        let t0 = Instant::now();
        let mut s = in_progress(SensorKind::Barometer, t0);

        text(&mut s, "[cal] progress <10>", t0 + secs(1));
        assert_eq!(s.deadline(), Some(t0 + secs(6)));

        assert_eq!(s.apply(SessionInput::Tick, t0 + Duration::from_millis(5_999)), None);
        assert_eq!(
            s.apply(SessionInput::Tick, t0 + secs(6)),
            Some(StatusEvent::Succeeded)
        );
    }

    #[test]
    fn no_quiet_completion_without_any_status_line() {
        let t0 = Instant::now();
        let mut s = in_progress(SensorKind::Barometer, t0);

        assert_eq!(s.apply(SessionInput::Tick, t0 + secs(29)), None);
        assert_eq!(s.state(), SessionState::InProgress);
        assert_eq!(s.deadline(), Some(t0 + secs(120)));
    }

    #[test]
    fn silence_with_sides_pending_is_not_success() {
        let t0 = Instant::now();
        let mut s = in_progress(SensorKind::Accelerometer, t0);

        text(&mut s, "[cal] front side done, rotate to a different side", t0 + secs(1));
        assert_eq!(s.pending_sub_steps().len(), 5);
        assert_eq!(s.deadline(), Some(t0 + secs(120)));

        assert_eq!(s.apply(SessionInput::Tick, t0 + secs(6)), None);
        assert_eq!(s.apply(SessionInput::Tick, t0 + secs(60)), None);
        assert_eq!(s.state(), SessionState::InProgress);

        assert_eq!(
            s.apply(SessionInput::Tick, t0 + secs(120)),
            Some(StatusEvent::TimedOut(TimeoutKind::Session))
        );
    }

    #[test]
    fn accelerometer_tracks_six_distinct_sides() {
        let t0 = Instant::now();
        let mut s = in_progress(SensorKind::Accelerometer, t0);
        assert_eq!(s.pending_sub_steps(), SubSteps::all());

        let sides = ["front", "back", "left", "right", "up", "down"];
        for (i, side) in sides.iter().enumerate() {
            let now = t0 + secs(i as u64 + 1);
            let ev = text(&mut s, &format!("[cal] {side} side done, rotate to a different side"), now);
            assert!(matches!(ev, Some(StatusEvent::SubStepCompleted { .. })), "{side}: {ev:?}");
            if !s.pending_sub_steps().is_empty() {
                // a repeated side changes nothing
                assert_eq!(text(&mut s, &format!("[cal] {side} side done"), now), None);
                assert_eq!(
                    text(&mut s, "[cal] side already completed", now).map(|e| e.as_label()),
                    Some("progress")
                );
            }
            assert!(s.completed_sub_steps().is_disjoint(&s.pending_sub_steps()));
            assert_eq!(
                s.completed_sub_steps().union(&s.pending_sub_steps()),
                SubSteps::all()
            );
        }

        assert_eq!(
            s.apply(
                SessionInput::Text(Classification::SubStep(Orientation::Front)),
                t0 + secs(7)
            ),
            None
        );
        assert_eq!(s.completed_sub_steps().len(), 6);
        assert!(s.pending_sub_steps().is_empty());
        assert_eq!(s.state(), SessionState::InProgress);
    }

    #[test]
    fn unchanged_percent_is_not_re_emitted() {
        let t0 = Instant::now();
        let mut s = in_progress(SensorKind::Magnetometer, t0);

        assert!(text(&mut s, "progress 20", t0).is_some());
        assert_eq!(text(&mut s, "progress 20", t0 + secs(1)), None);
        assert!(text(&mut s, "progress 21", t0 + secs(2)).is_some());
        assert_eq!(s.progress_percent(), 21);
        // suppressed lines still count as activity
        assert_eq!(s.last_activity_at(), Some(t0 + secs(2)));
    }

    #[test]
    fn session_ceiling_beats_long_heartbeat_timeout() {
        let t0 = Instant::now();
        let t = SessionTiming {
            heartbeat_timeout: secs(60),
            session_timeout: secs(30),
            ..timing()
        };
        let mut s = CalibrationSession::new(SensorKind::Gyro, t, t0);
        s.apply(SessionInput::Start, t0);
        s.apply(SessionInput::TransportOpened, t0);

        assert_eq!(s.deadline(), Some(t0 + secs(30)));
        assert_eq!(s.apply(SessionInput::Tick, t0 + Duration::from_millis(29_999)), None);
        assert_eq!(
            s.apply(SessionInput::Tick, t0 + secs(30)),
            Some(StatusEvent::TimedOut(TimeoutKind::Session))
        );
    }

    #[test]
    fn heartbeat_and_ack_deadlines_run_from_state_entry() {
        let t0 = Instant::now();
        let mut s = CalibrationSession::new(SensorKind::Gyro, timing(), t0);
        s.apply(SessionInput::Start, t0);
        s.apply(SessionInput::TransportOpened, t0 + secs(3));
        assert_eq!(s.deadline(), Some(t0 + secs(13)));
        assert_eq!(
            s.apply(SessionInput::Tick, t0 + secs(13)),
            Some(StatusEvent::TimedOut(TimeoutKind::Heartbeat))
        );

        let mut s = CalibrationSession::new(SensorKind::Gyro, timing(), t0);
        s.apply(SessionInput::Start, t0);
        s.apply(SessionInput::TransportOpened, t0);
        s.apply(
            SessionInput::Heartbeat {
                system_id: 1,
                component_id: 1,
            },
            t0,
        );
        s.apply(SessionInput::CommandWritten { confirmation: 0 }, t0);
        // a resend restarts the ack wait
        assert_eq!(
            s.apply(SessionInput::CommandWritten { confirmation: 1 }, t0 + secs(8)),
            Some(StatusEvent::CommandSent { confirmation: 1 })
        );
        assert_eq!(s.apply(SessionInput::Tick, t0 + secs(10)), None);
        assert_eq!(
            s.apply(SessionInput::Tick, t0 + secs(18)),
            Some(StatusEvent::TimedOut(TimeoutKind::Ack))
        );
    }

    #[test]
    fn rejection_is_terminal_failure_with_code() {
        let t0 = Instant::now();
        let mut s = CalibrationSession::new(SensorKind::Gyro, timing(), t0);
        s.apply(SessionInput::Start, t0);
        s.apply(SessionInput::TransportOpened, t0);
        s.apply(
            SessionInput::Heartbeat {
                system_id: 1,
                component_id: 1,
            },
            t0,
        );
        s.apply(SessionInput::CommandWritten { confirmation: 0 }, t0);
        assert_eq!(
            s.apply(SessionInput::Ack(AckOutcome::Rejected(4)), t0),
            Some(StatusEvent::CommandRejected(4))
        );
        assert_eq!(s.state(), SessionState::Failed);
    }

    #[test]
    fn cancel_and_link_faults_fail_any_live_state() {
        let t0 = Instant::now();
        let mut s = in_progress(SensorKind::Gyro, t0);
        assert_eq!(
            s.apply(SessionInput::LinkLost(LinkError::Closed), t0),
            Some(StatusEvent::Failed(Arc::from("cancelled")))
        );

        let mut s = CalibrationSession::new(SensorKind::Gyro, timing(), t0);
        assert_eq!(
            s.apply(SessionInput::Cancel, t0),
            Some(StatusEvent::Failed(Arc::from("cancelled")))
        );

        let mut s = in_progress(SensorKind::Gyro, t0);
        let ev = s.apply(SessionInput::LinkLost(LinkError::io("usb unplugged")), t0);
        assert!(matches!(ev, Some(StatusEvent::Failed(r)) if r.contains("usb unplugged")));
    }

    #[test]
    fn device_failure_text_fails_in_progress_session() {
        let t0 = Instant::now();
        let mut s = in_progress(SensorKind::Magnetometer, t0);
        assert_eq!(
            text(&mut s, "[cal] calibration failed: mag 0 fit error", t0),
            Some(StatusEvent::Failed(Arc::from("[cal] calibration failed: mag 0 fit error")))
        );
    }
}
