#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use calvisor::link::mock::{self, MockConnector, MockDevice};
use calvisor::{
    CalibrationRequest, CommandLong, Config, DeviceLink, Endpoint, Event, SensorHealthSnapshot,
    SensorKind, SessionId, StatusEvent, Supervisor,
};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio::time;

pub const PREFLIGHT_CALIBRATION: u16 = 241;

/// A supervisor connected to one mock device (system 1, component 1).
pub async fn connected(cfg: Config) -> (Arc<Supervisor>, MockDevice, DeviceLink) {
    let (link, device) = mock::pair(1, 1);
    let connector = MockConnector::new();
    connector.push_link(link);
    let sup = Supervisor::builder(cfg, connector).build();

    device.heartbeat();
    let dl = sup
        .connect(&Endpoint::new("mock"))
        .await
        .expect("mock device answers with a heartbeat");
    (sup, device, dl)
}

/// Events of `session` received so far.
pub fn drain(rx: &mut broadcast::Receiver<Event>, session: SessionId) -> Vec<StatusEvent> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(ev) if ev.session == session => out.push(ev.status),
            Ok(_) | Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
    out
}

/// Which calibration a command asks for.
pub fn kind_of(cmd: &CommandLong) -> Option<SensorKind> {
    SensorKind::ALL
        .into_iter()
        .find(|k| CalibrationRequest::new(*k).params() == cmd.params)
}

/// How the simulated flight controller answers one calibration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Accept, then report completion.
    Complete,
    /// Accept, then report failure.
    Fail,
    /// Refuse with this result code.
    Reject(u8),
    /// Never answer.
    Silent,
    /// Accept, report one progress line, then go quiet.
    Quiet,
}

/// A simulated flight controller running in the background; stops when dropped.
pub struct Autopilot {
    seen: Arc<Mutex<Vec<CommandLong>>>,
    task: JoinHandle<()>,
}

impl Autopilot {
    /// Every command received so far.
    pub fn commands(&self) -> Vec<CommandLong> {
        self.seen.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Kinds of every calibration request received so far.
    pub fn requested(&self) -> Vec<SensorKind> {
        self.commands().iter().filter_map(kind_of).collect()
    }
}

impl Drop for Autopilot {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Plays a flight controller: heartbeats every second and answers every calibration
/// request per `script`.
pub fn autopilot<F>(device: MockDevice, script: F) -> Autopilot
where
    F: FnMut(SensorKind) -> Reply + Send + 'static,
{
    autopilot_reporting(device, None, script)
}

/// Like [`autopilot`], also sending `health` as `SYS_STATUS` with every heartbeat.
pub fn autopilot_reporting<F>(
    device: MockDevice,
    health: Option<SensorHealthSnapshot>,
    mut script: F,
) -> Autopilot
where
    F: FnMut(SensorKind) -> Reply + Send + 'static,
{
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let task = tokio::spawn(async move {
        let mut beat = time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = beat.tick() => {
                    device.heartbeat();
                    if let Some(snapshot) = health {
                        device.sys_status(snapshot);
                    }
                }
                cmd = device.next_command() => {
                    let Some(cmd) = cmd else { break };
                    log.lock().expect("command log").push(cmd);
                    let Some(kind) = kind_of(&cmd) else { continue };
                    match script(kind) {
                        Reply::Complete => {
                            device.ack(PREFLIGHT_CALIBRATION, 0);
                            device.status_text(&format!("[cal] {kind} calibration complete"));
                        }
                        Reply::Fail => {
                            device.ack(PREFLIGHT_CALIBRATION, 0);
                            device.status_text("[cal] calibration failed");
                        }
                        Reply::Reject(code) => device.ack(PREFLIGHT_CALIBRATION, code),
                        Reply::Silent => {}
                        Reply::Quiet => {
                            device.ack(PREFLIGHT_CALIBRATION, 0);
                            device.status_text("[cal] progress <50>");
                        }
                    }
                }
            }
        }
    });
    Autopilot { seen, task }
}
