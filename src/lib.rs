//! # calvisor
//!
//! **Calvisor** drives flight-controller sensor calibrations over an unreliable
//! MAVLink-style telemetry link and reports live progress to any number of observers.
//!
//! The device says very little in a structured way: it acknowledges the calibration
//! command, then narrates progress as free-text `STATUSTEXT` lines. Calvisor turns that
//! into a typed, timeout-bounded session lifecycle.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐        ┌──────────────┐        ┌──────────────┐
//!     │   Endpoint   │        │  BatchPlan   │        │  SensorKind  │
//!     └──────┬───────┘        └──────┬───────┘        └──────┬───────┘
//!            ▼                       ▼                       ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor                                                       │
//! │  - connect (Retry + heartbeat) ─► DeviceLink                      │
//! │  - start_session / start_batch (cooldowns, BatchMode)             │
//! │  - Bus + SubscriberSet (fan-out), SessionTracker                  │
//! └──────┬─────────────────────────────────────────────────────┬──────┘
//!        ▼  one at a time per DeviceLink                       │
//! ┌──────────────────────────────────────────────┐             │
//! │  SessionRunner                               │             │
//! │  CalibrationSession (pure state machine)     │             │
//! │    ▲ Heartbeat / Ack / Text(classify) / Tick │             │
//! │    │                                         │             │
//! │  Dispatcher ─► COMMAND_LONG, COMMAND_ACK     │             │
//! │  LinkSession ◄─► Link (mock | mavlink)       │             │
//! └──────┬───────────────────────────────────────┘             │
//!        │ StatusEvent                                         │
//!        ▼                                                     ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                 Bus (broadcast, capacity: Config::bus_capacity)   │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                         SubscriberSet (per-sink ring, drop-oldest)
//!                       ┌───────────┼──────────────┬──────────┐
//!                       ▼           ▼              ▼          ▼
//!                 SessionTracker OutwardForwarder LogWriter  custom
//! ```
//!
//! ### Session lifecycle
//! ```text
//! Idle ─► Connecting ─► AwaitingHeartbeat ─► CommandSent ─► AwaitingAck ─► InProgress
//!                              │                                 │             │
//!                              └─► TimedOut      Failed/TimedOut ◄┘             ├─► Succeeded
//!                                                                               └─► Failed
//! any non-terminal ─► TimedOut (session ceiling) | Failed("cancelled") (cancel, link closed)
//! ```
//!
//! ## Features
//! | Area            | Description                                              | Key types                                  |
//! |-----------------|----------------------------------------------------------|--------------------------------------------|
//! | **Supervision** | Connections, sessions, batches, cooldowns                | [`Supervisor`], [`BatchPlan`]               |
//! | **Sessions**    | Pure state machine and its async driver                  | [`CalibrationSession`], [`SessionHandle`]  |
//! | **Protocol**    | Requests, acknowledgments, status-text classification    | [`CalibrationRequest`], [`classify`]       |
//! | **Transport**   | Pluggable links, in-memory mock                          | [`Link`], [`Connector`], [`link::mock`]    |
//! | **Sinks**       | Non-blocking event fan-out                               | [`Subscribe`], [`OutwardForwarder`]        |
//! | **Policies**    | Retry, backoff, batch continuation                       | [`Retry`], [`BackoffPolicy`], [`BatchMode`] |
//!
//! ## Optional features
//! - `logging`: exports the built-in [`LogWriter`] sink.
//! - `mavlink`: exports [`MavlinkConnector`] (serial/UDP/TCP via the `mavlink` crate).
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use calvisor::{Config, Endpoint, OutwardForwarder, SensorKind, Subscribe, Supervisor};
//! use calvisor::link::mock::{self, MockConnector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (link, device) = mock::pair(1, 1);
//!     let connector = MockConnector::new();
//!     connector.push_link(link);
//!
//!     let (outward, mut lines) = OutwardForwarder::channel(64);
//!     let sup = Supervisor::builder(Config::default(), connector)
//!         .with_subscribers(vec![Arc::new(outward) as Arc<dyn Subscribe>])
//!         .build();
//!
//!     device.heartbeat();
//!     let link = sup.connect(&Endpoint::new("mock")).await?;
//!
//!     device.ack(241, 0);
//!     device.status_text("[cal] gyro calibration complete");
//!     let report = sup.start_session(SensorKind::Gyro, &link).wait().await;
//!     assert!(report.succeeded());
//!
//!     while let Ok(line) = lines.try_recv() {
//!         println!("{line}");
//!     }
//!     Ok(())
//! }
//! ```

mod classify;
mod command;
mod core;
mod error;
mod events;
pub mod link;
mod policies;
mod session;
mod subscribers;

// ---- Public re-exports ----

pub use classify::{Classification, Context, classify};
pub use command::{
    AckOutcome, CalibrationRequest, Dispatcher, MAV_CMD_PREFLIGHT_CALIBRATION,
    MAV_RESULT_ACCEPTED, Orientation, SensorKind, SubSteps, UnknownSensorKind, correlate,
};
pub use core::{
    BatchPlan, BatchReport, Config, ShutdownSignal, Supervisor, SupervisorBuilder,
    wait_for_shutdown_signal,
};
pub use error::{BatchError, ConnectionError, LinkError};
pub use events::{Bus, Event, StatusEvent, TimeoutKind};
pub use link::{
    CommandLong, ConnectOptions, Connector, DeviceLink, Endpoint, Identity, Link, LinkSession,
    MAV_STATE_CALIBRATING, Message, MessageKind, Outgoing, SensorHealthSnapshot,
};
pub use policies::{AttemptError, BackoffPolicy, BatchMode, JitterPolicy, Retry, RetryError};
pub use session::{
    CalibrationSession, SessionHandle, SessionId, SessionInput, SessionReport, SessionState,
    SessionTiming,
};
pub use subscribers::{
    OutwardForwarder, OutwardMessage, SessionStatus, SessionTracker, Subscribe, SubscriberSet,
    SubscriptionHandle, strip_cal_marker,
};

// Optional: MAVLink transport.
// Enable with: `--features mavlink`
#[cfg(feature = "mavlink")]
pub use link::MavlinkConnector;

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
