//! # Batch plans and their outcome.
//!
//! A [`BatchPlan`] is the input of `Supervisor::start_batch`: which sensors, in which
//! order, and what to do when one of them does not succeed. The supervisor runs exactly
//! one session at a time and hands back a [`BatchReport`].

use std::time::Duration;

use crate::command::SensorKind;
use crate::link::Endpoint;
use crate::policies::BatchMode;
use crate::session::SessionReport;

/// Ordered list of calibrations to run against one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    /// Kinds, in execution order. Duplicates run twice.
    pub kinds: Vec<SensorKind>,
    /// Continuation policy after a non-successful session.
    pub mode: BatchMode,
    /// Attempts per kind (min 1). Each attempt is a fresh session.
    pub session_attempts: u32,
    /// Sample `SYS_STATUS` before and after each session.
    pub verify_health: bool,
}

impl BatchPlan {
    /// A plan over `kinds` with the default mode, one attempt each, no health sampling.
    pub fn new(kinds: impl IntoIterator<Item = SensorKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
            mode: BatchMode::default(),
            session_attempts: 1,
            verify_health: false,
        }
    }

    /// gyro → magnetometer → accelerometer → barometer.
    pub fn standard() -> Self {
        Self::new([
            SensorKind::Gyro,
            SensorKind::Magnetometer,
            SensorKind::Accelerometer,
            SensorKind::Barometer,
        ])
    }

    pub fn with_mode(mut self, mode: BatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_session_attempts(mut self, attempts: u32) -> Self {
        self.session_attempts = attempts.max(1);
        self
    }

    pub fn with_health_check(mut self) -> Self {
        self.verify_health = true;
        self
    }
}

impl Default for BatchPlan {
    fn default() -> Self {
        Self::standard()
    }
}

/// What happened to a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub endpoint: Endpoint,
    /// Number of kinds in the plan.
    pub planned: usize,
    /// Final report of each kind that ran (the last attempt when retried).
    pub sessions: Vec<SessionReport>,
    /// True if the batch stopped before running every kind.
    pub aborted: bool,
    pub elapsed: Duration,
}

impl BatchReport {
    /// Every planned kind ran and succeeded.
    pub fn succeeded(&self) -> bool {
        !self.aborted
            && self.sessions.len() == self.planned
            && self.sessions.iter().all(SessionReport::succeeded)
    }

    /// Kinds whose session did not succeed, in execution order.
    pub fn unsuccessful(&self) -> Vec<SensorKind> {
        self.sessions
            .iter()
            .filter(|r| !r.succeeded())
            .map(|r| r.sensor)
            .collect()
    }
}
