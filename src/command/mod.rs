//! # Calibration requests and their acknowledgment.
//!
//! - [`SensorKind`] names one calibration and owns its parameter-slot mapping.
//! - [`CalibrationRequest`] is the immutable value sent for one session attempt.
//! - [`Dispatcher`] writes requests and correlates `COMMAND_ACK` replies.
//!
//! A request always carries exactly one non-zero slot. There is no "all sensors"
//! request: batches are sequences of single-kind sessions.

mod dispatcher;
mod request;

use std::fmt;
use std::str::FromStr;

pub use dispatcher::{AckOutcome, Dispatcher, correlate};
pub use request::{CalibrationRequest, MAV_CMD_PREFLIGHT_CALIBRATION, MAV_RESULT_ACCEPTED};

/// The calibrations this engine can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SensorKind {
    Gyro,
    Accelerometer,
    Magnetometer,
    Barometer,
    LevelHorizon,
    RadioTrim,
}

impl SensorKind {
    /// Every kind, in the order a full batch usually runs them.
    pub const ALL: [SensorKind; 6] = [
        SensorKind::Gyro,
        SensorKind::Magnetometer,
        SensorKind::Accelerometer,
        SensorKind::Barometer,
        SensorKind::LevelHorizon,
        SensorKind::RadioTrim,
    ];

    /// `(slot index, value)` of the single `MAV_CMD_PREFLIGHT_CALIBRATION` parameter.
    ///
    /// Slot indices are 0-based (`param1` = 0).
    pub fn slot(&self) -> (usize, f32) {
        match self {
            SensorKind::Gyro => (0, 1.0),
            SensorKind::Magnetometer => (1, 1.0),
            SensorKind::Barometer => (2, 1.0),
            SensorKind::RadioTrim => (3, 2.0),
            SensorKind::Accelerometer => (4, 1.0),
            SensorKind::LevelHorizon => (4, 2.0),
        }
    }

    /// `MAV_SYS_STATUS_SENSOR` bit of the sensor behind this calibration, if any.
    pub fn health_bit(&self) -> Option<u32> {
        match self {
            SensorKind::Gyro => Some(0x01),
            SensorKind::Accelerometer | SensorKind::LevelHorizon => Some(0x02),
            SensorKind::Magnetometer => Some(0x04),
            SensorKind::Barometer => Some(0x08),
            SensorKind::RadioTrim => Some(0x1_0000),
        }
    }

    /// Orientations the operator has to cycle through (empty for most kinds).
    pub fn sub_steps(&self) -> SubSteps {
        match self {
            SensorKind::Accelerometer => SubSteps::all(),
            _ => SubSteps::empty(),
        }
    }

    /// Short label for logs and CLI arguments.
    pub fn as_label(&self) -> &'static str {
        match self {
            SensorKind::Gyro => "gyro",
            SensorKind::Accelerometer => "accel",
            SensorKind::Magnetometer => "mag",
            SensorKind::Barometer => "baro",
            SensorKind::LevelHorizon => "level",
            SensorKind::RadioTrim => "radio_trim",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Returned when a string names no calibration kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sensor kind: {0}")]
pub struct UnknownSensorKind(pub String);

impl FromStr for SensorKind {
    type Err = UnknownSensorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gyro" | "gyroscope" => Ok(SensorKind::Gyro),
            "accel" | "accelerometer" => Ok(SensorKind::Accelerometer),
            "mag" | "compass" | "magnetometer" => Ok(SensorKind::Magnetometer),
            "baro" | "barometer" | "pressure" => Ok(SensorKind::Barometer),
            "level" | "horizon" => Ok(SensorKind::LevelHorizon),
            "radio" | "radio_trim" | "trim" => Ok(SensorKind::RadioTrim),
            other => Err(UnknownSensorKind(other.to_string())),
        }
    }
}

/// One physical placement during accelerometer calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Orientation {
    Front,
    Back,
    Left,
    Right,
    Up,
    Down,
}

impl Orientation {
    pub const ALL: [Orientation; 6] = [
        Orientation::Front,
        Orientation::Back,
        Orientation::Left,
        Orientation::Right,
        Orientation::Up,
        Orientation::Down,
    ];

    pub fn as_label(&self) -> &'static str {
        match self {
            Orientation::Front => "front",
            Orientation::Back => "back",
            Orientation::Left => "left",
            Orientation::Right => "right",
            Orientation::Up => "up",
            Orientation::Down => "down",
        }
    }

    /// Parses a lowercase token.
    pub fn from_token(token: &str) -> Option<Self> {
        Orientation::ALL.into_iter().find(|o| o.as_label() == token)
    }

    fn bit(self) -> u8 {
        1 << self as u8
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// A set of [`Orientation`]s.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SubSteps(u8);

impl SubSteps {
    pub const fn empty() -> Self {
        SubSteps(0)
    }

    pub const fn all() -> Self {
        SubSteps(0b11_1111)
    }

    pub fn contains(&self, o: Orientation) -> bool {
        self.0 & o.bit() != 0
    }

    /// Adds `o`; returns `false` if it was already present.
    pub fn insert(&mut self, o: Orientation) -> bool {
        let fresh = !self.contains(o);
        self.0 |= o.bit();
        fresh
    }

    /// Removes `o`; returns `false` if it was absent.
    pub fn remove(&mut self, o: Orientation) -> bool {
        let had = self.contains(o);
        self.0 &= !o.bit();
        had
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn is_disjoint(&self, other: &SubSteps) -> bool {
        self.0 & other.0 == 0
    }

    pub fn union(&self, other: &SubSteps) -> SubSteps {
        SubSteps(self.0 | other.0)
    }

    /// Members in [`Orientation::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = Orientation> + '_ {
        Orientation::ALL.into_iter().filter(|o| self.contains(*o))
    }
}

impl FromIterator<Orientation> for SubSteps {
    fn from_iter<I: IntoIterator<Item = Orientation>>(iter: I) -> Self {
        let mut set = SubSteps::empty();
        for o in iter {
            set.insert(o);
        }
        set
    }
}

impl fmt::Debug for SubSteps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for SubSteps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, o) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(o.as_label())?;
        }
        Ok(())
    }
}
