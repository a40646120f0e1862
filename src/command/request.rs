use crate::link::CommandLong;

use super::SensorKind;

/// `MAV_CMD_PREFLIGHT_CALIBRATION`.
pub const MAV_CMD_PREFLIGHT_CALIBRATION: u16 = 241;

/// `MAV_RESULT_ACCEPTED`; every other result code is a refusal of some sort.
pub const MAV_RESULT_ACCEPTED: u8 = 0;

/// One calibration request.
///
/// Holds a single [`SensorKind`], so a request with several non-zero slots cannot be
/// built. The confirmation counter starts at 0 and only grows through
/// [`resend`](Self::resend).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationRequest {
    kind: SensorKind,
    confirmation: u8,
}

impl CalibrationRequest {
    pub fn new(kind: SensorKind) -> Self {
        Self {
            kind,
            confirmation: 0,
        }
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn confirmation(&self) -> u8 {
        self.confirmation
    }

    pub fn command_id(&self) -> u16 {
        MAV_CMD_PREFLIGHT_CALIBRATION
    }

    /// The seven parameter slots, exactly one of them non-zero.
    pub fn params(&self) -> [f32; 7] {
        let mut params = [0.0; 7];
        let (slot, value) = self.kind.slot();
        params[slot] = value;
        params
    }

    /// The same request with the confirmation counter incremented.
    pub fn resend(&self) -> Self {
        Self {
            kind: self.kind,
            confirmation: self.confirmation.saturating_add(1),
        }
    }

    /// Addresses the request to a device.
    pub fn to_command(&self, target_system: u8, target_component: u8) -> CommandLong {
        CommandLong {
            target_system,
            target_component,
            command: self.command_id(),
            confirmation: self.confirmation,
            params: self.params(),
        }
    }
}
