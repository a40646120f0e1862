//! Inbound and outbound records exchanged with the device.
//!
//! The transport decodes wire frames into [`Message`] and encodes [`Outgoing`]; nothing
//! outside a [`Link`](crate::Link) implementation sees the wire format.

use std::fmt;

/// `MAV_STATE_CALIBRATING`, reported in heartbeats while the autopilot calibrates.
pub const MAV_STATE_CALIBRATING: u8 = 2;

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Liveness beacon carrying the sender's addressing.
    Heartbeat {
        /// Sender system id.
        system_id: u8,
        /// Sender component id.
        component_id: u8,
        /// `MAV_STATE` of the sender.
        system_status: u8,
    },
    /// Reply to a command, correlated by command id.
    CommandAck {
        /// Command being acknowledged.
        command: u16,
        /// `MAV_RESULT` code (0 = accepted).
        result: u8,
    },
    /// Free-text diagnostic line.
    StatusText {
        /// `MAV_SEVERITY` (0 = emergency .. 7 = debug).
        severity: u8,
        /// Decoded text, trailing NULs removed.
        text: String,
    },
    /// Sensor presence/enable/health bitfields.
    SysStatus(SensorHealthSnapshot),
    /// Anything the calibration engine does not consume.
    Other {
        /// Wire message id.
        id: u32,
    },
}

/// Discriminant of [`Message`], used as a receive filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Heartbeat,
    CommandAck,
    StatusText,
    SysStatus,
    Other,
}

impl Message {
    /// Returns the discriminant of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Heartbeat { .. } => MessageKind::Heartbeat,
            Message::CommandAck { .. } => MessageKind::CommandAck,
            Message::StatusText { .. } => MessageKind::StatusText,
            Message::SysStatus(_) => MessageKind::SysStatus,
            Message::Other { .. } => MessageKind::Other,
        }
    }

    /// Convenience constructor for a status line with `INFO` severity.
    pub fn text(text: impl Into<String>) -> Self {
        Message::StatusText {
            severity: 6,
            text: text.into(),
        }
    }
}

/// A `COMMAND_LONG` request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandLong {
    pub target_system: u8,
    pub target_component: u8,
    /// `MAV_CMD` id.
    pub command: u16,
    /// 0 for the first transmission, incremented on every resend.
    pub confirmation: u8,
    pub params: [f32; 7],
}

/// An outbound frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outgoing {
    /// A command for the device.
    Command(CommandLong),
    /// Our own ground-station heartbeat.
    Heartbeat,
    /// Ask the device to stream all telemetry at `rate_hz`.
    RequestDataStreams {
        target_system: u8,
        target_component: u8,
        rate_hz: u16,
    },
}

/// Sensor bitfields sampled from `SYS_STATUS`.
///
/// Bits follow `MAV_SYS_STATUS_SENSOR`. The snapshot is read-only and fetched fresh each
/// time; it validates an outcome independently of status-text parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorHealthSnapshot {
    pub present: u32,
    pub enabled: u32,
    pub healthy: u32,
}

impl SensorHealthSnapshot {
    /// Returns `true` if every bit of `mask` is reported present.
    pub fn is_present(&self, mask: u32) -> bool {
        mask != 0 && self.present & mask == mask
    }

    /// Health of the sensors in `mask`.
    ///
    /// `None` when they are not present or not enabled, so health is meaningless.
    pub fn is_healthy(&self, mask: u32) -> Option<bool> {
        if !self.is_present(mask) || self.enabled & mask != mask {
            return None;
        }
        Some(self.healthy & mask == mask)
    }

    /// Returns `true` if every enabled sensor reports healthy.
    pub fn all_enabled_healthy(&self) -> bool {
        self.healthy & self.enabled == self.enabled
    }
}

impl fmt::Display for SensorHealthSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "present={:#010x} enabled={:#010x} healthy={:#010x}",
            self.present, self.enabled, self.healthy
        )
    }
}
