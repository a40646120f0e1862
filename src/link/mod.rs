//! # Link layer: the connection to one device.
//!
//! A [`Link`] is a raw transport that already speaks decoded [`Message`]s; a [`Connector`]
//! opens one for an [`Endpoint`]. [`LinkSession`] wraps a link with heartbeat tracking and
//! bounded receives, and [`DeviceLink`] is the shareable handle the supervisor passes to
//! sessions (one session at a time holds it).
//!
//! ```text
//! Connector::open ──► Box<dyn Link> ──► LinkSession ──► DeviceLink (Arc<Mutex<..>>)
//!                                         │   ▲
//!                     receive(timeout) ◄──┘   └── send(Outgoing)
//! ```
//!
//! Transports:
//! - [`mock`]: in-memory pair for tests and demos.
//! - `mavlink` (feature `mavlink`): serial/UDP/TCP through the `mavlink` crate.

mod message;
mod session;

pub mod mock;

#[cfg(feature = "mavlink")]
mod mavlink;

use std::fmt;

use async_trait::async_trait;

use crate::error::LinkError;

pub use message::{
    CommandLong, MAV_STATE_CALIBRATING, Message, MessageKind, Outgoing, SensorHealthSnapshot,
};
pub use session::{ConnectOptions, DeviceLink, LinkSession};

#[cfg(feature = "mavlink")]
pub use self::mavlink::MavlinkConnector;

/// A decoded, bidirectional message transport.
///
/// # Contract
/// - [`recv`](Link::recv) must be **cancel-safe**: dropping the future before it resolves
///   must not lose a message. Callers race it against deadlines.
/// - After [`close`](Link::close), `recv` and `send` return [`LinkError::Closed`].
#[async_trait]
pub trait Link: Send + 'static {
    /// Waits for the next inbound message.
    async fn recv(&mut self) -> Result<Message, LinkError>;

    /// Writes one outbound frame.
    async fn send(&mut self, frame: Outgoing) -> Result<(), LinkError>;

    /// Releases the underlying connection.
    async fn close(&mut self);
}

/// Opens transports.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Opens a link to `endpoint`, identifying ourselves as `identity`.
    ///
    /// Success only means the transport is open; liveness is checked by the caller.
    async fn open(&self, endpoint: &Endpoint, identity: Identity)
    -> Result<Box<dyn Link>, LinkError>;
}

/// Our own MAVLink addressing as a ground station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub system_id: u8,
    pub component_id: u8,
}

impl Default for Identity {
    /// System 255, component 190 (`MAV_COMP_ID_MISSIONPLANNER`).
    fn default() -> Self {
        Self {
            system_id: 255,
            component_id: 190,
        }
    }
}

/// Where a device lives.
///
/// `address` is either a full connection string (`serial:/dev/ttyACM0:57600`,
/// `udpin:0.0.0.0:14551`, `tcpout:127.0.0.1:5760`) or a bare device path, in which case
/// `baud` completes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub address: String,
    pub baud: u32,
}

const SCHEMES: [&str; 6] = ["serial:", "udpin:", "udpout:", "udpbcast:", "tcpin:", "tcpout:"];

impl Endpoint {
    /// An endpoint given by a full connection string.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            baud: 0,
        }
    }

    /// A serial device at `baud`.
    pub fn serial(path: impl Into<String>, baud: u32) -> Self {
        Self {
            address: path.into(),
            baud,
        }
    }

    /// Returns the connection string understood by the transport.
    ///
    /// ```
    /// use calvisor::Endpoint;
    ///
    /// assert_eq!(Endpoint::serial("/dev/ttyACM0", 115200).connection_string(), "serial:/dev/ttyACM0:115200");
    /// assert_eq!(Endpoint::new("udpin:0.0.0.0:14551").connection_string(), "udpin:0.0.0.0:14551");
    /// ```
    pub fn connection_string(&self) -> String {
        if SCHEMES.iter().any(|s| self.address.starts_with(s)) {
            return self.address.clone();
        }
        let baud = if self.baud == 0 { 57600 } else { self.baud };
        format!("serial:{}:{}", self.address, baud)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.connection_string())
    }
}
