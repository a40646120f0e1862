//! # MAVLink transport over the `mavlink` crate (`common` dialect).
//!
//! The crate's connections are blocking, so each link owns a reader thread that decodes
//! frames and forwards them through a bounded channel. Receiving from that channel is
//! cancel-safe. Writes go straight through the shared connection on the blocking pool.
//!
//! ```text
//! serial/udp/tcp ──► reader thread ──(mpsc, 256)──► MavlinkLink::recv
//!                ◄── spawn_blocking(send) ◄──────── MavlinkLink::send
//! ```

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use async_trait::async_trait;
use mavlink::common::{
    COMMAND_LONG_DATA, HEARTBEAT_DATA, MavAutopilot, MavCmd, MavMessage, MavModeFlag, MavState,
    MavType, REQUEST_DATA_STREAM_DATA,
};
use mavlink::error::MessageReadError;
use mavlink::{MavConnection, MavHeader, Message as _};
use num_traits::FromPrimitive;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::LinkError;

use super::{Connector, Endpoint, Identity, Link, Message, Outgoing, SensorHealthSnapshot};

type Connection = Arc<Box<dyn MavConnection<MavMessage> + Send + Sync>>;

const READ_QUEUE: usize = 256;

/// [`Connector`] for real flight controllers.
///
/// ```no_run
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// use calvisor::{Config, Endpoint, MavlinkConnector, Supervisor};
///
/// let sup = Supervisor::builder(Config::default(), MavlinkConnector).build();
/// let device = sup.connect(&Endpoint::serial("/dev/ttyACM0", 115200)).await?;
/// # drop(device);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MavlinkConnector;

#[async_trait]
impl Connector for MavlinkConnector {
    async fn open(&self, endpoint: &Endpoint, identity: Identity) -> Result<Box<dyn Link>, LinkError> {
        let address = endpoint.connection_string();
        let conn = tokio::task::spawn_blocking(move || mavlink::connect::<MavMessage>(&address))
            .await
            .map_err(|e| LinkError::io(e.to_string()))?
            .map_err(|e| LinkError::io(e.to_string()))?;
        let conn: Connection = Arc::new(conn);

        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel(READ_QUEUE);
        spawn_reader(Arc::clone(&conn), tx, Arc::clone(&stop));
        debug!(endpoint = %endpoint, "mavlink connection opened");

        Ok(Box::new(MavlinkLink {
            conn,
            rx,
            stop,
            identity,
            sequence: Arc::new(AtomicU8::new(0)),
            closed: false,
        }))
    }
}

struct MavlinkLink {
    conn: Connection,
    rx: mpsc::Receiver<Result<Message, LinkError>>,
    stop: Arc<AtomicBool>,
    identity: Identity,
    sequence: Arc<AtomicU8>,
    closed: bool,
}

#[async_trait]
impl Link for MavlinkLink {
    async fn recv(&mut self) -> Result<Message, LinkError> {
        if self.closed {
            return Err(LinkError::Closed);
        }
        match self.rx.recv().await {
            Some(item) => item,
            None => Err(LinkError::Closed),
        }
    }

    async fn send(&mut self, frame: Outgoing) -> Result<(), LinkError> {
        if self.closed {
            return Err(LinkError::Closed);
        }
        let msg = encode(frame)?;
        let header = MavHeader {
            system_id: self.identity.system_id,
            component_id: self.identity.component_id,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || conn.send(&header, &msg))
            .await
            .map_err(|e| LinkError::io(e.to_string()))?
            .map(|_| ())
            .map_err(|e| LinkError::io(e.to_string()))
    }

    async fn close(&mut self) {
        self.closed = true;
        self.stop.store(true, Ordering::SeqCst);
        self.rx.close();
    }
}

/// The reader exits on the first frame after `stop`, or when the connection fails.
fn spawn_reader(
    conn: Connection,
    tx: mpsc::Sender<Result<Message, LinkError>>,
    stop: Arc<AtomicBool>,
) {
    std::thread::spawn(move || {
        while !stop.load(Ordering::SeqCst) {
            let item = match conn.recv() {
                Ok((header, msg)) => Ok(decode(&header, &msg)),
                Err(MessageReadError::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(MessageReadError::Io(e)) => Err(LinkError::io(e.to_string())),
                Err(MessageReadError::Parse(e)) => {
                    debug!(error = %e, "dropping undecodable frame");
                    continue;
                }
            };
            let fatal = item.is_err();
            if tx.blocking_send(item).is_err() || fatal {
                break;
            }
        }
    });
}

fn decode(header: &MavHeader, msg: &MavMessage) -> Message {
    match msg {
        MavMessage::HEARTBEAT(data) => Message::Heartbeat {
            system_id: header.system_id,
            component_id: header.component_id,
            system_status: data.system_status as u8,
        },
        MavMessage::COMMAND_ACK(data) => Message::CommandAck {
            command: data.command as u16,
            result: data.result as u8,
        },
        MavMessage::STATUSTEXT(data) => {
            let raw: &[u8] = &data.text;
            let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            Message::StatusText {
                severity: data.severity as u8,
                text: String::from_utf8_lossy(&raw[..end]).trim().to_string(),
            }
        }
        MavMessage::SYS_STATUS(data) => Message::SysStatus(SensorHealthSnapshot {
            present: data.onboard_control_sensors_present.bits(),
            enabled: data.onboard_control_sensors_enabled.bits(),
            healthy: data.onboard_control_sensors_health.bits(),
        }),
        other => Message::Other {
            id: other.message_id(),
        },
    }
}

fn encode(frame: Outgoing) -> Result<MavMessage, LinkError> {
    let msg = match frame {
        Outgoing::Command(cmd) => {
            let command = MavCmd::from_u16(cmd.command).ok_or_else(|| LinkError::Unsupported {
                what: format!("MAV_CMD {}", cmd.command),
            })?;
            let [param1, param2, param3, param4, param5, param6, param7] = cmd.params;
            MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
                param1,
                param2,
                param3,
                param4,
                param5,
                param6,
                param7,
                command,
                target_system: cmd.target_system,
                target_component: cmd.target_component,
                confirmation: cmd.confirmation,
            })
        }
        Outgoing::Heartbeat => MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: MavType::MAV_TYPE_GCS,
            autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
            base_mode: MavModeFlag::empty(),
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        }),
        Outgoing::RequestDataStreams {
            target_system,
            target_component,
            rate_hz,
        } => MavMessage::REQUEST_DATA_STREAM(REQUEST_DATA_STREAM_DATA {
            req_message_rate: rate_hz,
            target_system,
            target_component,
            req_stream_id: 0,
            start_stop: 1,
        }),
    };
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mavlink::common::{COMMAND_ACK_DATA, MavResult};

    #[test]
    fn ack_codes_pass_through() {
        let msg = MavMessage::COMMAND_ACK(COMMAND_ACK_DATA {
            command: MavCmd::MAV_CMD_PREFLIGHT_CALIBRATION,
            result: MavResult::MAV_RESULT_TEMPORARILY_REJECTED,
        });
        assert_eq!(
            decode(&MavHeader::default(), &msg),
            Message::CommandAck {
                command: 241,
                result: 1
            }
        );
    }

    #[test]
    fn unknown_command_ids_are_rejected() {
        let frame = Outgoing::Command(crate::link::CommandLong {
            target_system: 1,
            target_component: 1,
            command: 65000,
            confirmation: 0,
            params: [0.0; 7],
        });
        assert!(matches!(encode(frame), Err(LinkError::Unsupported { .. })));
    }
}
