//! # In-memory transport.
//!
//! [`pair`] returns a [`MockLink`] (handed to the engine) and a [`MockDevice`] (driven by
//! the test, playing the flight controller). [`MockConnector`] hands out scripted links so
//! connection retries can be exercised.
//!
//! ```rust
//! use calvisor::link::mock;
//!
//! let (link, device) = mock::pair(1, 1);
//! device.heartbeat();
//! device.status_text("[cal] progress <10>");
//! # drop(link);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::LinkError;

use super::{
    CommandLong, Connector, Endpoint, Identity, Link, Message, Outgoing, SensorHealthSnapshot,
};

#[derive(Default)]
struct Shared {
    closed: AtomicBool,
    closes: AtomicU32,
}

/// Engine side of an in-memory link.
pub struct MockLink {
    inbound: mpsc::UnboundedReceiver<Result<Message, LinkError>>,
    outbound: mpsc::UnboundedSender<Outgoing>,
    shared: Arc<Shared>,
}

/// Device side of an in-memory link.
pub struct MockDevice {
    system_id: u8,
    component_id: u8,
    inbound: mpsc::UnboundedSender<Result<Message, LinkError>>,
    outbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Outgoing>>,
    shared: Arc<Shared>,
}

/// Creates a connected link/device pair; the device reports `system_id`/`component_id`.
pub fn pair(system_id: u8, component_id: u8) -> (MockLink, MockDevice) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared::default());

    let link = MockLink {
        inbound: in_rx,
        outbound: out_tx,
        shared: Arc::clone(&shared),
    };
    let device = MockDevice {
        system_id,
        component_id,
        inbound: in_tx,
        outbound: tokio::sync::Mutex::new(out_rx),
        shared,
    };
    (link, device)
}

#[async_trait]
impl Link for MockLink {
    async fn recv(&mut self) -> Result<Message, LinkError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(LinkError::Closed);
        }
        match self.inbound.recv().await {
            Some(item) => item,
            None => Err(LinkError::Closed),
        }
    }

    async fn send(&mut self, frame: Outgoing) -> Result<(), LinkError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(LinkError::Closed);
        }
        self.outbound.send(frame).map_err(|_| LinkError::Closed)
    }

    async fn close(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.closes.fetch_add(1, Ordering::SeqCst);
    }
}

impl MockDevice {
    /// Queues an arbitrary message for the engine.
    pub fn push(&self, msg: Message) {
        let _ = self.inbound.send(Ok(msg));
    }

    /// Queues a transport fault; the engine's next receive fails with it.
    pub fn fail(&self, err: LinkError) {
        let _ = self.inbound.send(Err(err));
    }

    /// Queues a heartbeat in `MAV_STATE_STANDBY`.
    pub fn heartbeat(&self) {
        self.push(Message::Heartbeat {
            system_id: self.system_id,
            component_id: self.component_id,
            system_status: 3,
        });
    }

    /// Queues a `COMMAND_ACK`.
    pub fn ack(&self, command: u16, result: u8) {
        self.push(Message::CommandAck { command, result });
    }

    /// Queues a `STATUSTEXT` line.
    pub fn status_text(&self, text: &str) {
        self.push(Message::text(text));
    }

    /// Queues a `SYS_STATUS`.
    pub fn sys_status(&self, snapshot: SensorHealthSnapshot) {
        self.push(Message::SysStatus(snapshot));
    }

    /// Waits for the next frame the engine wrote. `None` once the link is dropped.
    pub async fn next_sent(&self) -> Option<Outgoing> {
        self.outbound.lock().await.recv().await
    }

    /// Waits for the next `COMMAND_LONG`, skipping heartbeats and stream requests.
    pub async fn next_command(&self) -> Option<CommandLong> {
        let mut rx = self.outbound.lock().await;
        while let Some(frame) = rx.recv().await {
            if let Outgoing::Command(cmd) = frame {
                return Some(cmd);
            }
        }
        None
    }

    /// Drains every frame written so far without waiting.
    pub fn sent(&self) -> Vec<Outgoing> {
        let mut out = Vec::new();
        if let Ok(mut rx) = self.outbound.try_lock() {
            while let Ok(frame) = rx.try_recv() {
                out.push(frame);
            }
        }
        out
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// How many times the engine closed the link.
    pub fn close_count(&self) -> u32 {
        self.shared.closes.load(Ordering::SeqCst)
    }
}

enum Script {
    Link(MockLink),
    Failure(LinkError),
}

/// [`Connector`] that hands out scripted outcomes in order.
///
/// Once the script is exhausted every open fails with [`LinkError::Io`].
#[derive(Default)]
pub struct MockConnector {
    script: Mutex<VecDeque<Script>>,
    opened: AtomicU32,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next open returns `link`.
    pub fn push_link(&self, link: MockLink) {
        self.push(Script::Link(link));
    }

    /// The next open fails with `err`.
    pub fn push_failure(&self, err: LinkError) {
        self.push(Script::Failure(err));
    }

    /// Number of open calls so far.
    pub fn opened(&self) -> u32 {
        self.opened.load(Ordering::SeqCst)
    }

    fn push(&self, item: Script) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(item);
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(
        &self,
        endpoint: &Endpoint,
        _identity: Identity,
    ) -> Result<Box<dyn Link>, LinkError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(Script::Link(link)) => Ok(Box::new(link)),
            Some(Script::Failure(err)) => Err(err),
            None => Err(LinkError::io(format!("no device at {endpoint}"))),
        }
    }
}
