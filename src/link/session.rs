//! # Link session: heartbeat tracking and bounded receives over a [`Link`].
//!
//! [`LinkSession::connect`] opens a transport and requires a device heartbeat before the
//! link counts as usable. Every attempt runs through [`Retry`], so "open succeeded but
//! the device is silent" is retried exactly like "open failed".
//!
//! ## Rules
//! - `receive(timeout, filter)` never waits longer than `timeout`; a timeout is `Ok(None)`.
//! - Every inbound device heartbeat refreshes liveness and the target addressing.
//! - Heartbeats carrying our own system id (echoes from routers) are dropped.
//! - `close()` releases the transport exactly once.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ConnectionError, LinkError};
use crate::policies::{AttemptError, BackoffPolicy, Retry, RetryError};

use super::{
    CommandLong, Connector, Endpoint, Identity, Link, Message, MessageKind, Outgoing,
    SensorHealthSnapshot,
};

/// Parameters for [`LinkSession::connect`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectOptions {
    /// Our own addressing.
    pub identity: Identity,
    /// Number of connection attempts.
    pub retries: u32,
    /// Delay between attempts.
    pub backoff: BackoffPolicy,
    /// How long each attempt waits for the first device heartbeat.
    pub heartbeat_timeout: Duration,
    /// Maximum heartbeat age for [`LinkSession::is_alive`].
    pub liveness_window: Duration,
}

impl ConnectOptions {
    /// `retries` attempts, `retry_delay` apart, identifying as `system_id`/`component_id`.
    pub fn new(system_id: u8, component_id: u8, retries: u32, retry_delay: Duration) -> Self {
        Self {
            identity: Identity {
                system_id,
                component_id,
            },
            retries,
            backoff: BackoffPolicy::constant(retry_delay),
            ..Self::default()
        }
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            identity: Identity::default(),
            retries: 3,
            backoff: BackoffPolicy::constant(Duration::from_secs(5)),
            heartbeat_timeout: Duration::from_secs(10),
            liveness_window: Duration::from_secs(3),
        }
    }
}

/// Exclusive owner of one connection to a device.
pub struct LinkSession {
    link: Box<dyn Link>,
    endpoint: Endpoint,
    identity: Identity,
    target_system: u8,
    target_component: u8,
    last_heartbeat: Option<Instant>,
    liveness_window: Duration,
    closed: bool,
}

impl LinkSession {
    /// Wraps an already opened link. No heartbeat has been observed yet.
    pub fn attach(
        link: Box<dyn Link>,
        endpoint: Endpoint,
        identity: Identity,
        liveness_window: Duration,
    ) -> Self {
        Self {
            link,
            endpoint,
            identity,
            target_system: 0,
            target_component: 0,
            last_heartbeat: None,
            liveness_window,
            closed: false,
        }
    }

    /// Opens `endpoint` and waits for a device heartbeat, retrying per `opts`.
    ///
    /// # Errors
    /// - [`ConnectionError::Exhausted`] when no attempt produced a live link.
    /// - [`ConnectionError::Cancelled`] when `cancel` fired first.
    pub async fn connect(
        connector: &dyn Connector,
        endpoint: &Endpoint,
        opts: &ConnectOptions,
        cancel: &CancellationToken,
    ) -> Result<Self, ConnectionError> {
        let retry = Retry::new(opts.retries, opts.backoff);

        let res = retry
            .run(cancel, |attempt| async move {
                info!(endpoint = %endpoint, attempt, "opening link");
                let link = connector
                    .open(endpoint, opts.identity)
                    .await
                    .map_err(|e| e.to_string())?;

                let mut session =
                    LinkSession::attach(link, endpoint.clone(), opts.identity, opts.liveness_window);
                match session.wait_heartbeat(opts.heartbeat_timeout).await {
                    Ok(Some((system_id, component_id))) => {
                        info!(endpoint = %endpoint, system_id, component_id, "device heartbeat received");
                        Ok(session)
                    }
                    Ok(None) => {
                        session.close().await;
                        Err(format!("no heartbeat within {:?}", opts.heartbeat_timeout))
                    }
                    Err(e) => {
                        session.close().await;
                        Err(e.to_string())
                    }
                }
            })
            .await;

        match res {
            Ok(session) => Ok(session),
            Err(RetryError::Cancelled) => Err(ConnectionError::Cancelled),
            Err(RetryError::Exhausted { attempts, last }) => {
                let last = match last {
                    AttemptError::Failed(reason) => reason,
                    AttemptError::TimedOut(d) => format!("attempt timed out after {d:?}"),
                };
                warn!(endpoint = %endpoint, attempts, error = %last, "device unreachable");
                Err(ConnectionError::Exhausted { attempts, last })
            }
        }
    }

    /// Receives the next message of kind `filter` (any kind if `None`) within `timeout`.
    ///
    /// Returns `Ok(None)` on timeout. Cancel-safe: a message is either returned or still
    /// queued in the transport.
    pub async fn receive(
        &mut self,
        timeout: Duration,
        filter: Option<MessageKind>,
    ) -> Result<Option<Message>, LinkError> {
        self.receive_until(Instant::now() + timeout, filter).await
    }

    /// Like [`receive`](Self::receive) with an absolute deadline.
    pub async fn receive_until(
        &mut self,
        deadline: Instant,
        filter: Option<MessageKind>,
    ) -> Result<Option<Message>, LinkError> {
        loop {
            if self.closed {
                return Err(LinkError::Closed);
            }
            let msg = match time::timeout_at(deadline, self.link.recv()).await {
                Ok(res) => res?,
                Err(_elapsed) => return Ok(None),
            };
            if !self.observe(&msg) {
                continue;
            }
            if filter.is_none_or(|kind| msg.kind() == kind) {
                return Ok(Some(msg));
            }
        }
    }

    /// Waits for a device heartbeat and returns its `(system_id, component_id)`.
    pub async fn wait_heartbeat(&mut self, timeout: Duration) -> Result<Option<(u8, u8)>, LinkError> {
        match self.receive(timeout, Some(MessageKind::Heartbeat)).await? {
            Some(Message::Heartbeat {
                system_id,
                component_id,
                ..
            }) => Ok(Some((system_id, component_id))),
            _ => Ok(None),
        }
    }

    /// Returns the next `SYS_STATUS` within `timeout`.
    pub async fn sample_health(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<SensorHealthSnapshot>, LinkError> {
        match self.receive(timeout, Some(MessageKind::SysStatus)).await? {
            Some(Message::SysStatus(snapshot)) => Ok(Some(snapshot)),
            _ => Ok(None),
        }
    }

    /// Writes one frame.
    pub async fn send(&mut self, frame: Outgoing) -> Result<(), LinkError> {
        if self.closed {
            return Err(LinkError::Closed);
        }
        self.link.send(frame).await
    }

    /// Writes a `COMMAND_LONG`.
    pub async fn send_command(&mut self, command: CommandLong) -> Result<(), LinkError> {
        debug!(
            command = command.command,
            confirmation = command.confirmation,
            target_system = command.target_system,
            "sending command"
        );
        self.send(Outgoing::Command(command)).await
    }

    /// Writes our ground-station heartbeat.
    pub async fn send_heartbeat(&mut self) -> Result<(), LinkError> {
        self.send(Outgoing::Heartbeat).await
    }

    /// Asks the device to stream all telemetry at `rate_hz`.
    pub async fn request_data_streams(&mut self, rate_hz: u16) -> Result<(), LinkError> {
        self.send(Outgoing::RequestDataStreams {
            target_system: self.target_system,
            target_component: self.target_component,
            rate_hz,
        })
        .await
    }

    /// Releases the transport. Later calls do nothing.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.link.close().await;
        debug!(endpoint = %self.endpoint, "link closed");
    }

    /// True when the last device heartbeat is younger than the liveness window.
    pub fn is_alive(&self, now: Instant) -> bool {
        !self.closed
            && self
                .last_heartbeat
                .is_some_and(|at| now.saturating_duration_since(at) <= self.liveness_window)
    }

    /// Device addressing learned from the latest heartbeat (`0, 0` before the first one).
    pub fn target(&self) -> (u8, u8) {
        (self.target_system, self.target_component)
    }

    /// Time of the latest device heartbeat.
    pub fn last_heartbeat(&self) -> Option<Instant> {
        self.last_heartbeat
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Updates liveness bookkeeping. Returns `false` for messages to drop.
    fn observe(&mut self, msg: &Message) -> bool {
        if let Message::Heartbeat {
            system_id,
            component_id,
            ..
        } = *msg
        {
            if system_id == self.identity.system_id {
                return false;
            }
            self.last_heartbeat = Some(Instant::now());
            self.target_system = system_id;
            self.target_component = component_id;
        }
        true
    }
}

/// Shared handle to a connected device.
///
/// Cloning is cheap. Sessions lock it for their whole lifetime, which serializes them
/// against the physical connection. [`close`](Self::close) is observed by a running
/// session immediately, even while it holds the lock.
#[derive(Clone)]
pub struct DeviceLink {
    inner: Arc<Mutex<LinkSession>>,
    closed: CancellationToken,
    endpoint: Endpoint,
}

impl DeviceLink {
    pub fn new(session: LinkSession) -> Self {
        let endpoint = session.endpoint().clone();
        Self {
            inner: Arc::new(Mutex::new(session)),
            closed: CancellationToken::new(),
            endpoint,
        }
    }

    /// Waits for exclusive access to the session.
    pub async fn lock(&self) -> OwnedMutexGuard<LinkSession> {
        Arc::clone(&self.inner).lock_owned().await
    }

    /// Signals closure to the current holder, then releases the transport.
    pub async fn close(&self) {
        self.closed.cancel();
        self.inner.lock().await.close().await;
    }

    /// Resolves once [`close`](Self::close) was called.
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl std::fmt::Debug for DeviceLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLink")
            .field("endpoint", &self.endpoint)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::mock::{self, MockConnector};

    fn opts() -> ConnectOptions {
        ConnectOptions::new(255, 190, 3, Duration::from_secs(5))
    }

    #[tokio::test(start_paused = true)]
    async fn receive_times_out_with_none() {
        let (link, _device) = mock::pair(1, 1);
        let mut session =
            LinkSession::attach(Box::new(link), Endpoint::new("mock"), Identity::default(), Duration::from_secs(3));

        let started = Instant::now();
        let got = session.receive(Duration::from_secs(2), None).await;
        assert_eq!(got, Ok(None));
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn filter_skips_other_kinds_but_tracks_heartbeats() {
        let (link, device) = mock::pair(7, 1);
        let mut session =
            LinkSession::attach(Box::new(link), Endpoint::new("mock"), Identity::default(), Duration::from_secs(3));

        device.heartbeat();
        device.status_text("noise");
        device.ack(241, 0);
        let got = session
            .receive(Duration::from_secs(1), Some(MessageKind::CommandAck))
            .await;

        assert_eq!(got, Ok(Some(Message::CommandAck { command: 241, result: 0 })));
        assert_eq!(session.target(), (7, 1));
        assert!(session.is_alive(Instant::now()));
        time::advance(Duration::from_secs(4)).await;
        assert!(!session.is_alive(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn own_heartbeat_echo_is_dropped() {
        let (link, device) = mock::pair(7, 1);
        let mut session =
            LinkSession::attach(Box::new(link), Endpoint::new("mock"), Identity::default(), Duration::from_secs(3));

        device.push(Message::Heartbeat {
            system_id: 255,
            component_id: 190,
            system_status: 4,
        });
        assert_eq!(session.wait_heartbeat(Duration::from_secs(1)).await, Ok(None));
        assert_eq!(session.target(), (0, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn connect_retries_silent_devices() {
        let connector = MockConnector::new();
        let (silent, silent_dev) = mock::pair(1, 1);
        let (alive, alive_dev) = mock::pair(1, 1);
        connector.push_failure(LinkError::io("port busy"));
        connector.push_link(silent);
        connector.push_link(alive);
        alive_dev.heartbeat();

        let started = Instant::now();
        let session = LinkSession::connect(
            &connector,
            &Endpoint::new("mock"),
            &opts(),
            &CancellationToken::new(),
        )
        .await
        .expect("third attempt is live");

        assert_eq!(session.target(), (1, 1));
        assert_eq!(connector.opened(), 3);
        // two retry delays plus one silent heartbeat wait
        assert_eq!(started.elapsed(), Duration::from_secs(5 + 10 + 5));
        assert!(silent_dev.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn connect_reports_exhaustion() {
        let connector = MockConnector::new();
        let err = LinkSession::connect(
            &connector,
            &Endpoint::new("mock"),
            &ConnectOptions::new(255, 190, 2, Duration::from_secs(1)),
            &CancellationToken::new(),
        )
        .await
        .err();

        assert!(matches!(err, Some(ConnectionError::Exhausted { attempts: 2, .. })));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (link, device) = mock::pair(1, 1);
        let mut session =
            LinkSession::attach(Box::new(link), Endpoint::new("mock"), Identity::default(), Duration::from_secs(3));
        session.close().await;
        session.close().await;
        assert!(device.is_closed());
        assert_eq!(device.close_count(), 1);
        assert_eq!(session.send_heartbeat().await, Err(LinkError::Closed));
    }
}
