//! # Supervisor: connections, sessions, batches and fan-out delivery.
//!
//! The [`Supervisor`] owns the event bus, a [`SubscriberSet`], the runtime cancellation
//! token and the global configuration. It opens device links, spawns one session runner
//! per calibration and sequences batches.
//!
//! ## Key responsibilities
//! - subscribe to the [`Bus`] and **fan-out** events via [`SubscriberSet`]
//! - open [`DeviceLink`]s with connection retries
//! - spawn sessions, each with a child of the runtime token
//! - run batches: one session at a time, inter-session cooldown, [`BatchMode`](crate::BatchMode), one
//!   batch per device at a time, per-device batch cooldown
//! - optionally cancel everything on an OS termination signal
//!
//! ## High-level architecture
//! ```text
//! connect(endpoint)
//!   └─► LinkSession::connect (Retry: connect_retries × connect_backoff)
//!         └─► request_data_streams (stream_rate_hz > 0) ─► DeviceLink
//!
//! start_session(kind, &DeviceLink)
//!   └─► child token = runtime_token.child_token()
//!       spawn(SessionRunner::run) ─► SessionHandle
//!
//! start_batch(endpoint, plan)
//!   ├─ claim endpoint ─► BatchError::Busy | BatchError::CoolingDown
//!   ├─ connect                           (failure releases the claim untouched)
//!   ├─ for kind in plan.kinds:
//!   │     sleep(inter_session_cooldown)   (cancellable, not before the first)
//!   │     Retry(session_attempts) { start_session(kind).wait() }
//!   │     plan.mode.should_abort(state)? ─► stop
//!   └─ close link ─► cooldown starts ─► BatchReport
//!
//! Event flow:
//!   SessionRunner ── publish(Event) ──► Bus ──► fan-out listener ──► SubscriberSet::emit
//!                                         └──► Supervisor::events() receivers
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::SensorKind;
use crate::core::batch::{BatchPlan, BatchReport};
use crate::core::{Config, shutdown};
use crate::error::{BatchError, ConnectionError};
use crate::events::{Bus, Event};
use crate::link::{Connector, DeviceLink, Endpoint, LinkSession};
use crate::policies::{AttemptError, BackoffPolicy, Retry, RetryError};
use crate::session::{SessionHandle, SessionId, SessionReport, SessionRunner, SessionState};
use crate::subscribers::{SessionTracker, Subscribe, SubscriberSet, SubscriptionHandle};

use super::builder::SupervisorBuilder;

type Registry = Arc<Mutex<HashMap<SessionId, CancellationToken>>>;
type Batches = Mutex<HashMap<Endpoint, BatchSlot>>;

/// Batch bookkeeping for one endpoint.
#[derive(Debug, Clone, Copy)]
enum BatchSlot {
    Running,
    Finished(Instant),
}

/// Coordinates device links, calibration sessions, batches and event delivery.
pub struct Supervisor {
    cfg: Arc<Config>,
    connector: Arc<dyn Connector>,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    tracker: Arc<SessionTracker>,
    runtime_token: CancellationToken,
    sessions: Registry,
    batches: Batches,
}

impl Supervisor {
    /// Starts building a supervisor that opens links with `connector`.
    pub fn builder<C: Connector>(cfg: Config, connector: C) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg, connector)
    }

    pub(crate) fn new_internal(
        cfg: Config,
        connector: Arc<dyn Connector>,
        bus: Bus,
        subs: Arc<SubscriberSet>,
        tracker: Arc<SessionTracker>,
    ) -> Self {
        Self {
            cfg: Arc::new(cfg),
            connector,
            bus,
            subs,
            tracker,
            runtime_token: CancellationToken::new(),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            batches: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Opens `endpoint` and waits for the device heartbeat, retrying per configuration.
    ///
    /// # Errors
    /// [`ConnectionError`] when no attempt produced a live link or the supervisor was
    /// cancelled.
    pub async fn connect(&self, endpoint: &Endpoint) -> Result<DeviceLink, ConnectionError> {
        let mut session = LinkSession::connect(
            self.connector.as_ref(),
            endpoint,
            &self.cfg.connect_options(),
            &self.runtime_token,
        )
        .await?;

        if let Some(rate) = self.cfg.stream_rate() {
            if let Err(e) = session.request_data_streams(rate).await {
                warn!(endpoint = %endpoint, error = %e, "data stream request failed");
            }
        }
        Ok(DeviceLink::new(session))
    }

    /// Spawns a calibration session for `kind` on `device`.
    ///
    /// Sessions on the same device run one after another: a second session waits in
    /// `Connecting` until the first one releases the link.
    pub fn start_session(&self, kind: SensorKind, device: &DeviceLink) -> SessionHandle {
        self.spawn_session(kind, device, false)
    }

    /// Requests cancellation of a session. Equivalent to [`SessionHandle::cancel`].
    pub fn cancel(&self, handle: &SessionHandle) {
        handle.cancel();
    }

    /// Cancels a running session by id. Returns `false` if it is not running.
    pub fn cancel_session(&self, id: SessionId) -> bool {
        match lock(&self.sessions).get(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels every running session and batch. The supervisor stays cancelled: later
    /// sessions fail with `"cancelled"` immediately.
    pub fn cancel_all(&self) {
        info!("cancelling all sessions");
        self.runtime_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.runtime_token.is_cancelled()
    }

    /// Cancels everything when the process receives a termination signal.
    pub fn cancel_on_shutdown_signal(&self) -> JoinHandle<()> {
        let token = self.runtime_token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                res = shutdown::wait_for_shutdown_signal() => match res {
                    Ok(signal) => {
                        warn!(%signal, "termination signal received, cancelling sessions");
                        token.cancel();
                    }
                    Err(e) => warn!(error = %e, "signal handlers unavailable"),
                },
            }
        })
    }

    /// Registers an event sink.
    pub fn subscribe(&self, sink: Arc<dyn Subscribe>) -> SubscriptionHandle {
        self.subs.add(sink)
    }

    /// Unregisters an event sink. Returns `false` if it was already removed.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.subs.remove(handle)
    }

    /// A raw receiver of every event published from now on.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Sessions that have not published a terminal event yet, as seen by the tracker.
    pub async fn active_sessions(&self) -> Vec<(SessionId, SensorKind)> {
        self.tracker.active().await
    }

    /// Ids of session tasks that are still running.
    pub fn running_sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = lock(&self.sessions).keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Calibration kinds whose sensor the device reports as present.
    ///
    /// Waits for the link (a running session holds it). When no `SYS_STATUS` arrives
    /// within `health_sample_timeout`, every kind is returned.
    pub async fn available_kinds(&self, device: &DeviceLink) -> Vec<SensorKind> {
        let snapshot = {
            let mut link = device.lock().await;
            match link.sample_health(self.cfg.health_sample_timeout).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    debug!(endpoint = %device.endpoint(), error = %e, "health sample failed");
                    None
                }
            }
        };

        SensorKind::ALL
            .into_iter()
            .filter(|kind| match (snapshot, kind.health_bit()) {
                (Some(s), Some(bit)) => s.is_present(bit),
                _ => true,
            })
            .collect()
    }

    /// Connects to `endpoint`, runs `plan`, and closes the link.
    ///
    /// At most one batch runs per endpoint. The cooldown counts from the moment the
    /// previous batch against `endpoint` finished.
    ///
    /// # Errors
    /// - [`BatchError::Busy`] if another batch against `endpoint` is still running.
    /// - [`BatchError::CoolingDown`] if a batch against `endpoint` finished less than
    ///   `batch_cooldown` ago.
    /// - [`BatchError::Connection`] if the device could not be reached.
    /// - [`BatchError::Cancelled`] if the supervisor was cancelled before the first session.
    pub async fn start_batch(
        &self,
        endpoint: &Endpoint,
        plan: BatchPlan,
    ) -> Result<BatchReport, BatchError> {
        if self.runtime_token.is_cancelled() {
            return Err(BatchError::Cancelled);
        }
        let mut claim = self.claim(endpoint)?;

        let device = self.connect(endpoint).await.map_err(|e| match e {
            ConnectionError::Cancelled => BatchError::Cancelled,
            other => BatchError::Connection(other),
        })?;
        claim.touched = true;

        let report = self.run_batch(&device, &plan).await;
        device.close().await;
        drop(claim);
        Ok(report)
    }

    /// Runs `plan` on an already connected device. No batch cooldown applies.
    pub async fn run_batch(&self, device: &DeviceLink, plan: &BatchPlan) -> BatchReport {
        let started = Instant::now();
        let mut sessions = Vec::with_capacity(plan.kinds.len());
        let mut aborted = false;
        info!(endpoint = %device.endpoint(), kinds = plan.kinds.len(), mode = plan.mode.as_label(), "batch starting");

        for (i, &kind) in plan.kinds.iter().enumerate() {
            if i > 0 && !self.rest(self.cfg.inter_session_cooldown).await {
                aborted = true;
                break;
            }
            if self.runtime_token.is_cancelled() || device.is_closed() {
                aborted = true;
                break;
            }

            let report = self.run_kind(kind, device, plan).await;
            let state = report.state;
            sessions.push(report);

            if plan.mode.should_abort(state) {
                warn!(sensor = %kind, state = %state, "batch aborted");
                aborted = true;
                break;
            }
        }

        let report = BatchReport {
            endpoint: device.endpoint().clone(),
            planned: plan.kinds.len(),
            sessions,
            aborted,
            elapsed: started.elapsed(),
        };
        info!(
            endpoint = %report.endpoint,
            ran = report.sessions.len(),
            planned = report.planned,
            aborted,
            "batch finished"
        );
        report
    }

    /// One kind of a batch, retried up to `session_attempts` times.
    async fn run_kind(&self, kind: SensorKind, device: &DeviceLink, plan: &BatchPlan) -> SessionReport {
        let retry = Retry::new(
            plan.session_attempts,
            BackoffPolicy::constant(self.cfg.inter_session_cooldown),
        );
        let res = retry
            .run(&CancellationToken::new(), |attempt| async move {
                if attempt > 1 {
                    info!(sensor = %kind, attempt, "retrying calibration");
                }
                let handle = self.spawn_session(kind, device, plan.verify_health);
                let cancel = handle.cancellation_token();
                let report = handle.wait().await;
                // The session token is a child of the runtime token, so this covers both
                // `cancel_session` and `cancel_all`.
                if report.succeeded() || cancel.is_cancelled() || device.is_closed() {
                    Ok(report)
                } else {
                    Err(report)
                }
            })
            .await;

        match res {
            Ok(report)
            | Err(RetryError::Exhausted {
                last: AttemptError::Failed(report),
                ..
            }) => report,
            Err(RetryError::Exhausted {
                last: AttemptError::TimedOut(_),
                ..
            })
            | Err(RetryError::Cancelled) => {
                SessionReport::failed(SessionId::next(), kind, "cancelled")
            }
        }
    }

    fn spawn_session(&self, kind: SensorKind, device: &DeviceLink, verify_health: bool) -> SessionHandle {
        let id = SessionId::next();
        let cancel = self.runtime_token.child_token();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);

        let runner = SessionRunner {
            id,
            kind,
            cfg: Arc::clone(&self.cfg),
            device: device.clone(),
            bus: self.bus.clone(),
            cancel: cancel.clone(),
            state_tx,
            verify_health,
        };

        lock(&self.sessions).insert(id, cancel.clone());
        let deregister = Deregister {
            registry: Arc::clone(&self.sessions),
            id,
        };
        info!(session = %id, sensor = %kind, endpoint = %device.endpoint(), "session starting");

        let join = tokio::spawn(async move {
            let _deregister = deregister;
            runner.run().await
        });
        SessionHandle::new(id, kind, cancel, state_rx, join)
    }

    /// Marks `endpoint` as running a batch, unless one is running or cooling down.
    ///
    /// The check and the claim happen under one lock.
    fn claim(&self, endpoint: &Endpoint) -> Result<BatchClaim<'_>, BatchError> {
        let mut batches = lock(&self.batches);
        let previous = match batches.get(endpoint) {
            Some(BatchSlot::Running) => {
                warn!(endpoint = %endpoint, "batch rejected, another batch is running");
                return Err(BatchError::Busy);
            }
            Some(BatchSlot::Finished(at)) => Some(*at),
            None => None,
        };
        if let (Some(cooldown), Some(at)) = (self.cfg.batch_cooldown(), previous) {
            let since = at.elapsed();
            if since < cooldown {
                let remaining = cooldown - since;
                warn!(endpoint = %endpoint, ?remaining, "batch rejected, device cooling down");
                return Err(BatchError::CoolingDown { remaining });
            }
        }
        batches.insert(endpoint.clone(), BatchSlot::Running);
        Ok(BatchClaim {
            batches: &self.batches,
            endpoint: endpoint.clone(),
            previous,
            touched: false,
        })
    }

    /// Sleeps `d`; `false` if the supervisor was cancelled meanwhile.
    async fn rest(&self, d: Duration) -> bool {
        if d.is_zero() {
            return !self.runtime_token.is_cancelled();
        }
        tokio::select! {
            biased;
            _ = self.runtime_token.cancelled() => false,
            _ = time::sleep(d) => true,
        }
    }

    /// Subscribes to the bus and forwards events to the subscriber set (fire-and-forget).
    pub(crate) fn subscriber_listener(&self) {
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subs);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => set.emit(&ev),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(dropped = n, "fan-out listener lagging behind the bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

/// Removes a finished session from the registry, even if its task panicked.
struct Deregister {
    registry: Registry,
    id: SessionId,
}

impl Drop for Deregister {
    fn drop(&mut self) {
        lock(&self.registry).remove(&self.id);
    }
}

/// Releases an endpoint claimed by `start_batch`, also when the batch future is dropped.
///
/// A batch that reached the device starts the cooldown on release; one that never
/// connected restores the previous slot.
struct BatchClaim<'a> {
    batches: &'a Batches,
    endpoint: Endpoint,
    previous: Option<Instant>,
    touched: bool,
}

impl Drop for BatchClaim<'_> {
    fn drop(&mut self) {
        let finished = if self.touched {
            Some(Instant::now())
        } else {
            self.previous
        };
        let mut batches = lock(self.batches);
        match finished {
            Some(at) => {
                batches.insert(self.endpoint.clone(), BatchSlot::Finished(at));
            }
            None => {
                batches.remove(&self.endpoint);
            }
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
