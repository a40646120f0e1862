//! # Request dispatch and acknowledgment correlation.
//!
//! ```text
//! request(link, req) ──► send COMMAND_LONG (confirmation = n - 1)
//!                           │
//!                           ▼
//!              await_acknowledgment(ack_timeout)
//!                ├─ COMMAND_ACK(cmd, 0 | 5)  ──► Accepted
//!                ├─ COMMAND_ACK(cmd, other)  ──► Rejected(code)
//!                └─ nothing                  ──► resend while budget left, else NoResponse
//! ```
//!
//! Acks for other commands are skipped. Resends go through [`Retry`] like every other
//! bounded wait in the crate.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::LinkError;
use crate::link::{LinkSession, Message, MessageKind};
use crate::policies::{AttemptError, BackoffPolicy, Retry, RetryError};

use super::{CalibrationRequest, MAV_RESULT_ACCEPTED};

/// `MAV_RESULT_IN_PROGRESS`: the device started working on the command.
const MAV_RESULT_IN_PROGRESS: u8 = 5;

/// How a command was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Accepted,
    /// Refused with the device's `MAV_RESULT` code, passed through unmodified.
    Rejected(u8),
    /// No matching acknowledgment within the timeout.
    NoResponse,
}

/// Matches `msg` against an outstanding `command`.
pub fn correlate(msg: &Message, command: u16) -> Option<AckOutcome> {
    match *msg {
        Message::CommandAck { command: c, result } if c == command => Some(match result {
            MAV_RESULT_ACCEPTED | MAV_RESULT_IN_PROGRESS => AckOutcome::Accepted,
            code => AckOutcome::Rejected(code),
        }),
        _ => None,
    }
}

/// Writes calibration requests and waits for their acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatcher {
    ack_timeout: Duration,
    resends: u32,
}

enum AckFailure {
    Silent,
    Link(LinkError),
}

struct InFlight<'a, F> {
    link: &'a mut LinkSession,
    request: CalibrationRequest,
    on_sent: F,
}

impl Dispatcher {
    /// Waits `ack_timeout` per transmission and resends up to `resends` times.
    pub fn new(ack_timeout: Duration, resends: u32) -> Self {
        Self {
            ack_timeout,
            resends,
        }
    }

    /// Serializes `request` for the device currently behind `link`.
    pub async fn send_calibration_request(
        &self,
        link: &mut LinkSession,
        request: &CalibrationRequest,
    ) -> Result<(), LinkError> {
        let (target_system, target_component) = link.target();
        link.send_command(request.to_command(target_system, target_component))
            .await
    }

    /// Waits up to `timeout` for the acknowledgment of `command`.
    ///
    /// Only link faults are errors; silence is [`AckOutcome::NoResponse`].
    pub async fn await_acknowledgment(
        &self,
        link: &mut LinkSession,
        command: u16,
        timeout: Duration,
    ) -> Result<AckOutcome, LinkError> {
        let deadline = Instant::now() + timeout;
        loop {
            let Some(msg) = link
                .receive_until(deadline, Some(MessageKind::CommandAck))
                .await?
            else {
                return Ok(AckOutcome::NoResponse);
            };
            match correlate(&msg, command) {
                Some(outcome) => return Ok(outcome),
                None => debug!(?msg, command, "skipping unrelated ack"),
            }
        }
    }

    /// Sends `request` and waits for its acknowledgment, resending on silence.
    ///
    /// `on_sent` observes every transmission (with its confirmation counter). Cancellation
    /// is reported as [`LinkError::Closed`].
    pub async fn request<F>(
        &self,
        link: &mut LinkSession,
        request: CalibrationRequest,
        cancel: &CancellationToken,
        on_sent: F,
    ) -> Result<AckOutcome, LinkError>
    where
        F: FnMut(&CalibrationRequest) + Send,
    {
        let inflight = Mutex::new(InFlight {
            link,
            request,
            on_sent,
        });
        let retry = Retry::new(1 + self.resends, BackoffPolicy::constant(Duration::ZERO));

        let res = retry
            .run(cancel, |attempt| {
                let inflight = &inflight;
                async move {
                    let mut guard = inflight.lock().await;
                    let InFlight {
                        link,
                        request,
                        on_sent,
                    } = &mut *guard;
                    if attempt > 1 {
                        *request = request.resend();
                        warn!(confirmation = request.confirmation(), "no ack, resending calibration request");
                    }

                    self.send_calibration_request(link, request)
                        .await
                        .map_err(AckFailure::Link)?;
                    on_sent(&*request);

                    match self
                        .await_acknowledgment(link, request.command_id(), self.ack_timeout)
                        .await
                    {
                        Ok(AckOutcome::NoResponse) => Err(AckFailure::Silent),
                        Ok(outcome) => Ok(outcome),
                        Err(e) => Err(AckFailure::Link(e)),
                    }
                }
            })
            .await;

        match res {
            Ok(outcome) => Ok(outcome),
            Err(RetryError::Cancelled) => Err(LinkError::Closed),
            Err(RetryError::Exhausted { last, .. }) => match last {
                AttemptError::Failed(AckFailure::Link(e)) => Err(e),
                AttemptError::Failed(AckFailure::Silent) | AttemptError::TimedOut(_) => {
                    Ok(AckOutcome::NoResponse)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::SensorKind;
    use crate::link::{Endpoint, Identity, Outgoing, mock};

    fn session(link: mock::MockLink) -> LinkSession {
        LinkSession::attach(
            Box::new(link),
            Endpoint::new("mock"),
            Identity::default(),
            Duration::from_secs(3),
        )
    }

    #[test]
    fn correlation_passes_codes_through() {
        let ack = |result| Message::CommandAck {
            command: 241,
            result,
        };
        assert_eq!(correlate(&ack(0), 241), Some(AckOutcome::Accepted));
        assert_eq!(correlate(&ack(5), 241), Some(AckOutcome::Accepted));
        assert_eq!(correlate(&ack(1), 241), Some(AckOutcome::Rejected(1)));
        assert_eq!(correlate(&ack(4), 241), Some(AckOutcome::Rejected(4)));
        assert_eq!(correlate(&ack(0), 400), None);
        assert_eq!(correlate(&Message::text("ok"), 241), None);
    }

    #[tokio::test(start_paused = true)]
    async fn unrelated_acks_are_skipped() {
        let (link, device) = mock::pair(1, 1);
        let mut link = session(link);
        device.ack(400, 0);
        device.ack(241, 3);

        let outcome = Dispatcher::new(Duration::from_secs(10), 0)
            .await_acknowledgment(&mut link, 241, Duration::from_secs(10))
            .await;
        assert_eq!(outcome, Ok(AckOutcome::Rejected(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn silence_is_no_response_after_timeout() {
        let (link, _device) = mock::pair(1, 1);
        let mut link = session(link);

        let started = Instant::now();
        let outcome = Dispatcher::new(Duration::from_secs(10), 0)
            .await_acknowledgment(&mut link, 241, Duration::from_secs(10))
            .await;
        assert_eq!(outcome, Ok(AckOutcome::NoResponse));
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn resends_increment_confirmation() {
        let (link, device) = mock::pair(1, 1);
        let mut link = session(link);
        let mut seen = Vec::new();

        let outcome = Dispatcher::new(Duration::from_secs(2), 2)
            .request(
                &mut link,
                CalibrationRequest::new(SensorKind::Gyro),
                &CancellationToken::new(),
                |req| seen.push(req.confirmation()),
            )
            .await;

        assert_eq!(outcome, Ok(AckOutcome::NoResponse));
        assert_eq!(seen, vec![0, 1, 2]);
        let confirmations: Vec<u8> = device
            .sent()
            .into_iter()
            .filter_map(|f| match f {
                Outgoing::Command(c) => Some(c.confirmation),
                _ => None,
            })
            .collect();
        assert_eq!(confirmations, vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_maps_to_closed() {
        let (link, _device) = mock::pair(1, 1);
        let mut link = session(link);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = Dispatcher::new(Duration::from_secs(10), 0)
            .request(
                &mut link,
                CalibrationRequest::new(SensorKind::Gyro),
                &cancel,
                |_| {},
            )
            .await;
        assert_eq!(outcome, Err(LinkError::Closed));
    }
}
