//! # Bounded wait with timeout and retry count.
//!
//! [`Retry`] is the single retry primitive of the crate. Connection establishment,
//! acknowledgment resends and batch-level session retries all run through
//! [`Retry::run`]:
//!
//! ```text
//! attempt 1 ──► op(1) ─┬─ Ok(v)          ──► return Ok(v)
//!                      ├─ Err(e)         ──┐
//!                      └─ per-attempt    ──┤
//!                         timeout hit      ▼
//!                              attempts left? ── no ──► Exhausted { last }
//!                                    │ yes
//!                                    ▼
//!                        sleep(backoff.next(n)) (cancellable)
//!                                    ▼
//!                               attempt n + 1
//! ```
//!
//! Cancellation is observed while an attempt is in flight and while sleeping.

use std::future::Future;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::policies::BackoffPolicy;

/// Why a single attempt did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError<E> {
    /// The attempt exceeded the per-attempt bound.
    TimedOut(Duration),
    /// The attempt returned an error.
    Failed(E),
}

/// Outcome of a retry loop that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt failed.
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Failure of the last attempt.
        last: AttemptError<E>,
    },
    /// The cancellation token fired.
    Cancelled,
}

/// Retry budget: how many attempts, how long each may take, how long to wait in between.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Retry {
    /// Total number of attempts (clamped to at least 1).
    pub attempts: u32,
    /// Optional bound for each individual attempt.
    pub per_attempt: Option<Duration>,
    /// Delay schedule between attempts.
    pub backoff: BackoffPolicy,
}

impl Retry {
    /// `attempts` tries separated by `backoff`, no per-attempt bound.
    pub fn new(attempts: u32, backoff: BackoffPolicy) -> Self {
        Self {
            attempts,
            per_attempt: None,
            backoff,
        }
    }

    /// A single attempt.
    pub fn once() -> Self {
        Self::new(1, BackoffPolicy::constant(Duration::ZERO))
    }

    /// Bounds every attempt by `timeout`.
    pub fn with_per_attempt(mut self, timeout: Duration) -> Self {
        self.per_attempt = Some(timeout);
        self
    }

    /// Runs `op` until it succeeds, the budget is exhausted, or `cancel` fires.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }

            let fut = op(attempt);
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                res = bounded(self.per_attempt, fut) => res,
            };

            let last = match outcome {
                Ok(v) => return Ok(v),
                Err(e) => e,
            };
            if attempt >= attempts {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last,
                });
            }

            let delay = self.backoff.next(attempt - 1);
            debug!(attempt, ?delay, "attempt failed, retrying");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = time::sleep(delay) => {}
            }
        }
    }
}

async fn bounded<T, E, Fut>(limit: Option<Duration>, fut: Fut) -> Result<T, AttemptError<E>>
where
    Fut: Future<Output = Result<T, E>>,
{
    match limit {
        Some(d) => match time::timeout(d, fut).await {
            Ok(res) => res.map_err(AttemptError::Failed),
            Err(_) => Err(AttemptError::TimedOut(d)),
        },
        None => fut.await.map_err(AttemptError::Failed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_failures_with_constant_delay() {
        let calls = Arc::new(AtomicU32::new(0));
        let retry = Retry::new(3, BackoffPolicy::constant(Duration::from_secs(5)));
        let started = Instant::now();

        let c = calls.clone();
        let res: Result<u32, RetryError<&str>> = retry
            .run(&CancellationToken::new(), move |attempt| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    if attempt < 3 { Err("no heartbeat") } else { Ok(attempt) }
                }
            })
            .await;

        assert_eq!(res, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_last_error() {
        let retry = Retry::new(2, BackoffPolicy::constant(Duration::from_millis(10)));
        let res: Result<(), _> = retry
            .run(&CancellationToken::new(), |attempt| async move {
                Err::<(), _>(format!("attempt {attempt}"))
            })
            .await;

        assert_eq!(
            res,
            Err(RetryError::Exhausted {
                attempts: 2,
                last: AttemptError::Failed("attempt 2".to_string()),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn per_attempt_bound_turns_hangs_into_timeouts() {
        let retry = Retry::once().with_per_attempt(Duration::from_secs(10));
        let res: Result<(), RetryError<()>> = retry
            .run(&CancellationToken::new(), |_| std::future::pending())
            .await;

        assert_eq!(
            res,
            Err(RetryError::Exhausted {
                attempts: 1,
                last: AttemptError::TimedOut(Duration::from_secs(10)),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff_sleep() {
        let cancel = CancellationToken::new();
        let retry = Retry::new(5, BackoffPolicy::constant(Duration::from_secs(60)));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let res: Result<(), RetryError<()>> =
            retry.run(&cancel, |_| async { Err(()) }).await;

        assert_eq!(res, Err(RetryError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
