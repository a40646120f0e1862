//! Retry, delay and batch-continuation policies.
//!
//! ## Contents
//! - [`Retry`]        bounded wait with per-attempt timeout and attempt count
//! - [`BackoffPolicy`] how delays between attempts evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to avoid synchronized reconnects
//! - [`BatchMode`]     whether a batch continues after a non-successful session
//!
//! ## Where they are used
//! ```text
//! LinkSession::connect ── Retry { attempts: connect_retries, backoff: connect_backoff }
//! Dispatcher::request  ── Retry { attempts: 1 + ack_resends, backoff: none }
//!                          each attempt: send, then await_acknowledgment(ack_timeout)
//! Supervisor batch     ── Retry { attempts: session_attempts } + BatchMode
//! ```
//!
//! See [`LinkSession::connect`](crate::LinkSession::connect),
//! [`Dispatcher::request`](crate::Dispatcher::request) and
//! [`Supervisor::start_batch`](crate::Supervisor::start_batch).

mod backoff;
mod batch;
mod jitter;
mod retry;

pub use backoff::BackoffPolicy;
pub use batch::BatchMode;
pub use jitter::JitterPolicy;
pub use retry::{AttemptError, Retry, RetryError};
