//! Error types used by the calvisor runtime and its transports.
//!
//! This module defines three error enums:
//!
//! - [`LinkError`]: faults raised by a transport ([`Link`](crate::Link)).
//! - [`ConnectionError`]: a device could not be reached after all retries.
//! - [`BatchError`]: a calibration batch could not be started or was interrupted.
//!
//! Protocol timeouts, command rejections and unclassifiable status text are **not**
//! errors: they are session outcomes reported through
//! [`StatusEvent`](crate::StatusEvent). Every enum provides `as_label` for logs/metrics.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by a transport.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The link was closed (locally or by the peer).
    #[error("link closed")]
    Closed,

    /// Underlying I/O or codec failure.
    #[error("link i/o failure: {reason}")]
    Io {
        /// Transport-specific description.
        reason: String,
    },

    /// The transport cannot express the requested operation.
    #[error("unsupported by transport: {what}")]
    Unsupported {
        /// What was requested.
        what: String,
    },
}

impl LinkError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use calvisor::LinkError;
    ///
    /// assert_eq!(LinkError::Closed.as_label(), "link_closed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            LinkError::Closed => "link_closed",
            LinkError::Io { .. } => "link_io",
            LinkError::Unsupported { .. } => "link_unsupported",
        }
    }

    /// Shorthand for [`LinkError::Io`].
    pub fn io(reason: impl Into<String>) -> Self {
        LinkError::Io {
            reason: reason.into(),
        }
    }
}

/// # The device could not be reached.
///
/// A transport that opens but never produces a heartbeat counts as a failed attempt.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Every attempt failed; `last` describes the final failure.
    #[error("device unreachable after {attempts} attempt(s): {last}")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Reason of the last failed attempt.
        last: String,
    },

    /// Connection establishment was cancelled.
    #[error("connection cancelled")]
    Cancelled,
}

impl ConnectionError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConnectionError::Exhausted { .. } => "connection_exhausted",
            ConnectionError::Cancelled => "connection_cancelled",
        }
    }
}

/// # Errors produced when starting or running a calibration batch.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    /// Another batch is still running against the same endpoint.
    #[error("a batch is already running on this device")]
    Busy,

    /// The device was calibrated too recently.
    #[error("device is cooling down; next batch allowed in {remaining:?}")]
    CoolingDown {
        /// Time left until the cooldown expires.
        remaining: Duration,
    },

    /// The device could not be reached.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The batch was cancelled before it started.
    #[error("batch cancelled")]
    Cancelled,
}

impl BatchError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use calvisor::BatchError;
    /// use std::time::Duration;
    ///
    /// let err = BatchError::CoolingDown { remaining: Duration::from_secs(12) };
    /// assert_eq!(err.as_label(), "batch_cooling_down");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BatchError::Busy => "batch_busy",
            BatchError::CoolingDown { .. } => "batch_cooling_down",
            BatchError::Connection(e) => e.as_label(),
            BatchError::Cancelled => "batch_cancelled",
        }
    }

    /// Indicates whether retrying later can help.
    ///
    /// Returns `true` for [`BatchError::Busy`], [`BatchError::CoolingDown`] and
    /// [`BatchError::Connection`].
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BatchError::Busy | BatchError::CoolingDown { .. } | BatchError::Connection(_)
        )
    }
}
