//! # What a batch does after a session ends without success.
//!
//! [`BatchMode`] decides whether the remaining sensors of a batch still get calibrated.
//!
//! ```text
//!                      Succeeded   TimedOut   Failed / Rejected
//! AbortOnFailure        continue   continue        abort        (default)
//! AbortOnAnyNonSuccess  continue    abort          abort
//! ContinueRegardless    continue   continue       continue
//! ```
//!
//! A timeout usually means the device went quiet (radio dropout, busy autopilot), not
//! that the sensor is bad, which is why the default keeps going past it.

use crate::session::SessionState;

/// Policy for continuing a batch past a non-successful session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BatchMode {
    /// Stop on the first `Failed` session; continue past `TimedOut`.
    #[default]
    AbortOnFailure,
    /// Stop on the first session that did not succeed.
    AbortOnAnyNonSuccess,
    /// Run every session of the batch regardless of outcomes.
    ContinueRegardless,
}

impl BatchMode {
    /// Stable snake_case label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            BatchMode::AbortOnFailure => "abort_on_failure",
            BatchMode::AbortOnAnyNonSuccess => "abort_on_any_non_success",
            BatchMode::ContinueRegardless => "continue_regardless",
        }
    }

    /// Returns `true` if the batch must stop after a session ended in `state`.
    pub fn should_abort(&self, state: SessionState) -> bool {
        match (self, state) {
            (_, SessionState::Succeeded) => false,
            (BatchMode::ContinueRegardless, _) => false,
            (BatchMode::AbortOnFailure, SessionState::Failed) => true,
            (BatchMode::AbortOnFailure, _) => false,
            (BatchMode::AbortOnAnyNonSuccess, _) => true,
        }
    }
}
