//! # Status-text classification.
//!
//! Flight controllers report calibration progress only as human-readable `STATUSTEXT`
//! lines. [`classify`] maps one line to a [`Classification`] with a fixed rule table,
//! first match wins:
//!
//! | # | line contains                                             | result               |
//! |---|-----------------------------------------------------------|----------------------|
//! | 1 | `fail*`, `error*`, `abort*`, `reject*`, `timeout*`          | `Failed(line)`       |
//! | 2 | `success*`, `complete*`, `done*`, `pass*`, `finished*` and  | `Succeeded`          |
//! |   | either `calibrat*` or an active session without sub-steps   |                      |
//! | 3 | a number next to `progress`                                 | `Progress(percent)`  |
//! | 4 | `front|back|left|right|up|down` and `done|result`           | `SubStep(side)`      |
//! | 5 | an operator instruction phrase                              | `Instruction(line)`  |
//! | 6 | anything else                                               | `Ignore`             |
//!
//! Words match case-insensitively on prefixes of alphanumeric runs, so `failed` hits
//! `fail` while `compass` does not hit `pass`. Instruction phrases match as substrings.
//!
//! The function is pure: the only state it sees is the [`Context`] argument.
//!
//! ```
//! use calvisor::{classify, Classification, Context};
//!
//! let ctx = Context::default();
//! assert_eq!(classify("gyro calibration progress <45> done", ctx), Classification::Succeeded);
//! assert_eq!(classify("[cal] progress <45>", ctx), Classification::Progress(45));
//! ```

use std::sync::Arc;

use crate::command::Orientation;

const FAILURE: [&str; 5] = ["fail", "error", "abort", "reject", "timeout"];
const SUCCESS: [&str; 5] = ["success", "complete", "done", "pass", "finished"];
const CALIBRATION: &str = "calibrat";
const PROGRESS: &str = "progress";
const SIDE_MARKERS: [&str; 2] = ["done", "result"];
const INSTRUCTIONS: [&str; 4] = [
    "hold vehicle still",
    "rotate to a different side",
    "detected rest position",
    "side already completed",
];

/// What a status line means for the running calibration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The device reported failure; carries the raw line.
    Failed(Arc<str>),
    Succeeded,
    /// Percentage, clamped to `0..=100`.
    Progress(u8),
    /// One orientation finished.
    SubStep(Orientation),
    /// Operator guidance, forwarded verbatim (trimmed).
    Instruction(Arc<str>),
    /// Diagnostic noise.
    Ignore,
}

/// Session facts the rules may depend on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Context {
    /// A calibration session is running.
    pub in_session: bool,
    /// Orientation sub-steps are still outstanding.
    pub awaiting_sub_steps: bool,
}

/// Classifies one status line.
pub fn classify(text: &str, ctx: Context) -> Classification {
    let lower = text.to_lowercase();
    let words = tokens(&lower);

    if has_prefix(&words, &FAILURE) {
        return Classification::Failed(Arc::from(text.trim()));
    }

    if has_prefix(&words, &SUCCESS)
        && (has_prefix(&words, &[CALIBRATION]) || (ctx.in_session && !ctx.awaiting_sub_steps))
    {
        return Classification::Succeeded;
    }

    if progress_adjacent(&words) {
        // A run of digits only fails to parse when it overflows, which saturates too.
        return match longest_digit_run(text) {
            Some(run) => {
                let pct = run.parse::<u32>().map_or(100, |p| p.min(100));
                Classification::Progress(pct as u8)
            }
            None => Classification::Ignore,
        };
    }

    if has_prefix(&words, &SIDE_MARKERS) {
        if let Some(side) = words.iter().find_map(|w| Orientation::from_token(w)) {
            return Classification::SubStep(side);
        }
    }

    if INSTRUCTIONS.iter().any(|p| lower.contains(p)) {
        return Classification::Instruction(Arc::from(text.trim()));
    }

    Classification::Ignore
}

fn tokens(lower: &str) -> Vec<&str> {
    lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}

fn has_prefix(words: &[&str], vocabulary: &[&str]) -> bool {
    words
        .iter()
        .any(|w| vocabulary.iter().any(|v| w.starts_with(v)))
}

fn is_number(word: &str) -> bool {
    word.bytes().all(|b| b.is_ascii_digit())
}

fn progress_adjacent(words: &[&str]) -> bool {
    words.iter().enumerate().any(|(i, w)| {
        *w == PROGRESS
            && (words.get(i + 1).is_some_and(|n| is_number(n))
                || i.checked_sub(1)
                    .and_then(|p| words.get(p))
                    .is_some_and(|n| is_number(n)))
    })
}

/// Longest contiguous ASCII digit run; the first one wins ties.
fn longest_digit_run(text: &str) -> Option<&str> {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|run| !run.is_empty())
        .fold(None, |best: Option<&str>, run| match best {
            Some(b) if b.len() >= run.len() => Some(b),
            _ => Some(run),
        })
}
