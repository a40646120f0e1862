//! Runtime core: configuration, supervision and batches.
//!
//! - [`config`]: every timeout, retry budget and cooldown;
//! - [`supervisor`]: connections, sessions, batches, fan-out delivery;
//! - [`builder`]: assembles a supervisor with its sinks;
//! - [`batch`]: batch plans and reports;
//! - [`shutdown`]: cross-platform termination signal handling.

mod batch;
mod builder;
mod config;
mod shutdown;
mod supervisor;

pub use batch::{BatchPlan, BatchReport};
pub use builder::SupervisorBuilder;
pub use config::Config;
pub use shutdown::{ShutdownSignal, wait_for_shutdown_signal};
pub use supervisor::Supervisor;
