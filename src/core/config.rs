//! # Runtime configuration.
//!
//! [`Config`] holds every timeout, retry budget and cooldown of the supervisor. It is
//! consumed in three places:
//! 1. **Connection**: [`Config::connect_options`] for `LinkSession::connect`.
//! 2. **Sessions**: [`Config::timing_for`] and [`Config::dispatcher`] per calibration.
//! 3. **Batches**: cooldowns enforced by `Supervisor::start_batch`.
//!
//! ## Sentinel values
//! - `gcs_heartbeat_interval = 0s` → we never send our own heartbeat
//! - `stream_rate_hz = 0` → data streams are not requested after connecting
//! - `batch_cooldown = 0s` → batches against the same device are not rate-limited

use std::collections::HashMap;
use std::time::Duration;

use crate::command::{Dispatcher, SensorKind};
use crate::link::{ConnectOptions, Identity};
use crate::policies::BackoffPolicy;
use crate::session::SessionTiming;

/// Supervisor configuration.
///
/// ## Field semantics
/// - `heartbeat_timeout`: per connection attempt, and per session when the link is stale
/// - `ack_timeout`: per transmission of the calibration request
/// - `quiet_period`: silence after activity that counts as completion
/// - `session_timeout`: absolute ceiling, unless `session_timeouts` overrides the kind
/// - `poll_interval`: longest single wait of a session, bounds cancellation latency
///
/// ## Notes
/// All fields are public. Prefer the accessors over checking sentinels at call sites.
#[derive(Clone, Debug)]
pub struct Config {
    /// How long to wait for a device heartbeat.
    pub heartbeat_timeout: Duration,

    /// How long to wait for `COMMAND_ACK` after each transmission.
    pub ack_timeout: Duration,

    /// Extra transmissions (with incremented confirmation) when no ack arrives.
    pub ack_resends: u32,

    /// Silence after activity that is taken as implicit success.
    pub quiet_period: Duration,

    /// Default absolute session ceiling.
    pub session_timeout: Duration,

    /// Per-kind overrides of `session_timeout`.
    pub session_timeouts: HashMap<SensorKind, Duration>,

    /// Upper bound of any single wait inside a session.
    pub poll_interval: Duration,

    /// Interval of our own GCS heartbeat while a session runs (`0` = never).
    pub gcs_heartbeat_interval: Duration,

    /// Maximum age of the last device heartbeat for the link to count as alive.
    pub liveness_window: Duration,

    /// Pause between two sessions of one batch.
    pub inter_session_cooldown: Duration,

    /// How long to wait for a `SYS_STATUS` when sampling sensor health.
    pub health_sample_timeout: Duration,

    /// Minimum time between two batches against the same device (`0` = none).
    pub batch_cooldown: Duration,

    /// Connection attempts.
    pub connect_retries: u32,

    /// Delay schedule between connection attempts.
    pub connect_backoff: BackoffPolicy,

    /// Our MAVLink system id.
    pub system_id: u8,

    /// Our MAVLink component id.
    pub component_id: u8,

    /// Telemetry stream rate requested after connecting (`0` = do not request).
    pub stream_rate_hz: u16,

    /// Capacity of the event bus ring buffer (min 1).
    pub bus_capacity: usize,
}

impl Config {
    /// Absolute session ceiling for `kind`.
    pub fn session_timeout_for(&self, kind: SensorKind) -> Duration {
        self.session_timeouts
            .get(&kind)
            .copied()
            .unwrap_or(self.session_timeout)
    }

    /// Timeouts for one session of `kind`.
    pub fn timing_for(&self, kind: SensorKind) -> SessionTiming {
        SessionTiming {
            heartbeat_timeout: self.heartbeat_timeout,
            ack_timeout: self.ack_timeout,
            quiet_period: self.quiet_period,
            session_timeout: self.session_timeout_for(kind),
        }
    }

    /// Our GCS heartbeat interval as an `Option`.
    ///
    /// - `None` → never send
    #[inline]
    pub fn gcs_heartbeat(&self) -> Option<Duration> {
        if self.gcs_heartbeat_interval == Duration::ZERO {
            None
        } else {
            Some(self.gcs_heartbeat_interval)
        }
    }

    /// Requested stream rate as an `Option`.
    #[inline]
    pub fn stream_rate(&self) -> Option<u16> {
        if self.stream_rate_hz == 0 {
            None
        } else {
            Some(self.stream_rate_hz)
        }
    }

    /// Batch cooldown as an `Option`.
    #[inline]
    pub fn batch_cooldown(&self) -> Option<Duration> {
        if self.batch_cooldown == Duration::ZERO {
            None
        } else {
            Some(self.batch_cooldown)
        }
    }

    /// Poll interval, never zero.
    #[inline]
    pub fn poll_interval_clamped(&self) -> Duration {
        self.poll_interval.max(Duration::from_millis(10))
    }

    /// Bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    pub fn identity(&self) -> Identity {
        Identity {
            system_id: self.system_id,
            component_id: self.component_id,
        }
    }

    /// Parameters for `LinkSession::connect`.
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            identity: self.identity(),
            retries: self.connect_retries,
            backoff: self.connect_backoff,
            heartbeat_timeout: self.heartbeat_timeout,
            liveness_window: self.liveness_window,
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.ack_timeout, self.ack_resends)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - heartbeat, ack: 10s each, no resends
    /// - quiet period: 5s
    /// - session ceiling: 120s (gyro 30s, baro 30s, mag 120s, accel 180s)
    /// - poll interval, GCS heartbeat: 1s
    /// - inter-session cooldown 2s, batch cooldown 300s, health sample wait 2s
    /// - 3 connection attempts, 5s apart
    fn default() -> Self {
        let session_timeouts = HashMap::from([
            (SensorKind::Gyro, Duration::from_secs(30)),
            (SensorKind::Barometer, Duration::from_secs(30)),
            (SensorKind::Magnetometer, Duration::from_secs(120)),
            (SensorKind::Accelerometer, Duration::from_secs(180)),
        ]);

        Self {
            heartbeat_timeout: Duration::from_secs(10),
            ack_timeout: Duration::from_secs(10),
            ack_resends: 0,
            quiet_period: Duration::from_secs(5),
            session_timeout: Duration::from_secs(120),
            session_timeouts,
            poll_interval: Duration::from_secs(1),
            gcs_heartbeat_interval: Duration::from_secs(1),
            liveness_window: Duration::from_secs(3),
            inter_session_cooldown: Duration::from_secs(2),
            health_sample_timeout: Duration::from_secs(2),
            batch_cooldown: Duration::from_secs(300),
            connect_retries: 3,
            connect_backoff: BackoffPolicy::constant(Duration::from_secs(5)),
            system_id: 255,
            component_id: 190,
            stream_rate_hz: 0,
            bus_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_kind_overrides_fall_back_to_default() {
        let cfg = Config::default();
        assert_eq!(cfg.session_timeout_for(SensorKind::Gyro), Duration::from_secs(30));
        assert_eq!(cfg.session_timeout_for(SensorKind::Barometer), Duration::from_secs(30));
        assert_eq!(cfg.session_timeout_for(SensorKind::Magnetometer), Duration::from_secs(120));
        assert_eq!(cfg.session_timeout_for(SensorKind::Accelerometer), Duration::from_secs(180));
        assert_eq!(cfg.session_timeout_for(SensorKind::LevelHorizon), Duration::from_secs(120));
        assert_eq!(cfg.timing_for(SensorKind::Gyro).session_timeout, Duration::from_secs(30));
    }

    #[test]
    fn zero_sentinels_disable() {
        let cfg = Config {
            gcs_heartbeat_interval: Duration::ZERO,
            batch_cooldown: Duration::ZERO,
            bus_capacity: 0,
            ..Config::default()
        };
        assert_eq!(cfg.gcs_heartbeat(), None);
        assert_eq!(cfg.stream_rate(), None);
        assert_eq!(cfg.batch_cooldown(), None);
        assert_eq!(cfg.bus_capacity_clamped(), 1);
        assert_eq!(Config::default().gcs_heartbeat(), Some(Duration::from_secs(1)));
    }
}
