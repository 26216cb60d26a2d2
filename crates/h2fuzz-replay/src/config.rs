//! Replay configuration, validation, and error types.
//!
//! [`ReplayConfig`] is the builder-input for a
//! [`ReplayDriver`](crate::driver::ReplayDriver).
//! [`validate()`](ReplayConfig::validate) is called by the driver
//! constructor so an unusable policy is rejected before any frame is sent.

use std::time::Duration;

use h2fuzz_core::ConnectionParams;
use thiserror::Error;

// ── MalformedPolicy ────────────────────────────────────────────────

/// What the driver does with a record that fails to decode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MalformedPolicy {
    /// Stop the run with [`ReplayError::Decode`](crate::ReplayError::Decode).
    #[default]
    Abort,
    /// Log the error, count the record as skipped, and continue.
    Skip,
}

// ── ReconnectPolicy ────────────────────────────────────────────────

/// How the driver rebuilds a faulted connection.
///
/// Attempt `n` (0-based) that fails is followed by a sleep of
/// `initial_backoff * factor^n`, capped at `max_backoff`.
#[derive(Clone, Debug)]
pub struct ReconnectPolicy {
    /// Connect attempts per fault before the run fails. Default: 3.
    pub max_attempts: u32,
    /// Sleep after the first failed attempt. Default: 100ms.
    pub initial_backoff: Duration,
    /// Upper bound on any single sleep. Default: 2s.
    pub max_backoff: Duration,
    /// Multiplicative growth per failed attempt. Default: 2.0.
    pub factor: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            factor: 2.0,
        }
    }
}

impl ReconnectPolicy {
    /// Sleep duration after the failed attempt with 0-based index `attempt`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let nanos = self.initial_backoff.as_nanos() as f64 * self.factor.powi(exp);
        if !nanos.is_finite() || nanos >= self.max_backoff.as_nanos() as f64 {
            return self.max_backoff;
        }
        Duration::from_nanos(nanos.round() as u64)
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected during [`ReplayConfig::validate()`].
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigError {
    /// `io_timeout` is `Some(0)`, which would fault every write.
    #[error("io_timeout must be non-zero")]
    ZeroTimeout,
    /// ReconnectPolicy invariant violated.
    #[error("invalid reconnect policy: {reason}")]
    InvalidReconnect {
        /// Description of which invariant was violated.
        reason: String,
    },
}

// ── ReplayConfig ───────────────────────────────────────────────────

/// Complete configuration for a replay run.
#[derive(Clone, Debug)]
pub struct ReplayConfig {
    /// Handling of undecodable records. Default: [`MalformedPolicy::Abort`].
    pub on_malformed: MalformedPolicy,
    /// Bound on connect and per-frame write duration. Default: 10s.
    /// `None` leaves connection I/O unbounded.
    pub io_timeout: Option<Duration>,
    /// Reconnection behaviour after a fault.
    pub reconnect: ReconnectPolicy,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            on_malformed: MalformedPolicy::Abort,
            io_timeout: Some(Duration::from_secs(10)),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ReplayConfig {
    /// `base` with this run's `io_timeout` applied.
    ///
    /// The driver builds every replacement connection from these. Build
    /// the initial connection from them too: the driver cannot interrupt
    /// a write that never returns, so the bound has to live in the
    /// connection itself.
    pub fn connection_params(&self, base: &ConnectionParams) -> ConnectionParams {
        let mut params = base.clone();
        if self.io_timeout.is_some() {
            params.io_timeout = self.io_timeout;
        }
        params
    }

    /// Validate all invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.io_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::ZeroTimeout);
        }
        let r = &self.reconnect;
        if r.max_attempts == 0 {
            return Err(ConfigError::InvalidReconnect {
                reason: "max_attempts must be at least 1".to_string(),
            });
        }
        if !r.factor.is_finite() || r.factor < 1.0 {
            return Err(ConfigError::InvalidReconnect {
                reason: format!("factor must be finite and >= 1.0, got {}", r.factor),
            });
        }
        if r.initial_backoff > r.max_backoff {
            return Err(ConfigError::InvalidReconnect {
                reason: format!(
                    "initial_backoff ({:?}) exceeds max_backoff ({:?})",
                    r.initial_backoff, r.max_backoff,
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_params_carry_the_io_bound() {
        let base = ConnectionParams::new("fuzz.example:443").tls(false);
        let config = ReplayConfig::default();
        let stamped = config.connection_params(&base);
        assert_eq!(stamped.io_timeout, Some(Duration::from_secs(10)));
        assert_eq!(stamped.clone().io_timeout(None), base);

        // Unbounded config leaves the caller's own bound alone.
        let own = base.clone().io_timeout(Some(Duration::from_secs(1)));
        let unbounded = ReplayConfig {
            io_timeout: None,
            ..ReplayConfig::default()
        };
        assert_eq!(unbounded.connection_params(&own), own);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(ReplayConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_timeout_rejected() {
        let cfg = ReplayConfig {
            io_timeout: Some(Duration::ZERO),
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroTimeout));

        let unbounded = ReplayConfig {
            io_timeout: None,
            ..Default::default()
        };
        assert!(unbounded.validate().is_ok());
    }

    #[test]
    fn reconnect_invariants() {
        let mut cfg = ReplayConfig::default();
        cfg.reconnect.max_attempts = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidReconnect { .. })));

        let mut cfg = ReplayConfig::default();
        cfg.reconnect.factor = 0.5;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidReconnect { .. })));

        let mut cfg = ReplayConfig::default();
        cfg.reconnect.factor = f64::NAN;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidReconnect { .. })));

        let mut cfg = ReplayConfig::default();
        cfg.reconnect.initial_backoff = Duration::from_secs(5);
        match cfg.validate() {
            Err(ConfigError::InvalidReconnect { reason }) => {
                assert!(reason.contains("exceeds max_backoff"), "{reason}");
            }
            other => panic!("expected InvalidReconnect, got {other:?}"),
        }
    }

    #[test]
    fn backoff_grows_then_caps() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.backoff_for(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(400));
        assert_eq!(policy.backoff_for(10), Duration::from_secs(2));
        assert_eq!(policy.backoff_for(u32::MAX), Duration::from_secs(2));
    }
}
