//! Engine configuration.
//!
//! [`EngineConfig::from_env`] reads the timer periods and thresholds that
//! operators commonly tune; everything else keeps its [`Default`].

use std::str::FromStr;
use std::time::Duration;

use cuemark_core::types::Seconds;

/// Default execution poll period.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default text reconciliation debounce.
pub const DEFAULT_RECONCILE_DEBOUNCE_MS: u64 = 800;

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Settings for one playback session.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Period of the execution poll.
    pub poll_interval: Duration,
    /// Quiet time after the last edit before the text is reconciled.
    pub reconcile_debounce: Duration,
    pub resolver: ResolverConfig,
    pub recorder: RecorderConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            reconcile_debounce: Duration::from_millis(DEFAULT_RECONCILE_DEBOUNCE_MS),
            resolver: ResolverConfig::default(),
            recorder: RecorderConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                             | Default |
    /// |-------------------------------------|---------|
    /// | `CUEMARK_POLL_INTERVAL_MS`          | `100`   |
    /// | `CUEMARK_RECONCILE_DEBOUNCE_MS`     | `800`   |
    /// | `CUEMARK_SEEK_THRESHOLD_SECS`       | `2.0`   |
    /// | `CUEMARK_ACTIVATION_TOLERANCE_SECS` | `0.5`   |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let poll_interval_ms = env_or("CUEMARK_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS);
        let reconcile_debounce_ms =
            env_or("CUEMARK_RECONCILE_DEBOUNCE_MS", DEFAULT_RECONCILE_DEBOUNCE_MS);

        let resolver = ResolverConfig {
            seek_threshold: env_or(
                "CUEMARK_SEEK_THRESHOLD_SECS",
                defaults.resolver.seek_threshold,
            ),
            activation_tolerance: env_or(
                "CUEMARK_ACTIVATION_TOLERANCE_SECS",
                defaults.resolver.activation_tolerance,
            ),
            ..defaults.resolver
        };

        Self {
            poll_interval: Duration::from_millis(poll_interval_ms.max(1)),
            reconcile_debounce: Duration::from_millis(reconcile_debounce_ms),
            resolver,
            recorder: defaults.recorder,
        }
    }
}

/// Parse an environment variable, falling back to `default` when it is
/// unset or malformed.
fn env_or<T: FromStr + Copy + std::fmt::Debug>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, ?default, "Ignoring malformed config value");
            default
        }),
        Err(_) => default,
    }
}

// ---------------------------------------------------------------------------
// ResolverConfig
// ---------------------------------------------------------------------------

/// Tolerances used by the execution resolver.
#[derive(Debug, Clone, Copy)]
pub struct ResolverConfig {
    /// How late (in media time) an idle tick may be and still activate an
    /// annotation whose window has started.
    pub activation_tolerance: Seconds,
    /// A jump in player time larger than this between ticks is a seek.
    pub seek_threshold: Seconds,
    /// Times at or below this after being far from zero count as a restart.
    pub restart_window: Seconds,
    /// Volume drift (percent) tolerated before re-applying.
    pub volume_tolerance: u8,
    /// Rate drift tolerated before re-applying.
    pub rate_tolerance: f64,
    /// Ticks an engine-issued seek may stay in flight before its tag expires.
    pub max_seek_settle_ticks: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            activation_tolerance: 0.5,
            seek_threshold: 2.0,
            restart_window: 0.5,
            volume_tolerance: 1,
            rate_tolerance: 0.01,
            max_seek_settle_ticks: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// RecorderConfig
// ---------------------------------------------------------------------------

/// Sampling periods, minimum deltas and debounce windows for the recorder.
#[derive(Debug, Clone, Copy)]
pub struct RecorderConfig {
    pub speed_poll: Duration,
    pub volume_poll: Duration,
    pub position_poll: Duration,
    pub state_poll: Duration,

    pub speed_min_delta: f64,
    pub volume_min_delta: f64,
    /// Distance from the predicted position that counts as a seek.
    pub seek_min_delta: Seconds,

    pub speed_debounce: Duration,
    pub volume_debounce: Duration,
    pub seek_debounce: Duration,
    pub pause_debounce: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            speed_poll: Duration::from_millis(250),
            volume_poll: Duration::from_millis(200),
            position_poll: Duration::from_millis(300),
            state_poll: Duration::from_millis(100),
            speed_min_delta: 0.01,
            volume_min_delta: 1.0,
            seek_min_delta: 1.5,
            speed_debounce: Duration::from_millis(500),
            volume_debounce: Duration::from_millis(500),
            seek_debounce: Duration::from_millis(1000),
            pause_debounce: Duration::from_millis(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.reconcile_debounce, Duration::from_millis(800));
        assert_eq!(config.resolver.seek_threshold, 2.0);
        assert_eq!(config.recorder.volume_debounce, Duration::from_millis(500));
    }

    #[test]
    fn env_or_falls_back_when_unset() {
        assert_eq!(env_or("CUEMARK_TEST_UNSET_KEY_4821", 7u64), 7);
    }
}
