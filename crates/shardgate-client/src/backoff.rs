//! Reconnect backoff
//!
//! Exponential backoff with jitter. Retries are never capped in count; the
//! delay is capped at `max_delay` and never drops below [`MIN_RECONNECT_DELAY`].

use rand::Rng;
use std::time::Duration;

/// Smallest delay ever returned, whatever the configuration says.
pub const MIN_RECONNECT_DELAY: Duration = Duration::from_millis(100);

/// Configuration for reconnection behavior
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt
    pub initial_delay: Duration,
    /// Maximum delay between reconnection attempts
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Fraction of the delay that may be shaved off at random, in `0.0..=1.0`
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.3,
        }
    }
}

impl ReconnectConfig {
    /// Un-jittered delay for the given attempt number (1-based)
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.multiplier.max(1.0).powi(exponent);
        let delay_millis = self.initial_delay.as_millis() as f64 * factor;
        let max_millis = self.max_delay.as_millis() as f64;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let millis = delay_millis.min(max_millis) as u64;
        Duration::from_millis(millis)
    }

    /// Jittered delay for the given attempt, with `sample` drawn from `[0, 1)`
    #[must_use]
    pub fn jittered_delay(&self, attempt: u32, sample: f64) -> Duration {
        let base = self.delay_for_attempt(attempt);
        let jitter = unit_fraction(self.jitter) * unit_fraction(sample);
        base.mul_f64(1.0 - jitter).max(MIN_RECONNECT_DELAY)
    }
}

/// Clamp to `[0, 1]`; NaN and infinities count as no jitter
fn unit_fraction(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Consecutive-attempt tracker for one shard
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    attempts: u32,
}

impl Backoff {
    #[must_use]
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, attempts: 0 }
    }

    /// Register a new attempt and return how long to wait before it
    pub fn next_delay(&mut self) -> Duration {
        let sample = rand::thread_rng().gen::<f64>();
        self.next_delay_with(sample)
    }

    /// Same as [`Backoff::next_delay`] with a caller-provided jitter sample
    pub fn next_delay_with(&mut self, sample: f64) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        self.config.jittered_delay(self.attempts, sample)
    }

    /// Consecutive attempts since the last successful handshake
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Forget previous failures
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
