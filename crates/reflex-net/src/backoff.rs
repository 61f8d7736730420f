//! Exponential reconnect backoff with symmetric jitter.
//!
//! The delay for attempt `n` is `base * multiplier^(n - 1)`, capped at `max`,
//! then perturbed by up to `±jitter_pct` percent. The jittered result is kept
//! inside `[base, max]`, so a retry never fires faster than the base delay and
//! never waits longer than the cap.

use std::time::Duration;

use rand::Rng;
use reflex_config::RecoveryConfig;

/// Backoff parameters for reconnect attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay for the first attempt and the floor for every delay.
    pub base: Duration,
    /// Cap on every delay.
    pub max: Duration,
    /// Growth factor per attempt.
    pub multiplier: f64,
    /// Jitter as a percentage of the computed delay (0-50).
    pub jitter_pct: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&RecoveryConfig::default())
    }
}

impl BackoffPolicy {
    /// Build a policy from the recovery section of the config.
    pub fn from_config(config: &RecoveryConfig) -> Self {
        Self {
            base: config.base_delay(),
            max: config.max_delay().max(config.base_delay()),
            multiplier: config.multiplier.max(1.0),
            jitter_pct: config.jitter_pct.min(50),
        }
    }

    /// Un-jittered delay for `attempt` (1-based; 0 is treated as 1).
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1) - 1;
        let exponent = i32::try_from(exponent).unwrap_or(i32::MAX);
        let secs = self.base.as_secs_f64() * self.multiplier.powi(exponent);
        let secs = secs.min(self.max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    /// Jittered delay for `attempt`, drawing randomness from `rng`.
    pub fn delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let nominal = self.nominal_delay(attempt).as_secs_f64();

        let jittered = if self.jitter_pct > 0 {
            let spread = nominal * f64::from(self.jitter_pct) / 100.0;
            nominal + spread * rng.random_range(-1.0..=1.0)
        } else {
            nominal
        };

        let floor = self.base.as_secs_f64();
        let ceiling = self.max.as_secs_f64().max(floor);
        Duration::from_secs_f64(jittered.clamp(floor, ceiling))
    }
}
