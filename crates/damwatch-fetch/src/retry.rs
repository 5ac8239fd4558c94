//! Bounded retry policy for the upstream boundary.

use std::time::Duration;

use serde::Deserialize;

/// How many times to ask the upstream, and how long to wait in between.
///
/// The wait after the `n`th failed attempt is `delay * backoff_multiplier^(n-1)`;
/// the default multiplier of `1.0` gives a fixed delay. No wait follows the
/// final attempt, so the worst-case blocking time is bounded by
/// `(max_attempts - 1)` delays.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
  pub max_attempts:       u32,
  #[serde(rename = "delay_secs", deserialize_with = "deserialize_secs")]
  pub delay:              Duration,
  pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts:       3,
      delay:              Duration::from_secs(5),
      backoff_multiplier: 1.0,
    }
  }
}

impl RetryPolicy {
  pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
    Self { max_attempts, delay, backoff_multiplier: 1.0 }
  }

  /// At least one attempt is always made.
  pub fn attempts(&self) -> u32 { self.max_attempts.max(1) }

  /// Wait before the attempt following failed attempt `attempt` (1-based).
  pub fn delay_after(&self, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1) as i32;
    let factor = self.backoff_multiplier.max(1.0).powi(exponent);
    self.delay.mul_f64(factor)
  }
}

fn deserialize_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let secs = f64::deserialize(deserializer)?;
  Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}
