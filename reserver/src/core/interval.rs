//! Randomized retry interval policy.

use std::time::Duration;

use anyhow::{Result, bail};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Bounds, in whole seconds, for the delay between reservation attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub min_secs: u64,
    pub max_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_secs: 15,
            max_secs: 30,
        }
    }
}

impl RetryConfig {
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self { min_secs, max_secs }
    }

    /// Checks applied when the operator saves a new range.
    pub fn validate_range(&self) -> Result<()> {
        if self.min_secs == 0 {
            bail!("invalid interval range: min_secs must be > 0");
        }
        if self.max_secs < self.min_secs {
            bail!(
                "invalid interval range: max_secs ({}) must be >= min_secs ({})",
                self.max_secs,
                self.min_secs
            );
        }
        Ok(())
    }
}

/// Draw the delay before the next attempt.
///
/// Uniform over the inclusive second range. An inverted range collapses to
/// `min_secs`. Callers draw once per cycle so attempts have no fixed period.
pub fn next_delay<R: Rng + ?Sized>(config: &RetryConfig, rng: &mut R) -> Duration {
    if config.min_secs > config.max_secs {
        warn!(
            min_secs = config.min_secs,
            max_secs = config.max_secs,
            "min interval exceeds max interval; using min"
        );
        return Duration::from_secs(config.min_secs);
    }
    Duration::from_secs(rng.gen_range(config.min_secs..=config.max_secs))
}
