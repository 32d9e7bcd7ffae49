//! Remux configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

/// Which output layout the remuxer tries first.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MuxStrategy {
    /// Progressive first, then fragmented, then raw video.
    #[default]
    Auto,
    /// Same chain as `Auto`; kept distinct so callers can state intent.
    Progressive,
    /// Skip the progressive attempt: fragmented, then raw video.
    Fragmented,
}

/// Upper bound on `collect_timeout_secs` (one day).
pub const MAX_COLLECT_TIMEOUT_SECS: f64 = 86_400.0;

/// Top-level remux configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    /// Wall-clock bound on sample collection, in seconds.
    pub collect_timeout_secs: f64,
    /// Progressive output smaller than this is treated as a failed build.
    pub min_progressive_bytes: usize,
    /// Fragmented output must exceed this fraction of the video input size.
    pub fragmented_min_ratio: f64,
    /// First strategy in the fallback chain.
    pub strategy: MuxStrategy,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            collect_timeout_secs: 15.0,
            min_progressive_bytes: 1024,
            fragmented_min_ratio: 0.9,
            strategy: MuxStrategy::Auto,
        }
    }
}

impl MuxConfig {
    /// Sample collection deadline as a `Duration`, clamped to
    /// `0..=MAX_COLLECT_TIMEOUT_SECS`. NaN yields zero.
    pub fn collect_timeout(&self) -> Duration {
        let secs = self.collect_timeout_secs.clamp(0.0, MAX_COLLECT_TIMEOUT_SECS);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }

    /// Reject values that would make every strategy fail or never finish.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.collect_timeout_secs > 0.0
            && self.collect_timeout_secs <= MAX_COLLECT_TIMEOUT_SECS)
        {
            return Err(ConfigError(format!(
                "collect_timeout_secs must be within (0, {}], got {}",
                MAX_COLLECT_TIMEOUT_SECS, self.collect_timeout_secs
            )));
        }
        if !(0.0..=1.0).contains(&self.fragmented_min_ratio) {
            return Err(ConfigError(format!(
                "fragmented_min_ratio must be within 0.0..=1.0, got {}",
                self.fragmented_min_ratio
            )));
        }
        Ok(())
    }
}
