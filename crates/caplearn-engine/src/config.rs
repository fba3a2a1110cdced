//! Learner configuration.
//!
//! Defaults live in [`defaults`]; every value can be overridden through the
//! environment variables in [`env_vars`] via [`LearnerConfig::from_env`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default values.
pub mod defaults {
    /// Length of the active learning window after pairing.
    pub const ACTIVE_LEARNING_SECS: u64 = 15 * 60;
    /// Interval between passive refinement passes.
    pub const PASSIVE_CHECK_SECS: u64 = 5 * 60;
    /// Samples a data point needs before a capability is inferred from it.
    pub const MIN_SAMPLES_FOR_INFERENCE: usize = 2;
    /// Profiles older than this are re-learned.
    pub const MAX_PROFILE_AGE_HOURS: u64 = 7 * 24;
    /// Sample history kept per source during the active window.
    pub const MAX_SAMPLES_PER_SOURCE: usize = 512;
}

/// Environment variable names.
pub mod env_vars {
    pub const ACTIVE_SECS: &str = "CAPLEARN_ACTIVE_SECS";
    pub const PASSIVE_SECS: &str = "CAPLEARN_PASSIVE_SECS";
    pub const MIN_SAMPLES: &str = "CAPLEARN_MIN_SAMPLES";
    pub const MAX_PROFILE_AGE_HOURS: &str = "CAPLEARN_MAX_PROFILE_AGE_HOURS";
    pub const MAX_SAMPLES_PER_SOURCE: &str = "CAPLEARN_MAX_SAMPLES_PER_SOURCE";
}

/// Timing and threshold configuration for one learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    /// Active learning window (seconds).
    pub active_learning_secs: u64,
    /// Passive refinement interval (seconds).
    pub passive_check_secs: u64,
    /// Minimum samples per data point before inference.
    pub min_samples: usize,
    /// Staleness threshold for stored profiles (hours).
    pub max_profile_age_hours: u64,
    /// Per-source history cap during the active window.
    pub max_samples_per_source: usize,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            active_learning_secs: defaults::ACTIVE_LEARNING_SECS,
            passive_check_secs: defaults::PASSIVE_CHECK_SECS,
            min_samples: defaults::MIN_SAMPLES_FOR_INFERENCE,
            max_profile_age_hours: defaults::MAX_PROFILE_AGE_HOURS,
            max_samples_per_source: defaults::MAX_SAMPLES_PER_SOURCE,
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl LearnerConfig {
    /// Defaults overridden by any `CAPLEARN_*` environment variables.
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            active_learning_secs: env_or(env_vars::ACTIVE_SECS, base.active_learning_secs),
            passive_check_secs: env_or(env_vars::PASSIVE_SECS, base.passive_check_secs),
            min_samples: env_or(env_vars::MIN_SAMPLES, base.min_samples),
            max_profile_age_hours: env_or(
                env_vars::MAX_PROFILE_AGE_HOURS,
                base.max_profile_age_hours,
            ),
            max_samples_per_source: env_or(
                env_vars::MAX_SAMPLES_PER_SOURCE,
                base.max_samples_per_source,
            ),
        }
        .normalized()
    }

    pub fn with_active_learning_secs(mut self, secs: u64) -> Self {
        self.active_learning_secs = secs;
        self
    }

    pub fn with_passive_check_secs(mut self, secs: u64) -> Self {
        self.passive_check_secs = secs;
        self
    }

    pub fn with_min_samples(mut self, samples: usize) -> Self {
        self.min_samples = samples;
        self
    }

    /// Clamp values that would stall the state machine.
    ///
    /// A zero passive interval would spin the refinement ticker and a zero
    /// sample threshold would infer from nothing.
    pub fn normalized(mut self) -> Self {
        self.passive_check_secs = self.passive_check_secs.max(1);
        self.min_samples = self.min_samples.max(1);
        self.max_samples_per_source = self.max_samples_per_source.max(1);
        self
    }

    pub fn active_duration(&self) -> Duration {
        Duration::from_secs(self.active_learning_secs)
    }

    pub fn passive_interval(&self) -> Duration {
        Duration::from_secs(self.passive_check_secs)
    }

    pub fn max_profile_age_ms(&self) -> i64 {
        (self.max_profile_age_hours as i64).saturating_mul(3_600_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LearnerConfig::default();
        assert_eq!(config.active_duration(), Duration::from_secs(900));
        assert_eq!(config.passive_interval(), Duration::from_secs(300));
        assert_eq!(config.min_samples, 2);
        assert_eq!(config.max_profile_age_ms(), 7 * 24 * 3_600_000);
    }

    #[test]
    fn test_normalized_clamps_zeroes() {
        let config = LearnerConfig::default()
            .with_passive_check_secs(0)
            .with_min_samples(0)
            .normalized();
        assert_eq!(config.passive_check_secs, 1);
        assert_eq!(config.min_samples, 1);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: LearnerConfig =
            serde_json::from_str(r#"{"active_learning_secs": 60}"#).unwrap();
        assert_eq!(config.active_learning_secs, 60);
        assert_eq!(config.passive_check_secs, defaults::PASSIVE_CHECK_SECS);
    }

    #[test]
    fn test_env_or_falls_back() {
        assert_eq!(env_or("CAPLEARN_TEST_UNSET_VARIABLE", 42u64), 42);
    }
}
