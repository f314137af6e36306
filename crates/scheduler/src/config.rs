use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Queue sizing and replenishment cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Links requested from the task source per replenishment.
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
    /// Replenish when fewer than this many fetched links are pending.
    #[serde(default = "default_fetch_threshold")]
    pub fetch_threshold: usize,
    /// Sleep between source queries that yield nothing new.
    #[serde(default = "default_idle_interval", with = "duration_secs")]
    pub idle_interval: Duration,
}

fn default_fetch_size() -> usize {
    200
}

fn default_fetch_threshold() -> usize {
    30
}

fn default_idle_interval() -> Duration {
    Duration::from_secs(30)
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fetch_size: default_fetch_size(),
            fetch_threshold: default_fetch_threshold(),
            idle_interval: default_idle_interval(),
        }
    }
}

impl SchedulerConfig {
    /// Sizing derived from the worker count: ten links per worker per fetch,
    /// replenishing once fewer than two per worker remain. Zero workers falls
    /// back to the defaults.
    pub fn for_workers(jobs: usize) -> Self {
        if jobs == 0 {
            return Self::default();
        }
        Self {
            fetch_size: jobs * 10,
            fetch_threshold: jobs * 2,
            ..Self::default()
        }
    }
}

/// Delay each worker inserts between taking a task and running it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    #[serde(default = "default_short_delay", with = "duration_secs")]
    pub short: Duration,
    #[serde(default = "default_long_delay", with = "duration_secs")]
    pub long: Duration,
    /// Every `long_every`-th iteration (starting with the first) uses `long`.
    #[serde(default = "default_long_every")]
    pub long_every: u64,
}

fn default_short_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_long_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_long_every() -> u64 {
    10
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            short: default_short_delay(),
            long: default_long_delay(),
            long_every: default_long_every(),
        }
    }
}

impl PacingConfig {
    /// No delay at all. Used by tests and one-shot runs.
    pub fn none() -> Self {
        Self { short: Duration::ZERO, long: Duration::ZERO, long_every: 1 }
    }

    pub fn delay_for(&self, iteration: u64) -> Duration {
        if self.long_every != 0 && iteration % self.long_every == 0 {
            self.long
        } else {
            self.short
        }
    }
}

/// Settings for [`CollectionExecutor`](crate::CollectionExecutor).
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Root under which every repository path is resolved.
    pub storage_root: PathBuf,
    /// Clone/update only; skip metadata parsing.
    pub skip_parse: bool,
    /// Upper bound for one clone + parse cycle.
    pub task_timeout: Option<Duration>,
}

impl ExecutorConfig {
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self { storage_root: storage_root.into(), skip_parse: false, task_timeout: None }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizing_scales_with_workers() {
        let cfg = SchedulerConfig::for_workers(256);
        assert_eq!(cfg.fetch_size, 2560);
        assert_eq!(cfg.fetch_threshold, 512);

        let fallback = SchedulerConfig::for_workers(0);
        assert_eq!(fallback.fetch_size, 200);
        assert_eq!(fallback.fetch_threshold, 30);
        assert_eq!(fallback.idle_interval, Duration::from_secs(30));
    }

    #[test]
    fn every_tenth_iteration_waits_longer() {
        let pacing = PacingConfig::default();
        assert_eq!(pacing.delay_for(0), Duration::from_secs(5));
        assert_eq!(pacing.delay_for(1), Duration::from_secs(2));
        assert_eq!(pacing.delay_for(9), Duration::from_secs(2));
        assert_eq!(pacing.delay_for(10), Duration::from_secs(5));
        assert_eq!(PacingConfig::none().delay_for(3), Duration::ZERO);
    }
}
