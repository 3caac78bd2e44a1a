//! Run configuration consumed from the host test framework.
//!
//! Cargo's test harness has no custom flags, so the knobs arrive as
//! environment variables:
//!
//! | variable | default | effect |
//! |---|---|---|
//! | `DECREE_WORKERS` | host parallelism | workers spawned |
//! | `DECREE_REPLAY` | unset | read test cases from this file instead of enumerating |
//! | `DECREE_DIR` | current directory | directory for newly created replay files |
//! | `DECREE_PERCENT` | 100 | sampling percentage, `1..=100` |
//! | `DECREE_SEED` | wall clock nanos | PRNG seed, used only when sampling |

use std::env;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::ConfigError;

/// Environment variable selecting the worker count.
pub const ENV_WORKERS: &str = "DECREE_WORKERS";
/// Environment variable pointing a run at an existing replay file.
pub const ENV_REPLAY: &str = "DECREE_REPLAY";
/// Environment variable selecting the directory for new replay files.
pub const ENV_DIR: &str = "DECREE_DIR";
/// Environment variable selecting the sampling percentage.
pub const ENV_PERCENT: &str = "DECREE_PERCENT";
/// Environment variable selecting the sampling seed.
pub const ENV_SEED: &str = "DECREE_SEED";

/// Settings for one harness run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Number of worker threads executing test cases.
    pub workers: usize,
    /// When set, enumerate recorded cases from this file instead of the
    /// Cartesian product.
    pub replay: Option<PathBuf>,
    /// Directory where newly created replay files land.
    pub dir: PathBuf,
    /// Percentage of generated cases to actually execute, `1..=100`.
    pub percent: u64,
    /// Seed for the sampling filter; ignored at 100 percent.
    pub seed: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            replay: None,
            dir: PathBuf::from("."),
            percent: 100,
            seed: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(12345),
        }
    }
}

impl RunConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Read the configuration through `lookup`.
    ///
    /// This is the seam tests use to avoid mutating process-global
    /// environment state; [`from_env`](RunConfig::from_env) passes
    /// [`std::env::var`] through it.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = non_empty(lookup(ENV_WORKERS)) {
            let workers = parse(ENV_WORKERS, &value)?;
            if workers == 0 {
                return Err(ConfigError::InvalidEnvValue {
                    var: ENV_WORKERS,
                    value,
                });
            }
            config.workers = workers;
        }
        if let Some(value) = non_empty(lookup(ENV_REPLAY)) {
            config.replay = Some(PathBuf::from(value));
        }
        if let Some(value) = non_empty(lookup(ENV_DIR)) {
            config.dir = PathBuf::from(value);
        }
        if let Some(value) = non_empty(lookup(ENV_PERCENT)) {
            let percent: u64 = parse(ENV_PERCENT, &value)?;
            if !(1..=100).contains(&percent) {
                return Err(ConfigError::InvalidPercent { got: percent });
            }
            config.percent = percent;
        }
        if let Some(value) = non_empty(lookup(ENV_SEED)) {
            config.seed = parse(ENV_SEED, &value)?;
        }

        Ok(config)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn parse<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidEnvValue {
        var,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        move |var| map.get(var).map(|v| v.to_string())
    }

    #[test]
    fn test_defaults() {
        let config = RunConfig::from_lookup(|_| None).expect("defaults parse");
        assert!(config.workers >= 1);
        assert!(config.replay.is_none());
        assert_eq!(config.dir, PathBuf::from("."));
        assert_eq!(config.percent, 100);
    }

    #[test]
    fn test_all_variables() {
        let config = RunConfig::from_lookup(lookup(&[
            (ENV_WORKERS, "4"),
            (ENV_REPLAY, "/tmp/case.test"),
            (ENV_DIR, "/tmp/replays"),
            (ENV_PERCENT, "25"),
            (ENV_SEED, "42"),
        ]))
        .expect("valid configuration");
        assert_eq!(config.workers, 4);
        assert_eq!(config.replay, Some(PathBuf::from("/tmp/case.test")));
        assert_eq!(config.dir, PathBuf::from("/tmp/replays"));
        assert_eq!(config.percent, 25);
        assert_eq!(config.seed, 42);
    }

    #[test]
    fn test_empty_values_ignored() {
        let config =
            RunConfig::from_lookup(lookup(&[(ENV_REPLAY, ""), (ENV_DIR, "")])).expect("defaults");
        assert!(config.replay.is_none());
        assert_eq!(config.dir, PathBuf::from("."));
    }

    #[test]
    fn test_invalid_workers() {
        for bad in ["zero?", "0", "-3"] {
            let result = RunConfig::from_lookup(lookup(&[(ENV_WORKERS, bad)]));
            assert!(
                matches!(result, Err(ConfigError::InvalidEnvValue { var, .. }) if var == ENV_WORKERS),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_percent_bounds() {
        for bad in [0u64, 101, 1000] {
            let value = bad.to_string();
            let result = RunConfig::from_lookup(lookup(&[(ENV_PERCENT, value.as_str())]));
            assert!(matches!(
                result,
                Err(ConfigError::InvalidPercent { got }) if got == bad
            ));
        }
        let config =
            RunConfig::from_lookup(lookup(&[(ENV_PERCENT, "1")])).expect("lower bound valid");
        assert_eq!(config.percent, 1);
    }
}
