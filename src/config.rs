//! Configuration for Stateful Checks
//!
//! `CheckConfig` can be built in code (`new`, `quick`, `thorough`) or loaded
//! from TOML:
//!
//! ```toml
//! seed = 42
//! cases = 200
//! max_size = 30
//! max_precondition_retries = 100
//! max_shrink_iters = 4096
//! max_tries = 1
//! report_original = true
//! ```
//!
//! Missing keys fall back to the defaults.

use crate::generator::DEFAULT_MAX_PRECONDITION_RETRIES;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings for one stateful check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Number of sequences to generate and run
    pub cases: u32,
    /// Size budget `n`: upper bound on sequence length
    pub max_size: usize,
    /// Redraws allowed for a single step before generation gives up
    pub max_precondition_retries: u32,
    /// Upper bound on shrink steps after a failure
    pub max_shrink_iters: u32,
    /// Executions per sequence (> 1 to catch nondeterministic failures)
    pub max_tries: u32,
    /// Replay the original (unshrunk) failing sequence for the report
    pub report_original: bool,
}

impl Default for CheckConfig {
    fn default() -> Self {
        CheckConfig {
            seed: 0,
            cases: 100,
            max_size: 30,
            max_precondition_retries: DEFAULT_MAX_PRECONDITION_RETRIES,
            max_shrink_iters: 4096,
            max_tries: 1,
            report_original: true,
        }
    }
}

impl CheckConfig {
    /// Standard configuration with given seed
    pub fn new(seed: u64) -> Self {
        CheckConfig {
            seed,
            ..Default::default()
        }
    }

    /// Few, short sequences. For smoke tests.
    pub fn quick(seed: u64) -> Self {
        CheckConfig {
            seed,
            cases: 20,
            max_size: 10,
            ..Default::default()
        }
    }

    /// Many long sequences, each executed twice.
    pub fn thorough(seed: u64) -> Self {
        CheckConfig {
            seed,
            cases: 1000,
            max_size: 100,
            max_tries: 2,
            ..Default::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: CheckConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cases == 0 {
            return Err(ConfigError::Invalid("cases must be at least 1".into()));
        }
        if self.max_tries == 0 {
            return Err(ConfigError::Invalid("max_tries must be at least 1".into()));
        }
        if self.max_precondition_retries == 0 {
            return Err(ConfigError::Invalid(
                "max_precondition_retries must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// `proptest` runner settings. Failure persistence is disabled: seeds,
    /// not files, are how a failure is reproduced.
    pub fn proptest_config(&self) -> proptest::test_runner::Config {
        proptest::test_runner::Config {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            failure_persistence: None,
            ..proptest::test_runner::Config::default()
        }
    }
}
