//! Configuration for the test harness.
//!
//! Values come from an optional TOML file and environment overrides:
//!
//! | Variable | Field |
//! |---|---|
//! | `TSK_HARNESS_CONFIG` | path of the TOML file |
//! | `TSK_TEST_SEED` | `seed.replay` |
//! | `TSK_EXPECTATION_TIMEOUT_MS` | `expectations.default_timeout_ms` |
//! | `TSK_LOG` | `logging.filter` |

use crate::error::{HarnessError, Result};
use crate::seed::TestSeed;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "TSK_HARNESS_CONFIG";
/// Environment variable forcing the first seed of each test.
pub const SEED_ENV: &str = "TSK_TEST_SEED";
/// Environment variable overriding the expectation timeout.
pub const TIMEOUT_ENV: &str = "TSK_EXPECTATION_TIMEOUT_MS";
/// Environment variable overriding the log filter.
pub const LOG_ENV: &str = "TSK_LOG";

/// Complete harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct HarnessConfig {
    /// Seed handling.
    #[serde(default)]
    pub seed: SeedConfig,

    /// Expectation waiting.
    #[serde(default)]
    pub expectations: ExpectationConfig,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl HarnessConfig {
    /// Load configuration from a TOML file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)
                .map_err(|e| HarnessError::Config(format!("failed to read config: {}", e)))?;
            Self::parse(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| HarnessError::Config(format!("failed to parse config: {}", e)))
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| HarnessError::Config(format!("failed to serialize config: {}", e)))?;
        fs::write(path, content)
            .map_err(|e| HarnessError::Config(format!("failed to write config: {}", e)))?;
        Ok(())
    }

    /// Defaults overlaid with environment overrides.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// The file named by `TSK_HARNESS_CONFIG` (if any) overlaid with environment overrides.
    pub fn discover() -> Result<Self> {
        let base = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides fetched through `lookup`, which maps a variable name to its value.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(SEED_ENV) {
            self.seed.replay = Some(raw.parse::<TestSeed>()?.value());
        }
        if let Some(raw) = lookup(TIMEOUT_ENV) {
            self.expectations.default_timeout_ms = raw.trim().parse().map_err(|_| {
                HarnessError::Config(format!("{} must be milliseconds, got {:?}", TIMEOUT_ENV, raw))
            })?;
        }
        if let Some(filter) = lookup(LOG_ENV) {
            self.logging.filter = filter;
        }
        Ok(self)
    }

    /// The replay seed, if one is configured.
    pub fn replay_seed(&self) -> Option<TestSeed> {
        self.seed.replay.map(TestSeed::new)
    }
}

/// Seed handling.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SeedConfig {
    /// Forces the first seed of every test case, for replaying a logged failure.
    pub replay: Option<u64>,
}

/// Expectation waiting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExpectationConfig {
    /// Deadline used by `wait_for_expectations_default` (default: 5000).
    pub default_timeout_ms: u64,
}

impl Default for ExpectationConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 5_000,
        }
    }
}

impl ExpectationConfig {
    /// Returns the default timeout as a Duration.
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

/// Log output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset (default: "info").
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}
