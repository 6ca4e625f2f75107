//! Pool configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PoolError, Result};

/// Default number of simultaneously executing queries per pool.
pub const DEFAULT_MAX_QUERIES: usize = 10;

/// How `run_until_idle` paces successive completion passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CadenceConfig {
    /// Re-poll immediately with a zero timeout.
    Immediate,
    /// Block every pass for a fixed timeout.
    Fixed {
        /// Poll timeout in milliseconds.
        timeout_ms: u64,
    },
    /// Grow the poll timeout after passes that settle nothing.
    Backoff {
        /// Timeout after the first empty pass.
        initial_ms: u64,
        /// Upper bound on the timeout.
        max_ms: u64,
        /// Growth factor per consecutive empty pass.
        multiplier: f64,
    },
}

impl Default for CadenceConfig {
    fn default() -> Self {
        CadenceConfig::Immediate
    }
}

/// Configuration for a query pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum in-flight queries (and therefore open connections).
    pub max_queries: usize,
    /// Timeout used by `drain_ready_default`, in milliseconds.
    pub poll_timeout_ms: u64,
    /// Pacing strategy for `run_until_idle`.
    pub cadence: CadenceConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_queries: DEFAULT_MAX_QUERIES,
            poll_timeout_ms: 0,
            cadence: CadenceConfig::Immediate,
        }
    }
}

impl PoolConfig {
    /// Creates a config with the given capacity and default pacing.
    pub fn new(max_queries: usize) -> Self {
        Self {
            max_queries,
            ..Self::default()
        }
    }

    /// Sets the pacing strategy.
    pub fn with_cadence(mut self, cadence: CadenceConfig) -> Self {
        self.cadence = cadence;
        self
    }

    /// Sets the default completion-pass timeout.
    pub fn with_poll_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.poll_timeout_ms = timeout_ms;
        self
    }

    /// Loads a config from a `.toml` or `.json` file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: PoolConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents).map_err(|e| PoolError::Parse {
                reason: e.to_string(),
            })?,
            "json" => serde_json::from_str(&contents).map_err(|e| PoolError::Parse {
                reason: e.to_string(),
            })?,
            _ => {
                return Err(PoolError::Config {
                    reason: format!("unsupported config file extension: {:?}", ext),
                })
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks that the values make sense together.
    pub fn validate(&self) -> Result<()> {
        if self.max_queries == 0 {
            return Err(PoolError::Config {
                reason: "max_queries must be at least 1".to_string(),
            });
        }
        if let CadenceConfig::Backoff {
            initial_ms,
            max_ms,
            multiplier,
        } = self.cadence
        {
            if initial_ms > max_ms {
                return Err(PoolError::Config {
                    reason: format!("backoff initial_ms ({}) > max_ms ({})", initial_ms, max_ms),
                });
            }
            if multiplier.is_nan() || multiplier < 1.0 {
                return Err(PoolError::Config {
                    reason: format!("backoff multiplier must be >= 1.0, got {}", multiplier),
                });
            }
        }
        Ok(())
    }
}
