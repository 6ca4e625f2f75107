//! SQLite driver and `qpool` configuration

use std::path::Path;

use anyhow::{bail, Context};
use querypool_core::{CadenceConfig, PoolConfig};
use serde::{Deserialize, Serialize};

/// How each SQLite connection is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database path or `file:` URI. `:memory:` gives every connection its own database.
    pub path: String,
    /// How long a statement waits on a locked database before failing.
    pub busy_timeout_ms: u64,
    /// Statements executed once on every new connection.
    pub pragmas: Vec<String>,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            busy_timeout_ms: 5000,
            pragmas: vec![
                "PRAGMA journal_mode = WAL".to_string(),
                "PRAGMA synchronous = NORMAL".to_string(),
                "PRAGMA foreign_keys = ON".to_string(),
            ],
        }
    }
}

impl SqliteConfig {
    /// Config for a database at `path` with the default pragmas.
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

/// Combined configuration file read by `qpool`.
///
/// ```toml
/// [pool]
/// max_queries = 4
///
/// [pool.cadence]
/// kind = "backoff"
/// initial_ms = 1
/// max_ms = 50
/// multiplier = 2.0
///
/// [sqlite]
/// path = "/var/lib/app/data.db"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QpoolConfig {
    /// Pool settings.
    pub pool: PoolConfig,
    /// Connection settings.
    pub sqlite: SqliteConfig,
}

impl Default for QpoolConfig {
    /// Worker threads settle in the background, so the pool backs off
    /// instead of re-polling with a zero timeout.
    fn default() -> Self {
        Self {
            pool: PoolConfig::default().with_cadence(CadenceConfig::Backoff {
                initial_ms: 1,
                max_ms: 50,
                multiplier: 2.0,
            }),
            sqlite: SqliteConfig::default(),
        }
    }
}

impl QpoolConfig {
    /// Loads `.toml` or `.json` and validates the pool section.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_lowercase();

        let config: QpoolConfig = match ext.as_str() {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("parsing {}", path.display()))?,
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("parsing {}", path.display()))?,
            other => bail!("unsupported config file extension: {:?}", other),
        };

        config.pool.validate()?;
        Ok(config)
    }
}
