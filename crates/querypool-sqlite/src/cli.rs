//! `qpool` command line: submits statements to a pool and reports outcomes.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use parking_lot::Mutex;
use querypool_core::{PoolRegistry, PoolStats, DEFAULT_POOL};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::QpoolConfig;
use crate::connection::SqliteFactory;
use crate::rows::Rows;

/// Command line for `qpool`.
#[derive(Parser, Debug)]
#[command(name = "qpool")]
#[command(about = "Run SQL statements concurrently through a bounded query pool", long_about = None)]
pub struct Cli {
    /// Configuration file (.toml or .json)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Database path; `:memory:` opens a separate database per connection
    #[arg(short, long, env = "QPOOL_DB")]
    pub db: Option<String>,

    /// Maximum statements executing at once
    #[arg(short = 'n', long)]
    pub max_queries: Option<usize>,

    /// Pool to submit to
    #[arg(short, long, default_value = DEFAULT_POOL)]
    pub pool: String,

    /// Statements to run
    #[arg(required = true)]
    pub sql: Vec<String>,
}

/// Outcome of one statement, in completion order.
#[derive(Debug, Clone, Serialize)]
pub struct StatementReport {
    /// Position of the statement on the command line.
    pub index: usize,
    /// Statement text.
    pub sql: String,
    /// Result set, if the statement succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Rows>,
    /// Failure description, if it did not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything a `qpool` run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// One entry per statement, in the order callbacks fired.
    pub results: Vec<StatementReport>,
    /// Driver errors recorded by the pool.
    pub errors: Vec<String>,
    /// Pool counters at the end of the run.
    pub stats: PoolStats,
}

impl RunReport {
    /// True if the pool recorded no driver error.
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

impl Cli {
    /// Merges the config file (if any) with command-line overrides.
    pub fn settings(&self) -> Result<QpoolConfig> {
        let mut config = match &self.config {
            Some(path) => QpoolConfig::from_file(path)?,
            None => QpoolConfig::default(),
        };
        if let Some(db) = &self.db {
            config.sqlite.path = db.clone();
        }
        if let Some(max) = self.max_queries {
            config.pool.max_queries = max;
        }
        config.pool.validate()?;
        Ok(config)
    }

    /// Submits every statement, drives the pool until idle and collects the outcomes.
    pub fn run(&self) -> Result<RunReport> {
        let config = self.settings()?;
        info!(
            "qpool: {} statements, max {} in flight, database {}",
            self.sql.len(),
            config.pool.max_queries,
            config.sqlite.path
        );

        let mut registry = PoolRegistry::new(config.pool, SqliteFactory::new(config.sqlite));
        let pool = registry.get(&self.pool);
        let results = Arc::new(Mutex::new(Vec::with_capacity(self.sql.len())));

        for (index, sql) in self.sql.iter().enumerate() {
            let results = Arc::clone(&results);
            let text = sql.clone();
            let submission = pool.submit_with(sql.as_str(), move |outcome| {
                let (rows, error) = match outcome {
                    Ok(rows) => (Some(rows), None),
                    Err(e) => (None, Some(e.to_string())),
                };
                results.lock().push(StatementReport {
                    index,
                    sql: text,
                    rows,
                    error,
                });
                Ok(())
            });
            debug!("Statement {} submitted: {:?}", index, submission);
        }

        pool.run_until_idle()?;

        let results = std::mem::take(&mut *results.lock());
        Ok(RunReport {
            results,
            errors: pool.errors().to_vec(),
            stats: pool.stats().clone(),
        })
    }
}
