#![warn(missing_docs)]

//! `qpool`: run SQL statements through a bounded query pool.

use anyhow::Result;
use clap::Parser;
use querypool_sqlite::Cli;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let report = cli.run()?;

    for result in &report.results {
        println!("{}", serde_json::to_string(result)?);
    }
    for error in &report.errors {
        eprintln!("error: {}", error);
    }
    eprintln!("stats: {}", serde_json::to_string(&report.stats)?);

    if !report.success() {
        tracing::warn!("{} statements reported driver errors", report.errors.len());
        std::process::exit(1);
    }
    Ok(())
}
