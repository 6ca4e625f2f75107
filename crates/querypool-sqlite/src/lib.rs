#![warn(missing_docs)]

//! querypool SQLite driver
//!
//! [`SqliteConnection`] gives SQLite the non-blocking send/poll/reap contract
//! the pool expects by running each connection on its own worker thread.
//! [`SqliteFactory`] plugs it into a `querypool_core::QueryPool`, and the
//! `qpool` binary drives a pool from the command line.

pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod rows;

pub use cli::{Cli, RunReport, StatementReport};
pub use config::{QpoolConfig, SqliteConfig};
pub use connection::{open_database, SqliteConnection, SqliteFactory};
pub use error::{Result, SqliteError};
pub use rows::{Rows, Value};
