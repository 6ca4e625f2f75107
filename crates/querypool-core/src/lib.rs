#![warn(missing_docs)]

//! querypool core: bounded dispatcher for non-blocking database queries
//!
//! A [`QueryPool`] caps the number of queries executing at once, queues the
//! overflow in FIFO order, and runs completion passes that poll the driver,
//! invoke per-query callbacks, and recycle connections. Pools are looked up by
//! name through a [`PoolRegistry`] (single control thread) or a
//! [`SharedPoolRegistry`] (one lock per pool).

pub mod cadence;
pub mod config;
pub mod driver;
pub mod error;
pub mod mock;
pub mod pool;
pub mod registry;
pub mod stats;

pub use cadence::{Backoff, Fixed, Immediate, PollCadence};
pub use config::{CadenceConfig, PoolConfig, DEFAULT_MAX_QUERIES};
pub use driver::{AsyncConnection, ConnId, ConnectionFactory, Readiness, RequestId};
pub use error::{CallbackError, PoolError, QueryError, Result};
pub use mock::{MockBehavior, MockConnection, MockDriver, MockResult};
pub use pool::{Callback, QueryOutcome, QueryPool, ResultSetOf, Submission};
pub use registry::{PoolRegistry, SharedPool, SharedPoolRegistry, DEFAULT_POOL};
pub use stats::PoolStats;
