//! Driver abstraction consumed by the pool.
//!
//! The pool never talks to a database directly. It drives connections through the
//! [`AsyncConnection`] trait (non-blocking send, readiness poll, reap, error query)
//! and obtains new ones from a [`ConnectionFactory`]. Real drivers and the
//! in-memory [`crate::mock`] driver implement the same traits.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Identifier assigned to each dispatched query; unique within one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable index of a connection inside a pool's connection arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnId(pub usize);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Readiness of a watched connection after one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Readiness {
    /// Still executing; poll again later.
    Pending,
    /// Finished; a result may be reaped.
    Read,
    /// Connection reported an error.
    Error,
    /// Driver refused to track the query.
    Reject,
}

impl Readiness {
    /// Returns true for every terminal state (read, error, reject).
    #[inline]
    pub fn is_settled(&self) -> bool {
        !matches!(self, Readiness::Pending)
    }
}

/// A database connection that can execute one query at a time without blocking.
pub trait AsyncConnection {
    /// Opaque result produced by a successful query.
    type ResultSet;

    /// Begin executing `query`. Must not block waiting for the result.
    fn send_query(&mut self, query: &str);

    /// Wait up to `timeout` for any of `watched` to settle.
    ///
    /// Returns one [`Readiness`] per watched connection, in the same order. This is
    /// the only call in the pool allowed to block.
    fn poll(watched: &[&Self], timeout: Duration) -> Vec<Readiness>
    where
        Self: Sized;

    /// Take the result of the settled query, if the driver has one.
    fn reap(&mut self) -> Option<Self::ResultSet>;

    /// Last error reported on this connection, if any.
    fn last_error(&self) -> Option<String>;
}

/// Produces ready-to-use connections for a pool.
///
/// The pool never handles connection failures. A factory that cannot connect
/// either aborts or returns a connection whose queries settle with an error.
pub trait ConnectionFactory {
    /// The connection type this factory produces.
    type Connection: AsyncConnection;

    /// Open a new connection.
    fn connect(&mut self) -> Self::Connection;
}

impl<F, C> ConnectionFactory for F
where
    F: FnMut() -> C,
    C: AsyncConnection,
{
    type Connection = C;

    fn connect(&mut self) -> C {
        self()
    }
}
