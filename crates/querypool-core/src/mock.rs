//! In-memory mock driver for testing.
//!
//! [`MockDriver`] is both the connection factory and a remote control: tests
//! decide when each executing query settles and how, then drive the pool.
//! All clones share one state, so a clone handed to a pool stays observable.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::driver::{AsyncConnection, ConnectionFactory, Readiness};

/// How a mock query settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBehavior {
    /// Read set, with a result.
    Complete,
    /// Read set, no result, driver error message.
    Fail(String),
    /// Read set, with a result and a driver error message.
    CompleteWithError(String),
    /// Error set with a driver error message.
    Error(String),
    /// Reject set, no message.
    Reject,
    /// Read set with neither result nor error.
    Silent,
}

/// Result set produced by [`MockConnection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockResult {
    /// Query text that produced this result.
    pub query: String,
    /// Mock connection that executed it.
    pub connection: usize,
}

#[derive(Debug, Default)]
struct MockConnState {
    query: Option<String>,
    readiness: Option<Readiness>,
    result: Option<MockResult>,
    error: Option<String>,
    polls_remaining: Option<u32>,
}

impl MockConnState {
    fn apply(&mut self, conn_id: usize, behavior: &MockBehavior) {
        let query = self.query.clone().unwrap_or_default();
        let result = Some(MockResult {
            query,
            connection: conn_id,
        });
        self.polls_remaining = None;
        let (readiness, result, error) = match behavior {
            MockBehavior::Complete => (Readiness::Read, result, None),
            MockBehavior::Fail(msg) => (Readiness::Read, None, Some(msg.clone())),
            MockBehavior::CompleteWithError(msg) => (Readiness::Read, result, Some(msg.clone())),
            MockBehavior::Error(msg) => (Readiness::Error, None, Some(msg.clone())),
            MockBehavior::Reject => (Readiness::Reject, None, None),
            MockBehavior::Silent => (Readiness::Read, None, None),
        };
        self.readiness = Some(readiness);
        self.result = result;
        self.error = error;
    }
}

#[derive(Debug, Default)]
struct MockState {
    conns: Vec<MockConnState>,
    scripts: HashMap<String, MockBehavior>,
    auto_settle_after: Option<u32>,
    sent: Vec<String>,
    poll_timeouts: Vec<Duration>,
}

/// Shared mock driver; clones observe and control the same connections.
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    /// Creates a driver with no connections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Settles the connection currently executing `query`. Returns false if none is.
    pub fn settle(&self, query: &str, behavior: MockBehavior) -> bool {
        let mut state = self.state.lock();
        let found = state
            .conns
            .iter_mut()
            .enumerate()
            .find(|(_, c)| c.query.as_deref() == Some(query) && c.readiness.is_none());
        match found {
            Some((id, conn)) => {
                conn.apply(id, &behavior);
                true
            }
            None => false,
        }
    }

    /// Makes every future query with this exact text settle as soon as it is sent.
    pub fn script(&self, query: &str, behavior: MockBehavior) {
        self.state.lock().scripts.insert(query.to_string(), behavior);
    }

    /// Unscripted queries complete after this many polls (0 = on send). `None` disables.
    pub fn set_auto_settle_after(&self, polls: Option<u32>) {
        self.state.lock().auto_settle_after = polls;
    }

    /// Number of connections opened.
    pub fn connects(&self) -> usize {
        self.state.lock().conns.len()
    }

    /// Every query sent, in send order.
    pub fn sent(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    /// Number of poll calls.
    pub fn poll_calls(&self) -> usize {
        self.state.lock().poll_timeouts.len()
    }

    /// Timeout of each poll call, in call order.
    pub fn poll_timeouts(&self) -> Vec<Duration> {
        self.state.lock().poll_timeouts.clone()
    }
}

impl ConnectionFactory for MockDriver {
    type Connection = MockConnection;

    fn connect(&mut self) -> MockConnection {
        let mut state = self.state.lock();
        let id = state.conns.len();
        state.conns.push(MockConnState::default());
        debug!("Mock connect: connection {}", id);
        MockConnection {
            id,
            state: Arc::clone(&self.state),
        }
    }
}

/// Connection handed out by [`MockDriver`].
#[derive(Debug)]
pub struct MockConnection {
    id: usize,
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    /// Index of this connection in the driver.
    pub fn id(&self) -> usize {
        self.id
    }
}

impl AsyncConnection for MockConnection {
    type ResultSet = MockResult;

    fn send_query(&mut self, query: &str) {
        let mut state = self.state.lock();
        state.sent.push(query.to_string());
        let script = state.scripts.get(query).cloned();
        let auto = state.auto_settle_after;

        let conn = &mut state.conns[self.id];
        *conn = MockConnState {
            query: Some(query.to_string()),
            ..MockConnState::default()
        };
        match (script, auto) {
            (Some(behavior), _) => conn.apply(self.id, &behavior),
            (None, Some(0)) => conn.apply(self.id, &MockBehavior::Complete),
            (None, Some(n)) => conn.polls_remaining = Some(n),
            (None, None) => {}
        }
    }

    fn poll(watched: &[&Self], timeout: Duration) -> Vec<Readiness> {
        let Some(first) = watched.first() else {
            return Vec::new();
        };
        let mut state = first.state.lock();
        state.poll_timeouts.push(timeout);

        watched
            .iter()
            .map(|c| {
                let conn = &mut state.conns[c.id];
                if conn.readiness.is_none() {
                    if let Some(remaining) = conn.polls_remaining {
                        let remaining = remaining.saturating_sub(1);
                        conn.polls_remaining = Some(remaining);
                        if remaining == 0 {
                            conn.apply(c.id, &MockBehavior::Complete);
                        }
                    }
                }
                conn.readiness.unwrap_or(Readiness::Pending)
            })
            .collect()
    }

    fn reap(&mut self) -> Option<MockResult> {
        self.state.lock().conns[self.id].result.take()
    }

    fn last_error(&self) -> Option<String> {
        self.state.lock().conns[self.id].error.clone()
    }
}
