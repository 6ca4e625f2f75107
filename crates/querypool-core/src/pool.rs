//! Bounded query dispatcher over non-blocking driver connections.
//!
//! A [`QueryPool`] admits at most `max_queries` concurrent queries. Excess
//! submissions wait in a FIFO queue. Nothing progresses on its own: the caller
//! drives completion passes with [`QueryPool::drain_ready`] (one non-blocking
//! tick) or [`QueryPool::run_until_idle`] (until every submitted query settled).

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cadence::{self, PollCadence};
use crate::config::PoolConfig;
use crate::driver::{AsyncConnection, ConnId, ConnectionFactory, Readiness, RequestId};
use crate::error::{CallbackError, PoolError, QueryError, Result};
use crate::stats::PoolStats;

/// Result set type produced by the connections of factory `F`.
pub type ResultSetOf<F> = <<F as ConnectionFactory>::Connection as AsyncConnection>::ResultSet;

/// Outcome delivered to a query callback.
pub type QueryOutcome<R> = std::result::Result<R, QueryError>;

/// Per-query completion callback. An `Err` return is propagated out of the completion pass.
pub type Callback<R> =
    Box<dyn FnOnce(QueryOutcome<R>) -> std::result::Result<(), CallbackError> + Send + 'static>;

/// What `submit` did with a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Sent to a connection under this request id.
    Dispatched(RequestId),
    /// Capacity exhausted; waiting at this index of the pending queue.
    Queued {
        /// Zero-based position in the pending queue.
        position: usize,
    },
}

impl Submission {
    /// Request id, if the query was dispatched immediately.
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Submission::Dispatched(id) => Some(*id),
            Submission::Queued { .. } => None,
        }
    }

    /// Returns true if the query went to the pending queue.
    pub fn is_queued(&self) -> bool {
        matches!(self, Submission::Queued { .. })
    }
}

struct PendingQuery<R> {
    query: String,
    callback: Option<Callback<R>>,
}

/// Side-table entry for a connection that is executing a query.
struct Dispatch<R> {
    conn: ConnId,
    callback: Option<Callback<R>>,
}

/// A settled query whose callback has not run yet.
struct Completion<R> {
    request_id: RequestId,
    callback: Callback<R>,
    outcome: QueryOutcome<R>,
}

/// A named pool of non-blocking connections with admission control.
pub struct QueryPool<F: ConnectionFactory> {
    name: String,
    config: PoolConfig,
    factory: F,
    /// Every connection ever opened, indexed by `ConnId`.
    connections: Vec<F::Connection>,
    /// Idle connections; reused most-recently-freed first.
    free: Vec<ConnId>,
    /// Executing queries keyed by request id, so iteration is submission order.
    in_flight: BTreeMap<RequestId, Dispatch<ResultSetOf<F>>>,
    pending: VecDeque<PendingQuery<ResultSetOf<F>>>,
    completed: VecDeque<Completion<ResultSetOf<F>>>,
    errors: Vec<String>,
    next_request_id: u64,
    stats: PoolStats,
}

impl<F: ConnectionFactory> QueryPool<F> {
    /// Creates an empty pool. No connection is opened until the first submission.
    pub fn new(name: impl Into<String>, config: PoolConfig, factory: F) -> Self {
        let name = name.into();
        let mut config = config;
        if config.max_queries == 0 {
            warn!("Pool {}: max_queries of 0 raised to 1", name);
            config.max_queries = 1;
        }
        info!("Created query pool {} (max_queries={})", name, config.max_queries);
        Self {
            name,
            config,
            factory,
            connections: Vec::new(),
            free: Vec::new(),
            in_flight: BTreeMap::new(),
            pending: VecDeque::new(),
            completed: VecDeque::new(),
            errors: Vec::new(),
            next_request_id: 0,
            stats: PoolStats::default(),
        }
    }

    /// Submits a query, dispatching it now if capacity allows and queueing it otherwise.
    pub fn submit(
        &mut self,
        query: impl Into<String>,
        callback: Option<Callback<ResultSetOf<F>>>,
    ) -> Submission {
        let query = query.into();
        match self.acquire_connection() {
            Some(conn) => {
                self.stats.record_submit(false);
                Submission::Dispatched(self.dispatch(conn, query, callback))
            }
            None => {
                self.pending.push_back(PendingQuery { query, callback });
                self.stats.record_submit(true);
                let position = self.pending.len() - 1;
                debug!("Pool {} saturated, queued query at position {}", self.name, position);
                Submission::Queued { position }
            }
        }
    }

    /// Submits a query with a callback closure.
    pub fn submit_with<C>(&mut self, query: impl Into<String>, callback: C) -> Submission
    where
        C: FnOnce(QueryOutcome<ResultSetOf<F>>) -> std::result::Result<(), CallbackError>
            + Send
            + 'static,
    {
        self.submit(query, Some(Box::new(callback)))
    }

    /// Runs one completion pass, blocking at most `timeout` in the driver poll.
    ///
    /// Settled connections are reaped, their driver errors recorded and the
    /// connections recycled. Callbacks then run in submission order, and only
    /// after that are queued queries admitted into the freed capacity. Returns
    /// the number of queries that settled in this pass.
    ///
    /// If a callback fails, its error is returned at once. The pool stays
    /// consistent: callbacks not yet run and queued queries are both picked up
    /// by the next pass.
    pub fn drain_ready(&mut self, timeout: Duration) -> Result<usize> {
        let settled = self.collect_settled(timeout);
        let count = settled.len();

        for (request_id, readiness) in settled {
            self.settle(request_id, readiness);
        }

        self.stats.record_pass(count);
        self.deliver_completed()?;
        self.admit_pending();
        Ok(count)
    }

    /// Runs one completion pass with the configured `poll_timeout_ms`.
    pub fn drain_ready_default(&mut self) -> Result<usize> {
        self.drain_ready(Duration::from_millis(self.config.poll_timeout_ms))
    }

    /// Drives completion passes until no query is executing, queued, or awaiting its callback.
    ///
    /// Pass timeouts follow the configured cadence.
    pub fn run_until_idle(&mut self) -> Result<()> {
        let mut cadence = cadence::from_config(&self.config.cadence);
        self.run_until_idle_with(cadence.as_mut())
    }

    /// Like [`run_until_idle`](Self::run_until_idle) with an explicit cadence.
    pub fn run_until_idle_with(&mut self, cadence: &mut dyn PollCadence) -> Result<()> {
        while !self.is_idle() {
            let timeout = cadence.next_timeout();
            let settled = self.drain_ready(timeout)?;
            cadence.on_pass(settled);
        }
        debug!("Pool {} idle after {} passes", self.name, self.stats.passes);
        Ok(())
    }

    /// Every driver error recorded over the pool's lifetime, oldest first.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Returns true when nothing is executing, queued, or awaiting its callback.
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty() && self.pending.is_empty() && self.completed.is_empty()
    }

    /// Pool identifier.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Lifetime counters.
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    /// Number of executing queries.
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Number of queued queries.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of idle connections.
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    /// Number of connections opened so far.
    pub fn connections_created(&self) -> usize {
        self.connections.len()
    }

    /// Ids of executing queries in submission order.
    pub fn in_flight_ids(&self) -> Vec<RequestId> {
        self.in_flight.keys().copied().collect()
    }

    /// Connections currently executing a query, in submission order.
    pub fn in_flight_connections(&self) -> Vec<ConnId> {
        self.in_flight.values().map(|d| d.conn).collect()
    }

    /// Idle connections; the last one is reused first.
    pub fn free_connections(&self) -> &[ConnId] {
        &self.free
    }

    /// Queries waiting for capacity, oldest first.
    pub fn pending_queries(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(|p| p.query.as_str())
    }

    /// Borrow a connection by id.
    pub fn connection(&self, id: ConnId) -> Option<&F::Connection> {
        self.connections.get(id.0)
    }

    fn acquire_connection(&mut self) -> Option<ConnId> {
        if let Some(id) = self.free.pop() {
            return Some(id);
        }
        if self.in_flight.len() >= self.config.max_queries {
            return None;
        }

        let conn = self.factory.connect();
        let id = ConnId(self.connections.len());
        self.connections.push(conn);
        self.stats.connections_created += 1;
        debug!("Pool {} opened connection {}", self.name, id);
        Some(id)
    }

    fn dispatch(
        &mut self,
        conn: ConnId,
        query: String,
        callback: Option<Callback<ResultSetOf<F>>>,
    ) -> RequestId {
        let request_id = RequestId(self.next_request_id);
        self.in_flight.insert(request_id, Dispatch { conn, callback });
        self.connections[conn.0].send_query(&query);
        self.next_request_id += 1;
        self.stats.record_dispatch();
        debug!(
            "Pool {} dispatched request {} on {}: {}",
            self.name, request_id, conn, query
        );
        request_id
    }

    fn admit_pending(&mut self) {
        while !self.pending.is_empty() {
            let Some(conn) = self.acquire_connection() else {
                break;
            };
            match self.pending.pop_front() {
                Some(next) => {
                    self.dispatch(conn, next.query, next.callback);
                }
                None => {
                    self.free.push(conn);
                    break;
                }
            }
        }
    }

    /// Polls every executing connection once; returns the settled ones in request-id order.
    fn collect_settled(&self, timeout: Duration) -> Vec<(RequestId, Readiness)> {
        if self.in_flight.is_empty() {
            return Vec::new();
        }

        let order: Vec<RequestId> = self.in_flight.keys().copied().collect();
        let watched: Vec<&F::Connection> = self
            .in_flight
            .values()
            .map(|d| &self.connections[d.conn.0])
            .collect();

        let readiness = <F::Connection as AsyncConnection>::poll(&watched, timeout);
        if readiness.len() != watched.len() {
            warn!(
                "Pool {}: driver returned {} readiness entries for {} connections",
                self.name,
                readiness.len(),
                watched.len()
            );
        }

        order
            .into_iter()
            .zip(readiness)
            .filter(|(_, r)| r.is_settled())
            .collect()
    }

    fn settle(&mut self, request_id: RequestId, readiness: Readiness) {
        let Some(dispatch) = self.in_flight.remove(&request_id) else {
            return;
        };

        let conn = &mut self.connections[dispatch.conn.0];
        let result = match readiness {
            Readiness::Read => conn.reap(),
            _ => None,
        };
        let error = conn.last_error();

        if let Some(message) = &error {
            warn!(
                "Pool {} request {} driver error: {}",
                self.name, request_id, message
            );
            self.errors.push(message.clone());
        }

        let outcome = match (result, readiness) {
            (Some(set), _) => Ok(set),
            (None, Readiness::Reject) => Err(QueryError::Rejected { message: error }),
            (None, _) => match error {
                Some(message) => Err(QueryError::Driver { message }),
                None => Err(QueryError::NoResult),
            },
        };
        self.stats.record_settled(outcome.is_ok());

        self.free.push(dispatch.conn);
        debug!(
            "Pool {} request {} settled ({:?}), recycled {}",
            self.name, request_id, readiness, dispatch.conn
        );

        if let Some(callback) = dispatch.callback {
            self.completed.push_back(Completion {
                request_id,
                callback,
                outcome,
            });
        }
    }

    fn deliver_completed(&mut self) -> Result<()> {
        while let Some(completion) = self.completed.pop_front() {
            let Completion {
                request_id,
                callback,
                outcome,
            } = completion;
            if let Err(source) = callback(outcome) {
                self.stats.callback_errors += 1;
                warn!(
                    "Pool {} callback for request {} failed: {}",
                    self.name, request_id, source
                );
                return Err(PoolError::Callback { request_id, source });
            }
        }
        Ok(())
    }
}

impl<F: ConnectionFactory> fmt::Debug for QueryPool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryPool")
            .field("name", &self.name)
            .field("max_queries", &self.config.max_queries)
            .field("connections", &self.connections.len())
            .field("free", &self.free)
            .field("in_flight", &self.in_flight.len())
            .field("pending", &self.pending.len())
            .field("errors", &self.errors.len())
            .field("next_request_id", &self.next_request_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBehavior, MockDriver, MockResult};
    use std::sync::Arc;

    use parking_lot::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn make_pool(max: usize) -> (QueryPool<MockDriver>, MockDriver) {
        let driver = MockDriver::new();
        let pool = QueryPool::new("test", PoolConfig::new(max), driver.clone());
        (pool, driver)
    }

    fn recorder(log: &Log, tag: &str) -> Callback<MockResult> {
        let log = Arc::clone(log);
        let tag = tag.to_string();
        Box::new(move |outcome| {
            let entry = match outcome {
                Ok(result) => format!("{}:ok:{}", tag, result.query),
                Err(e) => format!("{}:err:{}", tag, e),
            };
            log.lock().push(entry);
            Ok(())
        })
    }

    #[test]
    fn test_end_to_end_three_queries_two_slots() {
        let (mut pool, driver) = make_pool(2);
        let log: Log = Arc::default();

        let s1 = pool.submit("Q1", Some(recorder(&log, "C1")));
        let s2 = pool.submit("Q2", Some(recorder(&log, "C2")));
        let s3 = pool.submit("Q3", Some(recorder(&log, "C3")));

        assert_eq!(s1, Submission::Dispatched(RequestId(0)));
        assert_eq!(s2, Submission::Dispatched(RequestId(1)));
        assert_eq!(s3, Submission::Queued { position: 0 });
        assert_eq!(driver.connects(), 2);
        assert_eq!(pool.in_flight_len(), 2);
        assert_eq!(pool.pending_len(), 1);

        driver.settle("Q1", MockBehavior::Complete);
        assert_eq!(pool.drain_ready(Duration::ZERO).unwrap(), 1);
        assert_eq!(*log.lock(), vec!["C1:ok:Q1".to_string()]);
        assert_eq!(pool.pending_len(), 0);
        assert_eq!(pool.in_flight_ids(), vec![RequestId(1), RequestId(2)]);
        // Q3 reuses the connection Q1 ran on
        assert_eq!(pool.in_flight_connections(), vec![ConnId(1), ConnId(0)]);
        assert_eq!(driver.connects(), 2);

        driver.settle("Q3", MockBehavior::Complete);
        driver.settle("Q2", MockBehavior::Complete);
        assert_eq!(pool.drain_ready(Duration::ZERO).unwrap(), 2);
        assert_eq!(
            *log.lock(),
            vec![
                "C1:ok:Q1".to_string(),
                "C2:ok:Q2".to_string(),
                "C3:ok:Q3".to_string()
            ]
        );

        assert_eq!(pool.in_flight_len(), 0);
        assert_eq!(pool.pending_len(), 0);
        assert_eq!(pool.free_len(), 2);
        assert_eq!(driver.connects(), 2);
        assert!(pool.is_idle());
    }

    #[test]
    fn test_fifo_admission_one_settle_per_pass() {
        let (mut pool, driver) = make_pool(2);
        let log: Log = Arc::default();
        let queries: Vec<String> = (0..6).map(|i| format!("SELECT {}", i)).collect();

        for q in &queries {
            pool.submit(q.clone(), Some(recorder(&log, "cb")));
        }
        assert_eq!(pool.pending_len(), 4);

        for q in &queries {
            driver.settle(q, MockBehavior::Complete);
            assert_eq!(pool.drain_ready(Duration::ZERO).unwrap(), 1);
        }

        let expected: Vec<String> = queries.iter().map(|q| format!("cb:ok:{}", q)).collect();
        assert_eq!(*log.lock(), expected);
        assert_eq!(driver.sent(), queries);
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let (mut pool, _driver) = make_pool(3);
        for i in 0..20 {
            pool.submit(format!("q{}", i), None);
            assert!(pool.in_flight_len() <= 3);
        }
        assert_eq!(pool.in_flight_len(), 3);
        assert_eq!(pool.pending_len(), 17);
        assert_eq!(pool.connections_created(), 3);
    }

    #[test]
    fn test_recycling_does_not_open_new_connections() {
        let (mut pool, driver) = make_pool(2);
        driver.set_auto_settle_after(Some(0));

        for i in 0..50 {
            pool.submit(format!("q{}", i), None);
            pool.drain_ready(Duration::ZERO).unwrap();
        }
        assert_eq!(driver.connects(), 1);
        assert_eq!(pool.stats().completed, 50);
    }

    #[test]
    fn test_free_list_is_lifo() {
        let (mut pool, driver) = make_pool(3);
        pool.submit("a", None);
        pool.submit("b", None);
        pool.submit("c", None);

        driver.settle("a", MockBehavior::Complete);
        driver.settle("b", MockBehavior::Complete);
        pool.drain_ready(Duration::ZERO).unwrap();
        assert_eq!(pool.free_connections(), &[ConnId(0), ConnId(1)]);

        let next = pool.submit("d", None);
        assert_eq!(next, Submission::Dispatched(RequestId(3)));
        assert_eq!(pool.in_flight_connections(), vec![ConnId(2), ConnId(1)]);
    }

    #[test]
    fn test_driver_error_recorded_and_delivered() {
        let (mut pool, driver) = make_pool(2);
        let log: Log = Arc::default();

        pool.submit("SELECT * FROM missing", Some(recorder(&log, "c")));
        driver.settle(
            "SELECT * FROM missing",
            MockBehavior::Fail("no such table: missing".to_string()),
        );
        pool.drain_ready(Duration::ZERO).unwrap();

        assert_eq!(pool.errors(), &["no such table: missing".to_string()]);
        assert_eq!(
            *log.lock(),
            vec!["c:err:driver error: no such table: missing".to_string()]
        );
        assert_eq!(pool.stats().failed, 1);
        assert_eq!(pool.free_len(), 1);
    }

    #[test]
    fn test_error_with_result_still_passes_result() {
        let (mut pool, driver) = make_pool(1);
        let log: Log = Arc::default();

        pool.submit("UPDATE t SET x = 1", Some(recorder(&log, "c")));
        driver.settle(
            "UPDATE t SET x = 1",
            MockBehavior::CompleteWithError("1 warning".to_string()),
        );
        pool.drain_ready(Duration::ZERO).unwrap();

        assert_eq!(pool.errors(), &["1 warning".to_string()]);
        assert_eq!(*log.lock(), vec!["c:ok:UPDATE t SET x = 1".to_string()]);
    }

    #[test]
    fn test_reject_and_error_sets_deliver_err() {
        let (mut pool, driver) = make_pool(3);
        let log: Log = Arc::default();

        pool.submit("r", Some(recorder(&log, "r")));
        pool.submit("e", Some(recorder(&log, "e")));
        pool.submit("n", Some(recorder(&log, "n")));
        driver.settle("r", MockBehavior::Reject);
        driver.settle("e", MockBehavior::Error("server has gone away".to_string()));
        driver.settle("n", MockBehavior::Silent);
        pool.drain_ready(Duration::ZERO).unwrap();

        assert_eq!(
            *log.lock(),
            vec![
                "r:err:query rejected by driver".to_string(),
                "e:err:driver error: server has gone away".to_string(),
                "n:err:query settled without a result".to_string(),
            ]
        );
        assert_eq!(pool.errors(), &["server has gone away".to_string()]);
        assert_eq!(pool.free_len(), 3);
    }

    #[test]
    fn test_errors_accumulate_and_are_never_cleared() {
        let (mut pool, driver) = make_pool(1);
        driver.script("bad1", MockBehavior::Fail("e1".to_string()));
        driver.script("bad2", MockBehavior::Fail("e2".to_string()));
        driver.script("good", MockBehavior::Complete);

        pool.submit("bad1", None);
        pool.submit("good", None);
        pool.submit("bad2", None);
        pool.run_until_idle().unwrap();

        assert_eq!(pool.errors(), &["e1".to_string(), "e2".to_string()]);
    }

    #[test]
    fn test_callback_error_propagates_without_losing_others() {
        let (mut pool, driver) = make_pool(3);
        let log: Log = Arc::default();

        pool.submit("a", Some(recorder(&log, "a")));
        pool.submit_with("b", |_| Err("callback exploded".into()));
        pool.submit("c", Some(recorder(&log, "c")));
        driver.settle("a", MockBehavior::Complete);
        driver.settle("b", MockBehavior::Complete);
        driver.settle("c", MockBehavior::Complete);

        let err = pool.drain_ready(Duration::ZERO).unwrap_err();
        match err {
            PoolError::Callback { request_id, source } => {
                assert_eq!(request_id, RequestId(1));
                assert_eq!(source.to_string(), "callback exploded");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        // Bookkeeping already done for all three
        assert_eq!(pool.in_flight_len(), 0);
        assert_eq!(pool.free_len(), 3);
        assert_eq!(*log.lock(), vec!["a:ok:a".to_string()]);
        assert!(!pool.is_idle());

        assert_eq!(pool.drain_ready(Duration::ZERO).unwrap(), 0);
        assert_eq!(*log.lock(), vec!["a:ok:a".to_string(), "c:ok:c".to_string()]);
        assert!(pool.is_idle());
        assert_eq!(pool.stats().callback_errors, 1);
    }

    #[test]
    fn test_callbacks_run_before_queued_queries_are_sent() {
        let (mut pool, driver) = make_pool(2);
        let seen: Arc<Mutex<Vec<String>>> = Arc::default();

        let observer = driver.clone();
        let sent_in_c1 = Arc::clone(&seen);
        pool.submit_with("Q1", move |_| {
            *sent_in_c1.lock() = observer.sent();
            Ok(())
        });
        pool.submit("Q2", None);
        pool.submit("Q3", None);

        driver.settle("Q1", MockBehavior::Complete);
        assert_eq!(pool.drain_ready(Duration::ZERO).unwrap(), 1);

        assert_eq!(*seen.lock(), vec!["Q1".to_string(), "Q2".to_string()]);
        assert_eq!(driver.sent(), vec!["Q1", "Q2", "Q3"]);
        assert_eq!(pool.pending_len(), 0);
    }

    #[test]
    fn test_failed_callback_leaves_queue_for_next_pass() {
        let (mut pool, driver) = make_pool(1);
        let log: Log = Arc::default();

        pool.submit_with("a", |_| Err("callback exploded".into()));
        pool.submit("b", Some(recorder(&log, "b")));
        driver.settle("a", MockBehavior::Complete);

        assert!(pool.drain_ready(Duration::ZERO).is_err());
        assert_eq!(pool.in_flight_len(), 0);
        assert_eq!(pool.pending_len(), 1);
        assert_eq!(driver.sent(), vec!["a"]);
        assert!(!pool.is_idle());

        assert_eq!(pool.drain_ready(Duration::ZERO).unwrap(), 0);
        assert_eq!(pool.pending_len(), 0);
        assert_eq!(driver.sent(), vec!["a", "b"]);

        driver.settle("b", MockBehavior::Complete);
        pool.run_until_idle().unwrap();
        assert_eq!(*log.lock(), vec!["b:ok:b".to_string()]);
        assert_eq!(driver.connects(), 1);
    }

    #[test]
    fn test_run_until_idle_drains_queue() {
        let (mut pool, driver) = make_pool(2);
        driver.set_auto_settle_after(Some(3));
        let log: Log = Arc::default();

        for i in 0..7 {
            pool.submit(format!("q{}", i), Some(recorder(&log, "cb")));
        }
        pool.run_until_idle().unwrap();

        assert_eq!(log.lock().len(), 7);
        assert!(pool.is_idle());
        assert_eq!(pool.free_len(), 2);
        assert_eq!(driver.connects(), 2);
    }

    #[test]
    fn test_run_until_idle_on_empty_pool_returns() {
        let (mut pool, driver) = make_pool(2);
        pool.run_until_idle().unwrap();
        assert_eq!(driver.poll_calls(), 0);
        assert_eq!(pool.stats().passes, 0);
    }

    #[test]
    fn test_run_until_idle_uses_cadence_timeouts() {
        let driver = MockDriver::new();
        let config = PoolConfig::new(1).with_cadence(crate::config::CadenceConfig::Backoff {
            initial_ms: 1,
            max_ms: 4,
            multiplier: 2.0,
        });
        let mut pool = QueryPool::new("paced", config, driver.clone());
        driver.set_auto_settle_after(Some(4));

        pool.submit("slow", None);
        pool.run_until_idle().unwrap();

        let timeouts: Vec<u64> = driver
            .poll_timeouts()
            .iter()
            .map(|d| d.as_millis() as u64)
            .collect();
        assert_eq!(timeouts, vec![0, 1, 2, 4]);
    }

    #[test]
    fn test_drain_on_idle_pool_does_not_poll() {
        let (mut pool, driver) = make_pool(2);
        assert_eq!(pool.drain_ready(Duration::from_millis(50)).unwrap(), 0);
        assert_eq!(driver.poll_calls(), 0);
        assert_eq!(pool.stats().empty_passes, 1);
    }

    #[test]
    fn test_drain_ready_default_uses_config_timeout() {
        let driver = MockDriver::new();
        let config = PoolConfig::new(1).with_poll_timeout_ms(25);
        let mut pool = QueryPool::new("timeouts", config, driver.clone());

        pool.submit("x", None);
        pool.drain_ready_default().unwrap();
        assert_eq!(driver.poll_timeouts(), vec![Duration::from_millis(25)]);
    }

    #[test]
    fn test_request_ids_strictly_increase() {
        let (mut pool, driver) = make_pool(1);
        driver.set_auto_settle_after(Some(0));
        let mut last = None;
        for i in 0..10 {
            let submission = pool.submit(format!("q{}", i), None);
            pool.drain_ready(Duration::ZERO).unwrap();
            let id = submission.request_id().unwrap();
            if let Some(prev) = last {
                assert!(id > prev);
            }
            last = Some(id);
        }
    }

    #[test]
    fn test_queued_requests_get_ids_at_admission() {
        let (mut pool, driver) = make_pool(1);
        pool.submit("first", None);
        let queued = pool.submit("second", None);
        assert!(queued.is_queued());
        assert_eq!(queued.request_id(), None);
        assert_eq!(pool.pending_queries().collect::<Vec<_>>(), vec!["second"]);

        driver.settle("first", MockBehavior::Complete);
        pool.drain_ready(Duration::ZERO).unwrap();
        assert_eq!(pool.in_flight_ids(), vec![RequestId(1)]);
    }

    #[test]
    fn test_zero_capacity_raised_to_one() {
        let driver = MockDriver::new();
        let mut pool = QueryPool::new("tiny", PoolConfig::new(0), driver.clone());
        assert_eq!(pool.config().max_queries, 1);
        pool.submit("a", None);
        assert!(pool.submit("b", None).is_queued());
    }

    #[test]
    fn test_stats_counts() {
        let (mut pool, driver) = make_pool(1);
        driver.script("ok", MockBehavior::Complete);
        driver.script("bad", MockBehavior::Fail("nope".to_string()));

        pool.submit("ok", None);
        pool.submit("bad", None);
        pool.run_until_idle().unwrap();

        let stats = pool.stats();
        assert_eq!(stats.submitted, 2);
        assert_eq!(stats.dispatched, 2);
        assert_eq!(stats.queued, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.connections_created, 1);
    }

    #[test]
    fn test_debug_output() {
        let (pool, _driver) = make_pool(2);
        let text = format!("{:?}", pool);
        assert!(text.contains("QueryPool"));
        assert!(text.contains("\"test\""));
    }
}
