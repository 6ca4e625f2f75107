//! Non-blocking SQLite connections.
//!
//! SQLite has no asynchronous query API, so every [`SqliteConnection`] owns a
//! worker thread holding the `rusqlite::Connection`. `send_query` hands the SQL
//! to the worker over a channel and returns at once; the worker executes it and
//! posts the outcome on a reply channel. Polling waits on the reply channels of
//! all watched connections at once and never consumes a reply, so a reply stays
//! available for `reap`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Select, Sender, TryRecvError};
use querypool_core::{AsyncConnection, ConnectionFactory, Readiness};
use tracing::{debug, warn};

use crate::config::SqliteConfig;
use crate::error::{Result, SqliteError};
use crate::rows::{Rows, Value};

type Reply = std::result::Result<Rows, String>;

const WORKER_EXITED: &str = "sqlite worker thread exited";

/// Opens a database and applies the configured busy timeout and pragmas.
pub fn open_database(config: &SqliteConfig) -> Result<rusqlite::Connection> {
    let conn = rusqlite::Connection::open(&config.path).map_err(|source| SqliteError::Open {
        path: config.path.clone(),
        source,
    })?;
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    for pragma in &config.pragmas {
        conn.execute_batch(pragma)?;
    }
    Ok(conn)
}

/// Runs one statement to completion and copies its output.
fn execute(conn: &rusqlite::Connection, sql: &str) -> rusqlite::Result<Rows> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    if columns.is_empty() {
        let affected = stmt.execute([])?;
        return Ok(Rows {
            columns,
            rows: Vec::new(),
            affected,
        });
    }

    let width = columns.len();
    let mut rows = Vec::new();
    let mut cursor = stmt.query([])?;
    while let Some(row) = cursor.next()? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(Value::from(row.get_ref(i)?));
        }
        rows.push(values);
    }
    Ok(Rows {
        columns,
        rows,
        affected: 0,
    })
}

fn run_worker(conn: rusqlite::Connection, jobs: Receiver<String>, replies: Sender<Reply>) {
    for sql in jobs.iter() {
        let reply = execute(&conn, &sql).map_err(|e| e.to_string());
        if replies.send(reply).is_err() {
            break;
        }
    }
}

/// A SQLite connection driven by a dedicated worker thread.
pub struct SqliteConnection {
    id: usize,
    jobs: Option<Sender<String>>,
    replies: Receiver<Reply>,
    worker: Option<JoinHandle<()>>,
    last_error: Option<String>,
    fault: Option<String>,
    /// A statement was sent and its reply not yet reaped.
    executing: bool,
}

impl SqliteConnection {
    /// Opens the database in the calling thread, then moves it to a new worker.
    pub fn open(config: &SqliteConfig, id: usize) -> Result<Self> {
        let conn = open_database(config)?;
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<String>();
        let (reply_tx, reply_rx) = crossbeam_channel::unbounded::<Reply>();

        let worker = thread::Builder::new()
            .name(format!("qpool-sqlite-{}", id))
            .spawn(move || run_worker(conn, job_rx, reply_tx))
            .map_err(|e| SqliteError::WorkerGone(e.to_string()))?;

        debug!("Opened sqlite connection {} on {}", id, config.path);
        Ok(Self {
            id,
            jobs: Some(job_tx),
            replies: reply_rx,
            worker: Some(worker),
            last_error: None,
            fault: None,
            executing: false,
        })
    }

    /// A connection that could not be opened. Every query on it settles in
    /// the error set with `reason` as the driver message.
    pub fn broken(id: usize, reason: impl Into<String>) -> Self {
        let (_, reply_rx) = crossbeam_channel::unbounded::<Reply>();
        Self {
            id,
            jobs: None,
            replies: reply_rx,
            worker: None,
            last_error: None,
            fault: Some(reason.into()),
            executing: false,
        }
    }

    /// Factory-assigned connection number.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Returns true while the worker thread is running.
    pub fn is_alive(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn fault_message(&self) -> Option<String> {
        if let Some(fault) = &self.fault {
            return Some(fault.clone());
        }
        if self.is_alive() {
            None
        } else {
            Some(WORKER_EXITED.to_string())
        }
    }

    fn readiness(&self) -> Readiness {
        if !self.replies.is_empty() {
            Readiness::Read
        } else if self.is_alive() {
            Readiness::Pending
        } else {
            Readiness::Error
        }
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .field("replies", &self.replies.len())
            .field("last_error", &self.last_error)
            .field("fault", &self.fault)
            .field("executing", &self.executing)
            .finish()
    }
}

impl AsyncConnection for SqliteConnection {
    type ResultSet = Rows;

    fn send_query(&mut self, query: &str) {
        self.last_error = None;
        let sent = self
            .jobs
            .as_ref()
            .is_some_and(|jobs| jobs.send(query.to_string()).is_ok());
        self.executing = sent;
        if !sent {
            warn!("Sqlite connection {} cannot accept query: worker gone", self.id);
        }
    }

    fn poll(watched: &[&Self], timeout: Duration) -> Vec<Readiness> {
        let sweep = || watched.iter().map(|c| c.readiness()).collect::<Vec<_>>();

        let readiness = sweep();
        if timeout.is_zero() || readiness.iter().any(Readiness::is_settled) {
            return readiness;
        }

        let mut select = Select::new();
        for conn in watched {
            select.recv(&conn.replies);
        }
        match select.ready_timeout(timeout) {
            Ok(_) => sweep(),
            Err(_) => readiness,
        }
    }

    fn reap(&mut self) -> Option<Rows> {
        match self.replies.try_recv() {
            Ok(Ok(rows)) => {
                self.executing = false;
                Some(rows)
            }
            Ok(Err(message)) => {
                self.executing = false;
                self.last_error = Some(message);
                None
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.executing = false;
                self.last_error = self.fault_message();
                None
            }
        }
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone().or_else(|| {
            if self.replies.is_empty() {
                self.fault_message()
            } else {
                None
            }
        })
    }
}

/// Closing the job channel ends the worker loop. An idle worker is joined.
/// A worker still executing a statement is detached instead: it finishes the
/// statement (or its busy timeout), fails to post the reply and exits on its
/// own, so dropping never waits on SQLite.
impl Drop for SqliteConnection {
    fn drop(&mut self) {
        self.jobs.take();
        let Some(worker) = self.worker.take() else {
            return;
        };
        if self.executing && self.replies.is_empty() {
            debug!("Detaching sqlite worker {} with a statement in progress", self.id);
            return;
        }
        if worker.join().is_err() {
            warn!("Sqlite worker {} panicked", self.id);
        }
    }
}

/// Opens [`SqliteConnection`]s from a shared [`SqliteConfig`].
///
/// Clones share the connection counter, so connection numbers stay unique
/// across every pool of a registry.
#[derive(Debug, Clone)]
pub struct SqliteFactory {
    config: SqliteConfig,
    opened: Arc<AtomicUsize>,
}

impl SqliteFactory {
    /// Creates a factory for `config`.
    pub fn new(config: SqliteConfig) -> Self {
        Self {
            config,
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Connection settings.
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Number of connections requested so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::Relaxed)
    }

    /// Opens a connection, reporting failures to the caller.
    pub fn try_connect(&self) -> Result<SqliteConnection> {
        let id = self.opened.fetch_add(1, Ordering::Relaxed);
        SqliteConnection::open(&self.config, id)
    }
}

impl ConnectionFactory for SqliteFactory {
    type Connection = SqliteConnection;

    /// A failed open yields a broken connection whose queries settle with the
    /// open error, so the failure reaches the query's callback.
    fn connect(&mut self) -> SqliteConnection {
        let id = self.opened.fetch_add(1, Ordering::Relaxed);
        match SqliteConnection::open(&self.config, id) {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Sqlite connection {} failed to open: {}", id, e);
                SqliteConnection::broken(id, e.to_string())
            }
        }
    }
}
