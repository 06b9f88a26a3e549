//! SQL session: connection lifetime, transactions and escaping.

use std::cell::RefCell;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use tracing::{debug, info, warn};

use idmefdb_proto::Time;

use super::dialect::{Connection, Dialect, DialectRegistry};
use super::settings::Settings;
use super::table::Table;
use super::timestamp::time_to_timestamp;
use crate::config::QueryConfig;
use crate::error::Error;

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlStatus {
    Disconnected,
    Connected,
    /// Connected with an open transaction.
    Transaction,
}

struct SqlState {
    status: SqlStatus,
    connection: Option<Box<dyn Connection>>,
    query_log: Option<File>,
}

impl SqlState {
    fn disconnect(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
        self.status = SqlStatus::Disconnected;
    }
}

struct SqlInner {
    dialect: Arc<dyn Dialect>,
    settings: Settings,
    config: QueryConfig,
    state: ReentrantMutex<RefCell<SqlState>>,
}

impl Drop for SqlInner {
    fn drop(&mut self) {
        self.state.get_mut().get_mut().disconnect();
    }
}

/// A database session bound to one dialect.
///
/// Cloning is cheap and shares the session. Every operation touching the
/// connection holds a re-entrant lock, so nested calls from the same thread
/// (for example escaping while a statement is being built) do not deadlock.
/// The connection is opened lazily by the first statement and reopened by
/// the next statement after a connection error.
#[derive(Clone)]
pub struct Sql {
    inner: Arc<SqlInner>,
}

impl Sql {
    /// Create a session. The connection is opened on first use.
    pub fn new(
        dialect: Arc<dyn Dialect>,
        settings: Settings,
        config: QueryConfig,
    ) -> Result<Self, Error> {
        let query_log = match settings.log() {
            Some(path) => Some(open_log(Path::new(path))?),
            None => None,
        };

        Ok(Self {
            inner: Arc::new(SqlInner {
                dialect,
                settings,
                config,
                state: ReentrantMutex::new(RefCell::new(SqlState {
                    status: SqlStatus::Disconnected,
                    connection: None,
                    query_log,
                })),
            }),
        })
    }

    /// Create a session, picking the dialect named by the `type` setting.
    pub fn open(
        registry: &DialectRegistry,
        settings: Settings,
        config: QueryConfig,
    ) -> Result<Self, Error> {
        let name = settings
            .dialect_type()
            .ok_or_else(|| Error::UnknownDialect(String::new()))?;
        let dialect = registry.get(name)?;
        Self::new(dialect, settings, config)
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.inner.dialect.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn config(&self) -> &QueryConfig {
        &self.inner.config
    }

    pub fn status(&self) -> SqlStatus {
        let guard = self.lock();
        let status = guard.borrow().status;
        status
    }

    /// Open the connection if needed.
    pub fn connect(&self) -> Result<(), Error> {
        let guard = self.lock();
        let mut state = guard.borrow_mut();
        if state.status != SqlStatus::Disconnected {
            return Ok(());
        }

        let connection = self.inner.dialect.open(&self.inner.settings)?;
        info!(dialect = self.inner.dialect.name(), "connected");
        state.connection = Some(connection);
        state.status = SqlStatus::Connected;
        Ok(())
    }

    /// Close the connection. An open transaction is lost.
    pub fn disconnect(&self) {
        let guard = self.lock();
        let mut state = guard.borrow_mut();
        if state.status == SqlStatus::Transaction {
            warn!("disconnecting with an open transaction");
        }
        state.disconnect();
    }

    /// Append every executed statement to `path`.
    pub fn enable_query_logging(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let file = open_log(path.as_ref())?;
        let guard = self.lock();
        guard.borrow_mut().query_log = Some(file);
        Ok(())
    }

    pub fn disable_query_logging(&self) {
        let guard = self.lock();
        guard.borrow_mut().query_log = None;
    }

    /// Execute a statement, returning a table for statements producing rows.
    ///
    /// With internal transactions enabled and no transaction open, statements
    /// other than SELECT run inside their own transaction.
    pub fn query(&self, query: &str) -> Result<Option<Table>, Error> {
        let _guard = self.lock();

        if self.inner.config.internal_transactions
            && self.status() != SqlStatus::Transaction
            && !is_read_only(query)
        {
            self.transaction_start()?;
            return match self.execute(query) {
                Ok(table) => {
                    self.transaction_end()?;
                    Ok(table)
                }
                Err(e) => Err(self.abort_with(e)),
            };
        }

        self.execute(query)
    }

    fn execute(&self, query: &str) -> Result<Option<Table>, Error> {
        let guard = self.lock();
        self.connect()?;

        self.log_query(&guard, query);

        let result = {
            let mut state = guard.borrow_mut();
            match state.connection.as_mut() {
                Some(connection) => connection.query(query),
                None => Err(Error::Connection("not connected".into())),
            }
        };

        match result {
            Ok(Some(result_set)) => Ok(Some(Table::new(self.clone(), result_set))),
            Ok(None) => Ok(None),
            Err(e) => {
                self.note_error(&guard, &e);
                Err(e)
            }
        }
    }

    fn log_query(&self, guard: &ReentrantMutexGuard<'_, RefCell<SqlState>>, query: &str) {
        debug!(query, "executing");

        let mut state = guard.borrow_mut();
        if let Some(file) = state.query_log.as_mut() {
            // logging failures never stop the statement
            if let Err(e) = writeln!(file, "{}", query).and_then(|_| file.flush()) {
                warn!(error = %e, "could not log query");
            }
        }
    }

    /// Begin a transaction.
    pub fn transaction_start(&self) -> Result<(), Error> {
        let guard = self.lock();
        if guard.borrow().status == SqlStatus::Transaction {
            return Err(Error::AlreadyInTransaction);
        }

        self.execute("BEGIN")?;
        guard.borrow_mut().status = SqlStatus::Transaction;
        Ok(())
    }

    /// Commit the current transaction.
    pub fn transaction_end(&self) -> Result<(), Error> {
        self.finish_transaction("COMMIT")
    }

    /// Roll back the current transaction.
    pub fn transaction_abort(&self) -> Result<(), Error> {
        self.finish_transaction("ROLLBACK")
    }

    fn finish_transaction(&self, statement: &str) -> Result<(), Error> {
        let guard = self.lock();
        if guard.borrow().status != SqlStatus::Transaction {
            return Err(Error::NotInTransaction);
        }

        let result = self.execute(statement).map(|_| ());

        let mut state = guard.borrow_mut();
        if state.status == SqlStatus::Transaction {
            state.status = SqlStatus::Connected;
        }
        result
    }

    /// Roll back after `cause`, returning the error to report.
    ///
    /// A failing rollback is reported together with `cause`.
    pub fn abort_with(&self, cause: Error) -> Error {
        match self.transaction_abort() {
            Ok(()) => cause,
            Err(rollback) => {
                warn!(error = %rollback, cause = %cause, "rollback failed");
                Error::AbortFailed {
                    cause: Box::new(cause),
                    rollback: Box::new(rollback),
                }
            }
        }
    }

    /// Quote and escape text. `None` renders as `NULL`.
    pub fn escape(&self, input: Option<&str>) -> Result<String, Error> {
        let Some(input) = input else {
            return Ok("NULL".to_string());
        };

        self.with_connection(|connection| match connection.escape(input) {
            Err(e) if e.is_unsupported() => connection.escape_binary(input.as_bytes()),
            other => other,
        })
    }

    /// Quote and escape binary data.
    pub fn escape_binary(&self, input: &[u8]) -> Result<String, Error> {
        self.with_connection(|connection| connection.escape_binary(input))
    }

    /// Decode binary data fetched from the backend.
    pub fn unescape_binary(&self, input: &[u8]) -> Result<Vec<u8>, Error> {
        self.with_connection(|connection| match connection.unescape_binary(input) {
            Err(e) if e.is_unsupported() => Ok(input.to_vec()),
            other => other,
        })
    }

    pub fn server_version(&self) -> Result<u64, Error> {
        self.with_connection(|connection| connection.server_version())
    }

    pub fn last_insert_ident(&self) -> Result<u64, Error> {
        self.with_connection(|connection| connection.last_insert_ident())
    }

    /// Pagination suffix for the dialect. `None` disables the clause.
    pub fn build_limit_offset_string(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        self.inner.dialect.build_limit_offset_string(limit, offset)
    }

    /// Timestamp literal, falling back to the quoted ISO form.
    pub fn build_timestamp_string(&self, time: &Time) -> Result<String, Error> {
        match self.inner.dialect.build_timestamp_string(time) {
            Err(e) if e.is_unsupported() => time_to_timestamp(time),
            other => other,
        }
    }

    fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut dyn Connection) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let guard = self.lock();
        self.connect()?;

        let result = {
            let mut state = guard.borrow_mut();
            match state.connection.as_mut() {
                Some(connection) => f(connection.as_mut()),
                None => Err(Error::Connection("not connected".into())),
            }
        };

        if let Err(e) = &result {
            self.note_error(&guard, e);
        }
        result
    }

    /// Run a backend call under the session lock, tracking connection loss.
    pub(crate) fn guarded<T>(&self, f: impl FnOnce() -> Result<T, Error>) -> Result<T, Error> {
        let guard = self.lock();
        let result = f();
        if let Err(e) = &result {
            self.note_error(&guard, e);
        }
        result
    }

    fn note_error(&self, guard: &ReentrantMutexGuard<'_, RefCell<SqlState>>, error: &Error) {
        if error.is_connection_error() {
            warn!(error = %error, "connection lost");
            guard.borrow_mut().disconnect();
        }
    }

    fn lock(&self) -> ReentrantMutexGuard<'_, RefCell<SqlState>> {
        self.inner.state.lock()
    }
}

impl fmt::Debug for Sql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sql")
            .field("dialect", &self.inner.dialect.name())
            .field("status", &self.status())
            .finish()
    }
}

fn open_log(path: &Path) -> Result<File, Error> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

fn is_read_only(query: &str) -> bool {
    let head = query.trim_start();
    head.get(..6)
        .is_some_and(|word| word.eq_ignore_ascii_case("SELECT"))
}
