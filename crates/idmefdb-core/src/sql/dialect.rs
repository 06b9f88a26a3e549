//! Dialect contract implemented once per SQL backend.
//!
//! A backend provides three things:
//!
//! - a [`Dialect`]: pure syntax rules (operators, pagination, time
//!   functions) plus the ability to open a session,
//! - a [`Connection`]: one open session that executes statements and
//!   escapes text,
//! - a [`ResultSet`] / [`RowData`] pair: the cursor a SELECT returns.
//!
//! Optional operations have a default body returning
//! [`Error::Unsupported`]; the session layer falls back to a generic
//! implementation when it sees that error.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use idmefdb_proto::{CriterionOperator, Time};

use crate::error::Error;
use crate::sql::settings::Settings;

/// Calendar component used by time extraction, constraints and intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Year,
    Quarter,
    Month,
    Week,
    YDay,
    MDay,
    WDay,
    Hour,
    Min,
    Sec,
    MSec,
    USec,
}

impl TimeUnit {
    const ALL: [TimeUnit; 12] = [
        TimeUnit::Year,
        TimeUnit::Quarter,
        TimeUnit::Month,
        TimeUnit::Week,
        TimeUnit::YDay,
        TimeUnit::MDay,
        TimeUnit::WDay,
        TimeUnit::Hour,
        TimeUnit::Min,
        TimeUnit::Sec,
        TimeUnit::MSec,
        TimeUnit::USec,
    ];

    /// Numeric code carried by integer literals in selections.
    pub fn code(&self) -> i32 {
        Self::ALL.iter().position(|u| u == self).unwrap_or_default() as i32
    }

    /// Resolve a numeric code.
    pub fn from_code(code: i32) -> Option<TimeUnit> {
        usize::try_from(code).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    /// Keyword used in selection strings.
    pub fn name(&self) -> &'static str {
        match self {
            TimeUnit::Year => "year",
            TimeUnit::Quarter => "quarter",
            TimeUnit::Month => "month",
            TimeUnit::Week => "week",
            TimeUnit::YDay => "yday",
            TimeUnit::MDay => "mday",
            TimeUnit::WDay => "wday",
            TimeUnit::Hour => "hour",
            TimeUnit::Min => "min",
            TimeUnit::Sec => "sec",
            TimeUnit::MSec => "msec",
            TimeUnit::USec => "usec",
        }
    }

    /// Resolve a keyword.
    pub fn from_name(name: &str) -> Option<TimeUnit> {
        Self::ALL.iter().copied().find(|u| u.name() == name)
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Syntax rules of a SQL backend.
pub trait Dialect: Send + Sync {
    /// Name used by the `type` setting.
    fn name(&self) -> &str;

    /// Open a session.
    fn open(&self, settings: &Settings) -> Result<Box<dyn Connection>, Error>;

    /// SQL text for a criterion operator, `None` if the backend has none.
    fn operator_string(&self, operator: CriterionOperator) -> Option<&'static str>;

    /// Render `field <op> value`.
    fn build_constraint_string(
        &self,
        field: &str,
        operator: CriterionOperator,
        value: &str,
    ) -> Result<String, Error> {
        let op = self.operator_string(operator).ok_or_else(|| {
            Error::Query(format!("operator '{}' has no SQL equivalent", operator))
        })?;
        Ok(format!("{} {} {}", field, op, value))
    }

    /// Render an expression extracting `unit` from a time column.
    fn build_time_extract_string(
        &self,
        field: &str,
        unit: TimeUnit,
        gmt_offset: i32,
    ) -> Result<String, Error>;

    /// Render a comparison of one calendar component of a time column.
    fn build_time_constraint_string(
        &self,
        field: &str,
        unit: TimeUnit,
        operator: CriterionOperator,
        value: i32,
        gmt_offset: i32,
    ) -> Result<String, Error>;

    /// Render a time column shifted by `value` units.
    fn build_time_interval_string(
        &self,
        _field: &str,
        _value: &str,
        _unit: TimeUnit,
    ) -> Result<String, Error> {
        Err(Error::Unsupported("build_time_interval_string"))
    }

    /// Render a time column converted to a named timezone.
    fn build_time_timezone_string(&self, _field: &str, _timezone: &str) -> Result<String, Error> {
        Err(Error::Unsupported("build_time_timezone_string"))
    }

    /// Render the pagination suffix, including its leading space.
    fn build_limit_offset_string(&self, limit: Option<u64>, offset: Option<u64>) -> String;

    /// Render a timestamp literal.
    fn build_timestamp_string(&self, _time: &Time) -> Result<String, Error> {
        Err(Error::Unsupported("build_timestamp_string"))
    }
}

/// An open backend session.
pub trait Connection: Send {
    /// Execute a statement. SELECT-like statements return a cursor.
    fn query(&mut self, query: &str) -> Result<Option<Box<dyn ResultSet>>, Error>;

    /// Quote and escape text for inclusion in a statement.
    fn escape(&mut self, _input: &str) -> Result<String, Error> {
        Err(Error::Unsupported("escape"))
    }

    /// Quote and escape binary data.
    fn escape_binary(&mut self, input: &[u8]) -> Result<String, Error>;

    /// Reverse [`Connection::escape_binary`] on fetched data.
    fn unescape_binary(&mut self, _input: &[u8]) -> Result<Vec<u8>, Error> {
        Err(Error::Unsupported("unescape_binary"))
    }

    /// Backend server version.
    fn server_version(&mut self) -> Result<u64, Error>;

    /// Identifier generated by the last INSERT.
    fn last_insert_ident(&mut self) -> Result<u64, Error> {
        Err(Error::Unsupported("last_insert_ident"))
    }

    /// Close the session. Called once before the connection is dropped.
    fn close(&mut self) {}
}

/// Cursor over the rows of a query result.
pub trait ResultSet {
    fn column_count(&self) -> usize;

    /// Total number of rows, when the backend knows it without fetching.
    fn row_count(&self) -> Result<usize, Error> {
        Err(Error::Unsupported("row_count"))
    }

    fn column_name(&self, column: usize) -> Option<&str>;

    fn column_num(&self, name: &str) -> Option<usize>;

    /// Fetch the next row, `None` once exhausted.
    fn fetch_row(&mut self) -> Result<Option<Box<dyn RowData>>, Error>;
}

/// One fetched backend row.
pub trait RowData {
    /// Fetch a column's raw text, `None` for NULL.
    fn fetch_field(&mut self, column: usize) -> Result<Option<Vec<u8>>, Error>;
}

/// Name-keyed set of dialects, built once by the caller.
#[derive(Clone, Default)]
pub struct DialectRegistry {
    dialects: HashMap<String, Arc<dyn Dialect>>,
}

impl DialectRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dialect under its own name, replacing any previous one.
    pub fn register(&mut self, dialect: Arc<dyn Dialect>) -> &mut Self {
        self.dialects.insert(dialect.name().to_string(), dialect);
        self
    }

    /// Builder form of [`DialectRegistry::register`].
    pub fn with(mut self, dialect: Arc<dyn Dialect>) -> Self {
        self.register(dialect);
        self
    }

    /// Look up a dialect by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Dialect>, Error> {
        self.dialects
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownDialect(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.dialects.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for DialectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialectRegistry")
            .field("dialects", &self.names())
            .finish()
    }
}
