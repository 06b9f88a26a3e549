//! Core error types.

use thiserror::Error;

/// Core database errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Object model error.
    #[error("object model error: {0}")]
    Proto(#[from] idmefdb_proto::Error),

    /// Connection to the backend failed or was lost.
    #[error("connection error: {0}")]
    Connection(String),

    /// The backend rejected a statement.
    #[error("query error: {0}")]
    Query(String),

    /// Column index out of range for a result table.
    #[error("invalid column number {0}")]
    InvalidColumnNum(usize),

    /// No column with this name.
    #[error("invalid column name '{0}'")]
    InvalidColumnName(String),

    /// A field could not be decoded into the requested type.
    #[error("invalid value '{value}' for type {expected}")]
    InvalidValue { value: String, expected: String },

    /// The backend does not implement an optional dialect operation.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    /// `transaction_start` while a transaction is active.
    #[error("already in transaction")]
    AlreadyInTransaction,

    /// `transaction_end` or `transaction_abort` without an active transaction.
    #[error("not in transaction")]
    NotInTransaction,

    /// Row index past the end of a result table.
    #[error("row index {0} out of range")]
    OutOfRange(usize),

    /// Two paths of the same statement start from different message classes.
    #[error("conflicting top table: {existing} and {requested}")]
    ConflictingTopTable { existing: String, requested: String },

    /// No table is known for the path.
    #[error("cannot resolve table for path '{0}'")]
    UnresolvableTable(String),

    /// The settings string is malformed.
    #[error("invalid settings string: {0}")]
    InvalidSettingsString(String),

    /// No dialect registered under this name.
    #[error("unknown dialect '{0}'")]
    UnknownDialect(String),

    /// The database reports a format this crate cannot handle.
    #[error("unknown database format '{0}'")]
    UnknownFormat(String),

    /// A message identifier is not usable.
    #[error("invalid message ident: {0}")]
    InvalidMessageIdent(String),

    /// Transaction abort failed after an earlier error.
    #[error("{cause} (rollback failed: {rollback})")]
    AbortFailed {
        cause: Box<Error>,
        rollback: Box<Error>,
    },

    /// I/O error (query log file).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn value(value: impl Into<String>, expected: impl std::fmt::Display) -> Self {
        Error::InvalidValue {
            value: value.into(),
            expected: expected.to_string(),
        }
    }

    /// Check if this error invalidates the session.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this error reports a missing optional dialect operation.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::Unsupported(_))
    }
}
