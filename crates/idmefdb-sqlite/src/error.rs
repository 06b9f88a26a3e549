//! SQLite backend errors.

use thiserror::Error;

/// Errors raised by the SQLite backend before they reach the session.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// The `file` setting is missing.
    #[error("no database file configured")]
    NoFile,

    /// The database file does not exist.
    #[error("database file '{0}' does not exist")]
    MissingFile(String),

    /// The database could not be opened.
    #[error("cannot open '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    /// The engine rejected a statement.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// The connection was already closed.
    #[error("connection closed")]
    Closed,
}

impl From<SqliteError> for idmefdb_core::Error {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::Sqlite(ref e) if is_connection_failure(e) => {
                idmefdb_core::Error::Connection(err.to_string())
            }
            SqliteError::Sqlite(_) => idmefdb_core::Error::Query(err.to_string()),
            _ => idmefdb_core::Error::Connection(err.to_string()),
        }
    }
}

/// Check if the engine error means the database itself is unusable.
fn is_connection_failure(err: &rusqlite::Error) -> bool {
    use rusqlite::ErrorCode;

    matches!(
        err.sqlite_error_code(),
        Some(
            ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::SystemIoFailure
        )
    )
}
