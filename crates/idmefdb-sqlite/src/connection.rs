//! SQLite sessions and in-memory result sets.

use std::collections::VecDeque;
use std::path::Path;

use idmefdb_core::{Connection, Error, ResultSet, RowData, Settings};
use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::OpenFlags;
use tracing::{debug, warn};

use crate::error::SqliteError;

/// An open SQLite database.
pub struct SqliteConnection {
    conn: Option<rusqlite::Connection>,
}

impl SqliteConnection {
    /// Open the database named by the `file` setting. The file must exist.
    pub fn open(settings: &Settings) -> Result<Self, SqliteError> {
        let file = settings.file().ok_or(SqliteError::NoFile)?;
        if !Path::new(file).exists() {
            return Err(SqliteError::MissingFile(file.to_string()));
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = rusqlite::Connection::open_with_flags(file, flags).map_err(|source| {
            SqliteError::Open {
                path: file.to_string(),
                source,
            }
        })?;
        register_regexp(&conn)?;

        debug!(file = %file, "opened sqlite database");
        Ok(Self { conn: Some(conn) })
    }

    /// Wrap an already open connection, e.g. an in-memory database.
    pub fn from_connection(conn: rusqlite::Connection) -> Result<Self, SqliteError> {
        register_regexp(&conn)?;
        Ok(Self { conn: Some(conn) })
    }

    fn conn(&self) -> Result<&rusqlite::Connection, SqliteError> {
        self.conn.as_ref().ok_or(SqliteError::Closed)
    }

    fn run(&self, query: &str) -> Result<Option<Box<dyn ResultSet>>, SqliteError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(query)?;

        if stmt.column_count() == 0 {
            let changes = stmt.execute([])?;
            debug!(changes, "statement executed");
            return Ok(None);
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let column_count = columns.len();

        let mut rows = VecDeque::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let mut fields = Vec::with_capacity(column_count);
            for column in 0..column_count {
                fields.push(field_bytes(row.get_ref(column)?));
            }
            rows.push_back(fields);
        }

        let total = rows.len();
        Ok(Some(Box::new(SqliteResult {
            columns,
            rows,
            total,
        })))
    }
}

impl Connection for SqliteConnection {
    fn query(&mut self, query: &str) -> Result<Option<Box<dyn ResultSet>>, Error> {
        Ok(self.run(query)?)
    }

    fn escape(&mut self, input: &str) -> Result<String, Error> {
        Ok(escape_text(input))
    }

    fn escape_binary(&mut self, input: &[u8]) -> Result<String, Error> {
        Ok(format!("X'{}'", hex::encode(input)))
    }

    fn server_version(&mut self) -> Result<u64, Error> {
        u64::try_from(rusqlite::version_number())
            .map_err(|_| Error::Query("negative sqlite version".into()))
    }

    fn last_insert_ident(&mut self) -> Result<u64, Error> {
        let rowid = self.conn()?.last_insert_rowid();
        u64::try_from(rowid).map_err(|_| Error::InvalidMessageIdent(rowid.to_string()))
    }

    fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_, e)) = conn.close() {
                warn!(error = %e, "closing sqlite database failed");
            }
        }
    }
}

/// Quote text as a SQL string literal, doubling embedded quotes.
pub fn escape_text(input: &str) -> String {
    format!("'{}'", input.replace('\'', "''"))
}

/// Raw text of a fetched value. Blobs are returned as stored.
fn field_bytes(value: ValueRef<'_>) -> Option<Vec<u8>> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string().into_bytes()),
        ValueRef::Real(f) => Some(f.to_string().into_bytes()),
        ValueRef::Text(text) | ValueRef::Blob(text) => Some(text.to_vec()),
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// `x REGEXP y` calls `regexp(y, x)`. Compiled patterns are cached per
/// statement.
fn register_regexp(conn: &rusqlite::Connection) -> Result<(), SqliteError> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let regex = ctx.get_or_create_aux(0, |pattern| -> Result<Regex, BoxError> {
                Ok(Regex::new(pattern.as_str()?)?)
            })?;
            // NULL in, NULL out, so that NOT REGEXP skips NULL rows too
            let text: Option<String> = ctx.get(1)?;
            Ok(text.map(|text| regex.is_match(&text)))
        },
    )?;
    Ok(())
}

/// A fully fetched result.
pub struct SqliteResult {
    columns: Vec<String>,
    rows: VecDeque<Vec<Option<Vec<u8>>>>,
    total: usize,
}

impl ResultSet for SqliteResult {
    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn row_count(&self) -> Result<usize, Error> {
        Ok(self.total)
    }

    fn column_name(&self, column: usize) -> Option<&str> {
        self.columns.get(column).map(String::as_str)
    }

    fn column_num(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    fn fetch_row(&mut self) -> Result<Option<Box<dyn RowData>>, Error> {
        Ok(self
            .rows
            .pop_front()
            .map(|fields| Box::new(SqliteRow { fields }) as Box<dyn RowData>))
    }
}

struct SqliteRow {
    fields: Vec<Option<Vec<u8>>>,
}

impl RowData for SqliteRow {
    fn fetch_field(&mut self, column: usize) -> Result<Option<Vec<u8>>, Error> {
        self.fields
            .get(column)
            .cloned()
            .ok_or(Error::InvalidColumnNum(column))
    }
}
