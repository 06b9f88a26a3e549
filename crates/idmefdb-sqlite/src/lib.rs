//! SQLite dialect for idmefdb.
//!
//! ```ignore
//! use std::sync::Arc;
//! use idmefdb_core::{DialectRegistry, QueryConfig, Settings, Sql};
//! use idmefdb_sqlite::SqliteDialect;
//!
//! let registry = DialectRegistry::new().with(Arc::new(SqliteDialect::new()));
//! let settings = Settings::parse("type=sqlite file=/var/lib/prelude.db")?;
//! let sql = Sql::open(&registry, settings, QueryConfig::new())?;
//! ```
//!
//! Results are read into memory when the statement runs. `REGEXP` is
//! provided by a `regexp()` function registered on every connection.

pub mod connection;
pub mod dialect;
pub mod error;

pub use connection::{SqliteConnection, SqliteResult};
pub use dialect::SqliteDialect;
pub use error::SqliteError;

use std::sync::Arc;

use idmefdb_core::DialectRegistry;

/// Add the SQLite dialect to a registry.
pub fn register(registry: &mut DialectRegistry) {
    registry.register(Arc::new(SqliteDialect::new()));
}
