//! idmefdb core: query compilation and the generic SQL result layer.
//!
//! - [`sql`]: settings, the dialect contract, sessions with transactions,
//!   and lazily fetched result tables.
//! - [`query`]: object path resolution, join discovery, selections and
//!   criteria rendering for the classic schema.
//! - [`db`]: the database facade tying both together.

pub mod config;
pub mod db;
pub mod error;
pub mod query;
pub mod sql;

pub use config::QueryConfig;
pub use db::{Db, Format, IdentOrder, Limit, ResultIdents, ResultValues};
pub use error::Error;
pub use query::{
    FunctionKind, Join, JoinedTable, Order, PathSelection, SelectedFlags, SelectedObject,
    SelectedPath, SqlSelect,
};
pub use sql::{
    Connection, Dialect, DialectRegistry, Field, ResultSet, Row, RowData, Settings, Sql,
    SqlStatus, Table, TimeUnit,
};

pub use idmefdb_proto as proto;
