//! Generic SQL layer.
//!
//! This module is backend agnostic: concrete backends implement the
//! [`Dialect`] contract and the session, table and criterion code here drive
//! them.

mod criterion;
mod dialect;
mod session;
mod settings;
mod table;
mod timestamp;

pub use dialect::{Connection, Dialect, DialectRegistry, ResultSet, RowData, TimeUnit};
pub use session::{Sql, SqlStatus};
pub use settings::{
    Settings, DEFAULT_NAME, SETTING_FILE, SETTING_HOST, SETTING_LOG, SETTING_NAME, SETTING_PASS,
    SETTING_PORT, SETTING_TYPE, SETTING_USER,
};
pub use table::{Field, Row, Table};
pub use timestamp::{time_from_timestamp, time_to_columns, time_to_timestamp};
