//! Statement compiler for the classic schema.
//!
//! This module turns object paths, selections and criteria trees into SQL
//! text: paths resolve to aliased columns, every referenced table is joined
//! once, and selections carry their GROUP BY / ORDER BY modifiers.

mod criteria;
mod join;
mod path_resolve;
mod selection;
mod sql_select;

pub use criteria::resolve_criteria;
pub use join::{Join, JoinedTable, TOP_TABLE};
pub use path_resolve::{
    default_table_name, resolve_field, resolve_table_name, select_column_count, FieldContext,
};
pub use selection::{
    FunctionKind, Order, PathSelection, SelectedFlags, SelectedObject, SelectedPath,
};
pub use sql_select::{resolve_selection, SqlSelect};
