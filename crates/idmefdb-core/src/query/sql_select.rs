//! SELECT list builder.

use tracing::trace;

use super::join::Join;
use super::path_resolve::{resolve_field, FieldContext};
use super::selection::{FunctionKind, Order, PathSelection, SelectedFlags, SelectedObject};
use crate::error::Error;
use crate::sql::{Sql, TimeUnit};

/// Accumulates the column list and the GROUP BY / ORDER BY modifiers of a
/// SELECT statement. Modifiers refer to columns by 1-based ordinal.
#[derive(Debug, Clone, Default)]
pub struct SqlSelect {
    fields: String,
    group_by: Vec<String>,
    order_by: Vec<String>,
    field_count: usize,
}

impl SqlSelect {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field expression spanning `column_count` physical columns.
    pub fn add_field(&mut self, field: &str, flags: SelectedFlags, column_count: usize) {
        if !self.fields.is_empty() {
            self.fields.push_str(", ");
        }
        self.fields.push_str(field);

        for _ in 0..column_count {
            self.field_count += 1;
            if flags.group_by {
                self.group_by.push(self.field_count.to_string());
            }
            match flags.order {
                Some(Order::Asc) => self.order_by.push(format!("{} ASC", self.field_count)),
                Some(Order::Desc) => self.order_by.push(format!("{} DESC", self.field_count)),
                None => {}
            }
        }
    }

    /// Comma-separated field list.
    pub fn fields(&self) -> &str {
        &self.fields
    }

    /// Physical columns added so far.
    pub fn field_count(&self) -> usize {
        self.field_count
    }

    /// ` GROUP BY ...` and ` ORDER BY ...`, each omitted when empty.
    pub fn modifiers_to_string(&self) -> String {
        let mut out = String::new();
        if !self.group_by.is_empty() {
            out.push_str(" GROUP BY ");
            out.push_str(&self.group_by.join(", "));
        }
        if !self.order_by.is_empty() {
            out.push_str(" ORDER BY ");
            out.push_str(&self.order_by.join(", "));
        }
        out
    }
}

/// Render every selected object of `selection` into a [`SqlSelect`],
/// registering the tables it needs in `join`.
pub fn resolve_selection(
    sql: &Sql,
    selection: &PathSelection,
    join: &mut Join,
) -> Result<SqlSelect, Error> {
    let mut select = SqlSelect::new();
    let mut aliases = 0;

    for selected in selection {
        let object = selected.object();
        let mut field = render_object(sql, object, join, 0)?;

        if sql.config().alias_functions && matches!(object, SelectedObject::Function(..)) {
            field.push_str(&format!(" AS FUNC{}", aliases));
            aliases += 1;
        }

        trace!(object = %object, field = %field, "selected");
        select.add_field(&field, selected.flags(), selected.column_count());
    }

    Ok(select)
}

fn render_object(
    sql: &Sql,
    object: &SelectedObject,
    join: &mut Join,
    depth: usize,
) -> Result<String, Error> {
    match object {
        SelectedObject::Path(path) => {
            let context = if depth == 0 {
                FieldContext::Select
            } else {
                FieldContext::Function
            };
            resolve_field(path, context, join)
        }
        SelectedObject::String(text) => sql.escape(Some(text)),
        SelectedObject::Int(value) => Ok(value.to_string()),
        SelectedObject::Function(kind, args) => render_function(sql, *kind, args, join, depth),
    }
}

fn render_function(
    sql: &Sql,
    kind: FunctionKind,
    args: &[SelectedObject],
    join: &mut Join,
    depth: usize,
) -> Result<String, Error> {
    let arg = |index: usize| {
        args.get(index)
            .ok_or_else(|| Error::Query(format!("missing argument {} to {}()", index, kind)))
    };

    let field = render_object(sql, arg(0)?, join, depth + 1)?;

    match kind {
        FunctionKind::Min
        | FunctionKind::Max
        | FunctionKind::Avg
        | FunctionKind::Sum
        | FunctionKind::Count => Ok(format!("{}({})", kind.name().to_uppercase(), field)),
        FunctionKind::Extract => {
            let unit = time_unit(arg(1)?)?;
            sql.dialect().build_time_extract_string(&field, unit, 0)
        }
        FunctionKind::Interval => {
            let value = render_object(sql, arg(1)?, join, depth + 1)?;
            let unit = time_unit(arg(2)?)?;
            sql.dialect().build_time_interval_string(&field, &value, unit)
        }
        FunctionKind::Timezone => {
            let timezone = render_object(sql, arg(1)?, join, depth + 1)?;
            sql.dialect().build_time_timezone_string(&field, &timezone)
        }
    }
}

fn time_unit(object: &SelectedObject) -> Result<TimeUnit, Error> {
    match object {
        SelectedObject::Int(code) => i32::try_from(*code)
            .ok()
            .and_then(TimeUnit::from_code)
            .ok_or_else(|| Error::Query(format!("unknown time unit {}", code))),
        other => Err(Error::Query(format!("'{}' is not a time unit", other))),
    }
}
