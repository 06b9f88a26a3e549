//! Mapping of object paths onto the classic schema.
//!
//! A path resolves to a column expression: leaves directly under the message
//! live in the message table (`top_table`), everything deeper lives in a
//! table named after the parent object's class and joined through
//! [`Join`]. A handful of leaves are stored under different table or column
//! names, and time values span several columns.

use idmefdb_proto::{IdmefClass, Path, ValueType};

use super::join::{Join, TOP_TABLE};
use crate::error::Error;

/// Where a resolved field expression is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldContext {
    /// A criterion operand.
    Where,
    /// A top-level selected column.
    Select,
    /// A function argument.
    Function,
}

/// Resolve `path` to a column expression, joining its table if needed.
pub fn resolve_field(path: &Path, context: FieldContext, join: &mut Join) -> Result<String, Error> {
    let depth = path.depth();
    let Some(value_type) = path.value_type() else {
        return Err(Error::Query(format!("path '{}' does not name a value", path)));
    };
    if depth < 2 {
        return Err(Error::Query(format!("path '{}' is too short", path)));
    }

    if depth == 2 && value_type != ValueType::Time {
        join.set_top_class(path.root_class())?;
        return Ok(format!("{}.{}", TOP_TABLE, path.leaf_name()));
    }

    let table = join.lookup_or_create(path, || resolve_table_name(path))?;
    Ok(resolve_column(path, value_type, context, table.alias()))
}

/// Physical table holding the value `path` names.
pub fn resolve_table_name(path: &Path) -> Result<String, Error> {
    let depth = path.depth();
    let leaf = path.leaf_name();

    let parent = depth
        .checked_sub(2)
        .and_then(|d| path.class_at(d))
        .ok_or_else(|| Error::UnresolvableTable(path.to_string()))?;

    let special = match (parent, leaf) {
        (IdmefClass::Alert | IdmefClass::Heartbeat, "create_time") => Some("Prelude_CreateTime"),
        (IdmefClass::Alert | IdmefClass::Heartbeat, "detect_time") => Some("Prelude_DetectTime"),
        (IdmefClass::Alert | IdmefClass::Heartbeat, "analyzer_time") => {
            Some("Prelude_AnalyzerTime")
        }
        (IdmefClass::Process, "arg") => Some("Prelude_ProcessArg"),
        (IdmefClass::Process, "env") => Some("Prelude_ProcessEnv"),
        (IdmefClass::WebService, "arg") => Some("Prelude_WebServiceArg"),
        (IdmefClass::FileAccess, "permission") => Some("Prelude_FileAccess_Permission"),
        _ => None,
    };

    Ok(match special {
        Some(name) => name.to_string(),
        None => default_table_name(parent),
    })
}

/// `Prelude_` followed by the class name in PascalCase.
pub fn default_table_name(class: IdmefClass) -> String {
    let mut name = String::from("Prelude_");
    for word in class.name().split('_') {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            name.extend(first.to_uppercase());
            name.push_str(chars.as_str());
        }
    }
    name
}

/// Number of physical columns a selected path occupies.
pub fn select_column_count(path: &Path) -> usize {
    match path.value_type() {
        Some(ValueType::Time) if path.depth() == 2 => 3,
        Some(ValueType::Time) => 2,
        Some(ValueType::Data) if is_additional_data(path) => 2,
        _ => 1,
    }
}

fn is_additional_data(path: &Path) -> bool {
    let depth = path.depth();
    depth >= 2
        && path.class_at(depth - 2) == Some(IdmefClass::AdditionalData)
        && path.leaf_name() == "data"
}

fn resolve_column(path: &Path, value_type: ValueType, context: FieldContext, alias: &str) -> String {
    let leaf = path.leaf_name();
    let select = context == FieldContext::Select;

    if value_type == ValueType::Time {
        return match (path.depth() == 2, select) {
            (true, true) => format!("{a}.time, {a}.gmtoff, {a}.usec", a = alias),
            (true, false) => format!("{}.time", alias),
            (false, true) => format!("{a}.{n}, {a}.{n}_gmtoff", a = alias, n = leaf),
            (false, false) => format!("{}.{}", alias, leaf),
        };
    }

    if select && is_additional_data(path) {
        return format!("{a}.data, {a}.type", a = alias);
    }

    let parent = path.class_at(path.depth() - 2);
    let column = match (parent, leaf) {
        (Some(IdmefClass::SnmpService), "oid") => "snmp_oid",
        (Some(IdmefClass::Checksum), "key") => "checksum_key",
        _ => leaf,
    };
    format!("{}.{}", alias, column)
}
