//! Selected objects: what a value query returns.

use std::fmt;
use std::sync::Arc;

use idmefdb_proto::{Path, ValueType};
use serde::{Deserialize, Serialize};

use super::path_resolve::select_column_count;
use crate::error::Error;

/// A selectable function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionKind {
    Min,
    Max,
    Avg,
    Sum,
    Count,
    /// `extract(x, unit)`: a time component.
    Extract,
    /// `interval(x, value, unit)`: a time shifted by an interval.
    Interval,
    /// `timezone(x, tz)`: a time converted to another zone.
    Timezone,
}

impl FunctionKind {
    /// Name as written in selection strings.
    pub fn name(&self) -> &'static str {
        match self {
            FunctionKind::Min => "min",
            FunctionKind::Max => "max",
            FunctionKind::Avg => "avg",
            FunctionKind::Sum => "sum",
            FunctionKind::Count => "count",
            FunctionKind::Extract => "extract",
            FunctionKind::Interval => "interval",
            FunctionKind::Timezone => "timezone",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "min" => FunctionKind::Min,
            "max" => FunctionKind::Max,
            "avg" => FunctionKind::Avg,
            "sum" => FunctionKind::Sum,
            "count" => FunctionKind::Count,
            "extract" => FunctionKind::Extract,
            "interval" => FunctionKind::Interval,
            "timezone" => FunctionKind::Timezone,
            _ => return None,
        })
    }

    /// Check if this is a one-argument aggregate.
    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            FunctionKind::Min
                | FunctionKind::Max
                | FunctionKind::Avg
                | FunctionKind::Sum
                | FunctionKind::Count
        )
    }

    fn arity(&self) -> usize {
        match self {
            FunctionKind::Interval => 3,
            FunctionKind::Extract | FunctionKind::Timezone => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A selected expression.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectedObject {
    Path(Path),
    String(String),
    Int(i64),
    Function(FunctionKind, Vec<SelectedObject>),
}

impl SelectedObject {
    pub fn path(path: Path) -> Self {
        SelectedObject::Path(path)
    }

    /// Build a function call, checking its arguments.
    pub fn function(kind: FunctionKind, args: Vec<SelectedObject>) -> Result<Self, Error> {
        if args.len() != kind.arity() {
            return Err(Error::Query(format!(
                "{}() takes {} argument(s), got {}",
                kind,
                kind.arity(),
                args.len()
            )));
        }

        let literal_ok = match kind {
            FunctionKind::Extract => matches!(args[1], SelectedObject::Int(_)),
            FunctionKind::Interval => {
                matches!(args[1], SelectedObject::Int(_)) && matches!(args[2], SelectedObject::Int(_))
            }
            FunctionKind::Timezone => matches!(args[1], SelectedObject::String(_)),
            _ => true,
        };
        if !literal_ok {
            return Err(Error::Query(format!("invalid literal argument to {}()", kind)));
        }

        Ok(SelectedObject::Function(kind, args))
    }

    /// Type of the values this expression produces, if known.
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            SelectedObject::Path(path) => path.value_type(),
            SelectedObject::String(_) => Some(ValueType::String),
            SelectedObject::Int(_) => Some(ValueType::Int64),
            SelectedObject::Function(kind, args) => match kind {
                FunctionKind::Count => Some(ValueType::UInt64),
                FunctionKind::Avg | FunctionKind::Sum => Some(ValueType::Double),
                FunctionKind::Extract => Some(ValueType::Int32),
                _ => args.first().and_then(SelectedObject::value_type),
            },
        }
    }

    /// Physical columns occupied when selected at top level.
    pub fn column_count(&self) -> usize {
        match self {
            SelectedObject::Path(path) => select_column_count(path),
            _ => 1,
        }
    }
}

impl fmt::Display for SelectedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectedObject::Path(path) => write!(f, "{}", path),
            SelectedObject::String(s) => write!(f, "'{}'", s),
            SelectedObject::Int(i) => write!(f, "{}", i),
            SelectedObject::Function(kind, args) => {
                write!(f, "{}(", kind)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Sort direction of a selected column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

/// Modifiers of a selected column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedFlags {
    pub group_by: bool,
    pub order: Option<Order>,
}

impl SelectedFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group_by(mut self) -> Self {
        self.group_by = true;
        self
    }

    pub fn order_asc(mut self) -> Self {
        self.order = Some(Order::Asc);
        self
    }

    pub fn order_desc(mut self) -> Self {
        self.order = Some(Order::Desc);
        self
    }
}

/// One selected column group with its modifiers and result position.
#[derive(Debug, Clone)]
pub struct SelectedPath {
    object: Arc<SelectedObject>,
    flags: SelectedFlags,
    column_count: usize,
    position: usize,
}

impl SelectedPath {
    pub fn new(object: impl Into<Arc<SelectedObject>>, flags: SelectedFlags) -> Self {
        let object = object.into();
        let column_count = object.column_count();
        Self {
            object,
            flags,
            column_count,
            position: 0,
        }
    }

    pub fn object(&self) -> &SelectedObject {
        &self.object
    }

    /// Shared handle on the selected object.
    pub fn object_ref(&self) -> Arc<SelectedObject> {
        Arc::clone(&self.object)
    }

    pub fn flags(&self) -> SelectedFlags {
        self.flags
    }

    /// Physical columns occupied in a result row.
    pub fn column_count(&self) -> usize {
        self.column_count
    }

    /// First physical column of this selection in a result row.
    pub fn position(&self) -> usize {
        self.position
    }
}

/// An ordered list of selected columns.
#[derive(Debug, Clone, Default)]
pub struct PathSelection {
    selected: Vec<SelectedPath>,
    numpos: usize,
}

impl PathSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a selection, assigning its result position.
    pub fn add(&mut self, mut selected: SelectedPath) {
        selected.position = self.numpos;
        self.numpos += selected.column_count;
        self.selected.push(selected);
    }

    /// Append a plain path.
    pub fn add_path(&mut self, path: Path, flags: SelectedFlags) {
        self.add(SelectedPath::new(SelectedObject::path(path), flags));
    }

    pub fn iter(&self) -> impl Iterator<Item = &SelectedPath> {
        self.selected.iter()
    }

    pub fn get(&self, index: usize) -> Option<&SelectedPath> {
        self.selected.get(index)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Total physical columns of all selections.
    pub fn column_count(&self) -> usize {
        self.numpos
    }
}

impl<'a> IntoIterator for &'a PathSelection {
    type Item = &'a SelectedPath;
    type IntoIter = std::slice::Iter<'a, SelectedPath>;

    fn into_iter(self) -> Self::IntoIter {
        self.selected.iter()
    }
}
