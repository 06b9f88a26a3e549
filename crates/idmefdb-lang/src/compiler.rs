//! Compiler from syntax trees to criteria and selected paths.

use crate::ast::*;
use crate::error::{CompileError, CompileErrorKind};
use crate::span::Spanned;
use idmefdb_core::{FunctionKind, SelectedFlags, SelectedObject, SelectedPath, TimeUnit};
use idmefdb_proto::{BrokenDownTime, Criteria, Criterion, CriterionValue, Path, Relation, Value};

/// Compile a criteria tree, typing every value against its path.
pub fn compile_criteria(expr: &CriteriaExpr) -> Result<Criteria, CompileError> {
    match expr {
        CriteriaExpr::Criterion(c) => compile_criterion(c, false),
        CriteriaExpr::And(left, right) => {
            Ok(compile_criteria(left)?.and(compile_criteria(right)?))
        }
        CriteriaExpr::Or(left, right) => Ok(compile_criteria(left)?.or(compile_criteria(right)?)),
        CriteriaExpr::Not(inner, _) => match inner.as_ref() {
            // `!path` is the IS NULL test rather than NOT(IS NOT NULL).
            CriteriaExpr::Criterion(c) if c.operator.is_none() => compile_criterion(c, true),
            other => Ok(compile_criteria(other)?.not()),
        },
    }
}

fn compile_criterion(c: &CriterionExpr, is_null: bool) -> Result<Criteria, CompileError> {
    let path = compile_path(&c.path)?;
    let value_type = path.value_type().ok_or_else(|| {
        CompileError::new(
            format!("'{}' does not name a value", path),
            c.path.span,
            CompileErrorKind::InvalidPath,
        )
    })?;

    let (Some(operator), Some(value)) = (&c.operator, &c.value) else {
        return Ok(Criterion::null_check(path, is_null).into());
    };

    let text = value.value.text();
    let criterion_value = if operator.value.relation() == Relation::Regex {
        CriterionValue::Regex(text)
    } else if matches!(value.value, ValueExpr::BrokenDown(_)) {
        BrokenDownTime::parse(&text)
            .map(CriterionValue::BrokenDownTime)
            .map_err(|e| CompileError::invalid_value(e, value.span))?
    } else {
        Value::parse(value_type, &text)
            .map(CriterionValue::Fixed)
            .map_err(|e| CompileError::invalid_value(e, value.span))?
    };

    Criterion::new(path, operator.value, Some(criterion_value))
        .map(Criteria::from)
        .map_err(|e| CompileError::new(e.to_string(), c.span, CompileErrorKind::InvalidCriterion))
}

fn compile_path(path: &Spanned<String>) -> Result<Path, CompileError> {
    Path::parse(&path.value).map_err(|e| CompileError::invalid_path(e, path.span))
}

/// Compile one selection entry.
pub fn compile_selected(expr: &SelectedExpr) -> Result<SelectedPath, CompileError> {
    let object = compile_object(&expr.object)?;

    let mut flags = SelectedFlags::new();
    for flag in &expr.flags {
        flags = match flag.value.as_str() {
            "group_by" => flags.group_by(),
            "order_asc" => flags.order_asc(),
            "order_desc" => flags.order_desc(),
            other => return Err(CompileError::invalid_flag(other, flag.span)),
        };
    }

    Ok(SelectedPath::new(object, flags))
}

fn compile_object(object: &Spanned<ObjectExpr>) -> Result<SelectedObject, CompileError> {
    match &object.value {
        ObjectExpr::Path(text) => Path::parse(text)
            .map(SelectedObject::Path)
            .map_err(|e| CompileError::invalid_path(e, object.span)),
        ObjectExpr::String(s) => Ok(SelectedObject::String(s.clone())),
        ObjectExpr::Int(i) => Ok(SelectedObject::Int(*i)),
        ObjectExpr::Function { name, args } => {
            let kind = FunctionKind::from_name(&name.value)
                .ok_or_else(|| CompileError::unknown_function(&name.value, name.span))?;

            let args = args
                .iter()
                .enumerate()
                .map(|(index, arg)| {
                    if is_unit_argument(kind, index) {
                        compile_time_unit(arg)
                    } else {
                        compile_object(arg)
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;

            SelectedObject::function(kind, args).map_err(|e| {
                CompileError::new(e.to_string(), object.span, CompileErrorKind::InvalidArgument)
            })
        }
    }
}

fn is_unit_argument(kind: FunctionKind, index: usize) -> bool {
    matches!(
        (kind, index),
        (FunctionKind::Extract, 1) | (FunctionKind::Interval, 2)
    )
}

/// Time units are written by name and carried as their numeric code.
fn compile_time_unit(arg: &Spanned<ObjectExpr>) -> Result<SelectedObject, CompileError> {
    let unit = match &arg.value {
        ObjectExpr::Path(name) | ObjectExpr::String(name) => TimeUnit::from_name(name),
        ObjectExpr::Int(code) => i32::try_from(*code).ok().and_then(TimeUnit::from_code),
        ObjectExpr::Function { name, .. } => {
            return Err(CompileError::invalid_time_unit(&name.value, arg.span))
        }
    };

    unit.map(|u| SelectedObject::Int(i64::from(u.code())))
        .ok_or_else(|| CompileError::invalid_time_unit(&describe(&arg.value), arg.span))
}

fn describe(object: &ObjectExpr) -> String {
    match object {
        ObjectExpr::Path(text) | ObjectExpr::String(text) => text.clone(),
        ObjectExpr::Int(i) => i.to_string(),
        ObjectExpr::Function { name, .. } => format!("{}()", name.value),
    }
}
