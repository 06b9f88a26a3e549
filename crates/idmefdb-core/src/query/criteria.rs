//! WHERE clause rendering of a criteria tree.

use idmefdb_proto::Criteria;

use super::join::Join;
use super::path_resolve::{resolve_field, FieldContext};
use crate::error::Error;
use crate::sql::Sql;

/// Render `criteria` as a WHERE clause body, joining every table it uses.
///
/// AND is rendered bare, OR wraps each operand, and an OR operand of an AND
/// is parenthesized as a whole so that precedence survives.
pub fn resolve_criteria(sql: &Sql, criteria: &Criteria, join: &mut Join) -> Result<String, Error> {
    match criteria {
        Criteria::Criterion(criterion) => {
            let field = resolve_field(criterion.path(), FieldContext::Where, join)?;
            sql.build_criterion_string(&field, criterion.operator(), criterion.value())
        }
        Criteria::And(left, right) => Ok(format!(
            "{} AND {}",
            and_operand(sql, left, join)?,
            and_operand(sql, right, join)?
        )),
        Criteria::Or(left, right) => Ok(format!(
            "({}) OR ({})",
            resolve_criteria(sql, left, join)?,
            resolve_criteria(sql, right, join)?
        )),
        Criteria::Not(inner) => Ok(format!("NOT({})", resolve_criteria(sql, inner, join)?)),
    }
}

fn and_operand(sql: &Sql, criteria: &Criteria, join: &mut Join) -> Result<String, Error> {
    let text = resolve_criteria(sql, criteria, join)?;
    Ok(match criteria {
        Criteria::Or(..) => format!("({})", text),
        _ => text,
    })
}
