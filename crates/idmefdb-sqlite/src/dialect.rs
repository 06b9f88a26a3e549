//! SQLite syntax rules.

use idmefdb_core::sql::time_to_timestamp;
use idmefdb_core::{Connection, Dialect, Error, Settings, TimeUnit};
use idmefdb_proto::{CriterionOperator, Relation, Time};

use crate::connection::SqliteConnection;

/// The SQLite dialect, registered as `sqlite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    pub const NAME: &'static str = "sqlite";

    pub fn new() -> Self {
        Self
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn open(&self, settings: &Settings) -> Result<Box<dyn Connection>, Error> {
        Ok(Box::new(SqliteConnection::open(settings)?))
    }

    fn operator_string(&self, operator: CriterionOperator) -> Option<&'static str> {
        Some(match (operator.relation(), operator.is_negated()) {
            (Relation::Equal, false) => "=",
            (Relation::Equal, true) => "!=",
            (Relation::Lesser, false) => "<",
            (Relation::LesserOrEqual, false) => "<=",
            (Relation::Greater, false) => ">",
            (Relation::GreaterOrEqual, false) => ">=",
            (Relation::Substr, false) => "LIKE",
            (Relation::Substr, true) => "NOT LIKE",
            (Relation::Regex, false) => "REGEXP",
            (Relation::Regex, true) => "NOT REGEXP",
            (Relation::Null, false) => "IS NULL",
            (Relation::Null, true) => "IS NOT NULL",
            _ => return None,
        })
    }

    /// Case-insensitive comparisons lower both sides, except regular
    /// expressions which get the `(?i)` flag so escapes like `\D` survive.
    fn build_constraint_string(
        &self,
        field: &str,
        operator: CriterionOperator,
        value: &str,
    ) -> Result<String, Error> {
        let op = self.operator_string(operator).ok_or_else(|| {
            Error::Query(format!("operator '{}' has no SQL equivalent", operator))
        })?;

        if operator.is_nocase() && operator.relation() == Relation::Regex {
            Ok(format!("{} {} ('(?i)' || {})", field, op, value))
        } else if operator.is_nocase() {
            Ok(format!("lower({}) {} lower({})", field, op, value))
        } else {
            Ok(format!("{} {} {}", field, op, value))
        }
    }

    fn build_time_extract_string(
        &self,
        field: &str,
        unit: TimeUnit,
        gmt_offset: i32,
    ) -> Result<String, Error> {
        let local = format!("DATETIME({}, '{} hours')", field, gmt_offset / 3600);
        let strftime =
            |format: &str| format!("CAST(STRFTIME('{}', {}) AS INTEGER)", format, local);

        Ok(match unit {
            TimeUnit::Year => strftime("%Y"),
            TimeUnit::Quarter => format!("(({} + 2) / 3)", strftime("%m")),
            TimeUnit::Month => strftime("%m"),
            TimeUnit::Week => strftime("%W"),
            TimeUnit::YDay => strftime("%j"),
            TimeUnit::MDay => strftime("%d"),
            TimeUnit::WDay => strftime("%w"),
            TimeUnit::Hour => strftime("%H"),
            TimeUnit::Min => strftime("%M"),
            TimeUnit::Sec => strftime("%S"),
            TimeUnit::MSec | TimeUnit::USec => {
                return Err(Error::Unsupported("sub-second time extraction"))
            }
        })
    }

    fn build_time_constraint_string(
        &self,
        field: &str,
        unit: TimeUnit,
        operator: CriterionOperator,
        value: i32,
        gmt_offset: i32,
    ) -> Result<String, Error> {
        let op = self.operator_string(operator).ok_or_else(|| {
            Error::Query(format!("operator '{}' cannot compare a time component", operator))
        })?;
        // 7 is also Sunday
        let value = if unit == TimeUnit::WDay { value % 7 } else { value };

        Ok(format!(
            "{} {} {}",
            self.build_time_extract_string(field, unit, gmt_offset)?,
            op,
            value
        ))
    }

    fn build_time_interval_string(
        &self,
        field: &str,
        value: &str,
        unit: TimeUnit,
    ) -> Result<String, Error> {
        let modifier = match unit {
            TimeUnit::Year => "years",
            TimeUnit::Month => "months",
            TimeUnit::MDay | TimeUnit::YDay | TimeUnit::WDay => "days",
            TimeUnit::Hour => "hours",
            TimeUnit::Min => "minutes",
            TimeUnit::Sec => "seconds",
            _ => return Err(Error::Unsupported("time interval unit")),
        };
        Ok(format!("DATETIME({}, '{} {}')", field, value, modifier))
    }

    fn build_limit_offset_string(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (Some(limit), Some(offset)) => format!(" LIMIT {}, {}", offset, limit),
            (Some(limit), None) => format!(" LIMIT {}", limit),
            (None, Some(offset)) => format!(" LIMIT {}, -1", offset),
            (None, None) => String::new(),
        }
    }

    fn build_timestamp_string(&self, time: &Time) -> Result<String, Error> {
        time_to_timestamp(time)
    }
}
