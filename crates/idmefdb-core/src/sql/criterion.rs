//! Rendering of a single criterion as SQL text.

use chrono::{Duration, Months, NaiveDate};

use idmefdb_proto::{BrokenDownTime, CriterionOperator, CriterionValue, Relation, Time, Value};

use super::dialect::TimeUnit;
use super::session::Sql;
use super::timestamp::time_to_timestamp;
use crate::error::Error;

impl Sql {
    /// Render `field <op> value` for one criterion.
    ///
    /// NULL checks render `IS [NOT] NULL`. A negated operator on an ordinary
    /// value also matches NULL rows: `(field IS NULL OR field <op> value)`.
    pub fn build_criterion_string(
        &self,
        field: &str,
        operator: CriterionOperator,
        value: Option<&CriterionValue>,
    ) -> Result<String, Error> {
        if operator.is_null_check() {
            return Ok(if operator.is_negated() {
                format!("{} IS NOT NULL", field)
            } else {
                format!("{} IS NULL", field)
            });
        }

        let value = value.ok_or_else(|| {
            Error::Query(format!("operator '{}' requires a value", operator))
        })?;

        let text = match value {
            CriterionValue::BrokenDownTime(time) => {
                return self.build_broken_down_time_string(field, operator, time);
            }
            CriterionValue::Regex(regex) => self.escape(Some(regex.as_str()))?,
            CriterionValue::Fixed(value) => self.build_fixed_value_string(operator, value)?,
        };

        let constraint = self.dialect().build_constraint_string(field, operator, &text)?;
        if operator.is_negated() {
            Ok(format!("({} IS NULL OR {})", field, constraint))
        } else {
            Ok(constraint)
        }
    }

    fn build_fixed_value_string(
        &self,
        operator: CriterionOperator,
        value: &Value,
    ) -> Result<String, Error> {
        match value {
            Value::Time(time) => self.build_timestamp_string(time),
            Value::Data(data) => self.escape_binary(data),
            Value::String(text) if operator.relation() == Relation::Substr => {
                self.escape(Some(like_pattern(text).as_str()))
            }
            other => self.escape(Some(other.to_string().as_str())),
        }
    }

    fn build_broken_down_time_string(
        &self,
        field: &str,
        operator: CriterionOperator,
        time: &BrokenDownTime,
    ) -> Result<String, Error> {
        match (operator.relation(), operator.is_negated()) {
            (Relation::Equal, false) => self.build_time_equal_string(field, time),
            (Relation::Equal, true) => {
                Ok(format!("NOT({})", self.build_time_equal_string(field, time)?))
            }
            (
                Relation::Lesser
                | Relation::LesserOrEqual
                | Relation::Greater
                | Relation::GreaterOrEqual,
                false,
            ) => self.build_time_ordering_string(field, operator, time),
            _ => Err(Error::Query(format!(
                "operator '{}' cannot compare a broken-down time",
                operator
            ))),
        }
    }

    fn build_time_equal_string(&self, field: &str, time: &BrokenDownTime) -> Result<String, Error> {
        let gmt_offset = self.config().gmt_offset;
        let components = [
            (TimeUnit::Year, time.year),
            (TimeUnit::Month, time.month),
            (TimeUnit::YDay, time.yday),
            (TimeUnit::MDay, time.mday),
            (TimeUnit::WDay, time.wday),
            (TimeUnit::Hour, time.hour),
            (TimeUnit::Min, time.min),
            (TimeUnit::Sec, time.sec),
        ];

        let mut parts = Vec::new();
        for (unit, value) in components {
            if let Some(value) = value {
                parts.push(self.dialect().build_time_constraint_string(
                    field,
                    unit,
                    CriterionOperator::EQUAL,
                    value,
                    gmt_offset,
                )?);
            }
        }

        if parts.is_empty() {
            return Err(Error::Query("empty broken-down time".into()));
        }
        Ok(parts.join(" AND "))
    }

    fn build_time_ordering_string(
        &self,
        field: &str,
        operator: CriterionOperator,
        time: &BrokenDownTime,
    ) -> Result<String, Error> {
        let gmt_offset = self.config().gmt_offset;
        let bound = Bound::of(operator.relation());

        if let Some(year) = time.year {
            let sec = timestamp_bound(year, time, bound.past_end, gmt_offset)?;
            let literal = time_to_timestamp(&Time::from_secs(sec))?;
            return self
                .dialect()
                .build_constraint_string(field, bound.operator, &literal);
        }

        if let Some(hour) = time.hour {
            let total = seconds_of_day_bound(hour, time.min, time.sec, bound.past_end)
                .ok_or_else(|| Error::Query(format!("invalid broken-down time '{}'", time)))?;
            let dialect = self.dialect();
            return Ok(format!(
                "{} * 3600 + {} * 60 + {} {} {}",
                dialect.build_time_extract_string(field, TimeUnit::Hour, gmt_offset)?,
                dialect.build_time_extract_string(field, TimeUnit::Min, gmt_offset)?,
                dialect.build_time_extract_string(field, TimeUnit::Sec, gmt_offset)?,
                dialect.operator_string(bound.operator).unwrap_or(">="),
                total
            ));
        }

        let single = [
            (TimeUnit::YDay, time.yday),
            (TimeUnit::WDay, time.wday),
            (TimeUnit::Month, time.month),
            (TimeUnit::MDay, time.mday),
        ];
        for (unit, value) in single {
            if let Some(value) = value {
                return self.dialect().build_time_constraint_string(
                    field, unit, operator, value, gmt_offset,
                );
            }
        }

        Err(Error::Query("broken-down time has no usable component".into()))
    }
}

/// How an ordering operator maps onto a half-open bound.
struct Bound {
    /// Compare against the end of the named period rather than its start.
    past_end: bool,
    operator: CriterionOperator,
}

impl Bound {
    fn of(relation: Relation) -> Self {
        match relation {
            Relation::Greater => Bound {
                past_end: true,
                operator: CriterionOperator::GREATER_OR_EQUAL,
            },
            Relation::LesserOrEqual => Bound {
                past_end: true,
                operator: CriterionOperator::LESSER,
            },
            Relation::Lesser => Bound {
                past_end: false,
                operator: CriterionOperator::LESSER,
            },
            _ => Bound {
                past_end: false,
                operator: CriterionOperator::GREATER_OR_EQUAL,
            },
        }
    }
}

/// UTC seconds of the start (or end) of the period named by a broken-down
/// time whose year is set. The finest set component among month, mday,
/// hour, min and sec defines the period.
fn timestamp_bound(
    year: i32,
    time: &BrokenDownTime,
    past_end: bool,
    gmt_offset: i32,
) -> Result<i64, Error> {
    let invalid = || Error::Query(format!("invalid broken-down time '{}'", time));
    let step = i64::from(past_end);

    let mut local = NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(invalid)?;

    let Some(month) = time.month else {
        return local
            .checked_add_months(Months::new(12 * step as u32))
            .map(|t| t.and_utc().timestamp() - i64::from(gmt_offset))
            .ok_or_else(invalid);
    };
    local = local
        .checked_add_months(Months::new(month.saturating_sub(1) as u32))
        .ok_or_else(invalid)?;

    let extra = match (time.mday, time.hour, time.min, time.sec) {
        (None, ..) => {
            local = local
                .checked_add_months(Months::new(step as u32))
                .ok_or_else(invalid)?;
            Duration::zero()
        }
        (Some(mday), None, ..) => Duration::days(i64::from(mday) - 1 + step),
        (Some(mday), Some(hour), None, _) => {
            Duration::days(i64::from(mday) - 1) + Duration::hours(i64::from(hour) + step)
        }
        (Some(mday), Some(hour), Some(min), None) => {
            Duration::days(i64::from(mday) - 1)
                + Duration::hours(i64::from(hour))
                + Duration::minutes(i64::from(min) + step)
        }
        (Some(mday), Some(hour), Some(min), Some(sec)) => {
            Duration::days(i64::from(mday) - 1)
                + Duration::hours(i64::from(hour))
                + Duration::minutes(i64::from(min))
                + Duration::seconds(i64::from(sec) + step)
        }
    };

    let local = local.checked_add_signed(extra).ok_or_else(invalid)?;
    Ok(local.and_utc().timestamp() - i64::from(gmt_offset))
}

/// Seconds since midnight of the start (or end) of an hour, minute or second.
/// `None` when the components overflow.
fn seconds_of_day_bound(
    hour: i32,
    min: Option<i32>,
    sec: Option<i32>,
    past_end: bool,
) -> Option<i32> {
    let step = i32::from(past_end);
    let hours = |h: i32| h.checked_mul(3600);
    let minutes = |m: i32| m.checked_mul(60);
    match (min, sec) {
        (None, _) => hours(hour.checked_add(step)?),
        (Some(min), None) => hours(hour)?.checked_add(minutes(min.checked_add(step)?)?),
        (Some(min), Some(sec)) => hours(hour)?
            .checked_add(minutes(min)?)?
            .checked_add(sec.checked_add(step)?),
    }
}

/// Translate a wildcard pattern to LIKE syntax: `*` becomes `%`, `\*` a
/// literal star.
fn like_pattern(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push('%'),
            '\\' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push('*');
            }
            c => out.push(c),
        }
    }
    out
}
