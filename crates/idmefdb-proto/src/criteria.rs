//! Boolean criteria over object paths.
//!
//! A [`Criteria`] tree is immutable once built. Leaves are [`Criterion`]
//! comparisons; interior nodes combine them with AND, OR and NOT.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Error;
use crate::path::Path;
use crate::schema::ValueType;
use crate::value::Value;

/// Base comparison performed by a criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relation {
    Equal,
    Lesser,
    LesserOrEqual,
    Greater,
    GreaterOrEqual,
    /// Substring match, `*` acting as a wildcard.
    Substr,
    Regex,
    /// The value is NULL (no value).
    Null,
}

/// A comparison operator: a relation plus case and negation modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CriterionOperator {
    relation: Relation,
    nocase: bool,
    negated: bool,
}

impl CriterionOperator {
    pub const EQUAL: Self = Self::new(Relation::Equal);
    pub const NOT_EQUAL: Self = Self::EQUAL.negate();
    pub const EQUAL_NOCASE: Self = Self::EQUAL.nocase();
    pub const NOT_EQUAL_NOCASE: Self = Self::NOT_EQUAL.nocase();
    pub const LESSER: Self = Self::new(Relation::Lesser);
    pub const LESSER_OR_EQUAL: Self = Self::new(Relation::LesserOrEqual);
    pub const GREATER: Self = Self::new(Relation::Greater);
    pub const GREATER_OR_EQUAL: Self = Self::new(Relation::GreaterOrEqual);
    pub const SUBSTR: Self = Self::new(Relation::Substr);
    pub const NOT_SUBSTR: Self = Self::SUBSTR.negate();
    pub const SUBSTR_NOCASE: Self = Self::SUBSTR.nocase();
    pub const NOT_SUBSTR_NOCASE: Self = Self::NOT_SUBSTR.nocase();
    pub const REGEX: Self = Self::new(Relation::Regex);
    pub const NOT_REGEX: Self = Self::REGEX.negate();
    pub const REGEX_NOCASE: Self = Self::REGEX.nocase();
    pub const NOT_REGEX_NOCASE: Self = Self::NOT_REGEX.nocase();
    pub const NULL: Self = Self::new(Relation::Null);
    pub const NOT_NULL: Self = Self::NULL.negate();

    /// Create a case-sensitive, non-negated operator.
    pub const fn new(relation: Relation) -> Self {
        Self {
            relation,
            nocase: false,
            negated: false,
        }
    }

    /// Return the case-insensitive form.
    pub const fn nocase(mut self) -> Self {
        self.nocase = true;
        self
    }

    /// Toggle the NOT modifier.
    pub const fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    pub fn relation(&self) -> Relation {
        self.relation
    }

    pub fn is_nocase(&self) -> bool {
        self.nocase
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// Check if this is the NULL or NOT NULL check.
    pub fn is_null_check(&self) -> bool {
        self.relation == Relation::Null
    }

    /// The same operator without the NOT modifier.
    pub fn positive(&self) -> Self {
        Self {
            negated: false,
            ..*self
        }
    }
}

impl fmt::Display for CriterionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.relation == Relation::Null {
            return f.write_str(if self.negated { "is not null" } else { "is null" });
        }
        let base = match (self.relation, self.negated) {
            (Relation::Equal, false) => "==",
            (Relation::Equal, true) => "!=",
            (Relation::Lesser, _) => "<",
            (Relation::LesserOrEqual, _) => "<=",
            (Relation::Greater, _) => ">",
            (Relation::GreaterOrEqual, _) => ">=",
            (Relation::Substr, _) => "<>",
            (Relation::Regex, _) => "~",
            (Relation::Null, _) => "",
        };
        let negation = match self.relation {
            Relation::Equal => "",
            _ if self.negated => "!",
            _ => "",
        };
        write!(f, "{}{}{}", negation, base, if self.nocase { "*" } else { "" })
    }
}

/// A partially specified calendar time. Unset components match anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BrokenDownTime {
    pub year: Option<i32>,
    pub month: Option<i32>,
    pub yday: Option<i32>,
    pub mday: Option<i32>,
    pub wday: Option<i32>,
    pub hour: Option<i32>,
    pub min: Option<i32>,
    pub sec: Option<i32>,
}

impl BrokenDownTime {
    /// Parse `key:value` pairs separated by whitespace, e.g. `year:2024 month:3`.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut time = BrokenDownTime::default();

        for pair in text.split_whitespace() {
            let (key, value) = pair
                .split_once(':')
                .ok_or_else(|| Error::InvalidBrokenDownTime(format!("expected key:value, got '{}'", pair)))?;
            let value: i32 = value
                .parse()
                .map_err(|_| Error::InvalidBrokenDownTime(format!("invalid number '{}'", value)))?;

            let (slot, range) = match key {
                "year" => (&mut time.year, 0..=9999),
                "month" => (&mut time.month, 1..=12),
                "yday" => (&mut time.yday, 1..=366),
                "mday" => (&mut time.mday, 1..=31),
                "wday" => (&mut time.wday, 0..=7),
                "hour" => (&mut time.hour, 0..=23),
                "min" => (&mut time.min, 0..=59),
                "sec" => (&mut time.sec, 0..=60),
                other => {
                    return Err(Error::InvalidBrokenDownTime(format!("unknown component '{}'", other)))
                }
            };
            if !range.contains(&value) {
                return Err(Error::InvalidBrokenDownTime(format!("{} out of range: {}", key, value)));
            }
            *slot = Some(value);
        }

        if time.is_empty() {
            return Err(Error::InvalidBrokenDownTime("no component set".into()));
        }

        Ok(time)
    }

    /// Check if no component is set.
    pub fn is_empty(&self) -> bool {
        *self == BrokenDownTime::default()
    }
}

impl fmt::Display for BrokenDownTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = [
            ("year", self.year),
            ("month", self.month),
            ("yday", self.yday),
            ("mday", self.mday),
            ("wday", self.wday),
            ("hour", self.hour),
            ("min", self.min),
            ("sec", self.sec),
        ];
        let mut first = true;
        for (name, value) in parts {
            if let Some(value) = value {
                if !first {
                    f.write_str(" ")?;
                }
                write!(f, "{}:{}", name, value)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// The right-hand side of a criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CriterionValue {
    /// A typed literal.
    Fixed(Value),
    /// A regular expression.
    Regex(String),
    /// A partially specified time.
    BrokenDownTime(BrokenDownTime),
}

/// A single comparison: path, operator and value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    path: Path,
    operator: CriterionOperator,
    value: Option<CriterionValue>,
}

impl Criterion {
    /// Create a criterion, checking the value against the operator and path.
    pub fn new(
        path: Path,
        operator: CriterionOperator,
        value: Option<CriterionValue>,
    ) -> Result<Self, Error> {
        match (&value, operator.relation()) {
            (Some(_), Relation::Null) => {
                return Err(Error::InvalidCriterion(format!(
                    "operator '{}' takes no value",
                    operator
                )));
            }
            (None, Relation::Null) => {}
            (None, _) => {
                return Err(Error::InvalidCriterion(format!(
                    "operator '{}' requires a value",
                    operator
                )));
            }
            (Some(CriterionValue::Regex(_)), Relation::Regex) => {}
            (Some(CriterionValue::Regex(_)), _) => {
                return Err(Error::InvalidCriterion(
                    "regular expression used with a non-regex operator".into(),
                ));
            }
            (Some(CriterionValue::BrokenDownTime(_)), relation) => {
                if path.value_type() != Some(ValueType::Time) {
                    return Err(Error::InvalidCriterion(format!(
                        "broken-down time used on non-time path '{}'",
                        path
                    )));
                }
                if matches!(relation, Relation::Substr | Relation::Regex) {
                    return Err(Error::InvalidCriterion(format!(
                        "operator '{}' cannot match a broken-down time",
                        operator
                    )));
                }
            }
            (Some(CriterionValue::Fixed(_)), _) => {}
        }

        Ok(Self {
            path,
            operator,
            value,
        })
    }

    /// Shortcut for a criterion with a fixed value.
    pub fn fixed(path: Path, operator: CriterionOperator, value: Value) -> Result<Self, Error> {
        Self::new(path, operator, Some(CriterionValue::Fixed(value)))
    }

    /// Shortcut for a NULL / NOT NULL check.
    pub fn null_check(path: Path, is_null: bool) -> Self {
        let operator = if is_null {
            CriterionOperator::NULL
        } else {
            CriterionOperator::NOT_NULL
        };
        Self {
            path,
            operator,
            value: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn operator(&self) -> CriterionOperator {
        self.operator
    }

    pub fn value(&self) -> Option<&CriterionValue> {
        self.value.as_ref()
    }
}

/// Boolean expression tree of criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Criteria {
    Criterion(Criterion),
    And(Box<Criteria>, Box<Criteria>),
    Or(Box<Criteria>, Box<Criteria>),
    Not(Box<Criteria>),
}

impl Criteria {
    /// Combine with another tree using AND.
    pub fn and(self, other: Criteria) -> Criteria {
        Criteria::And(Box::new(self), Box::new(other))
    }

    /// Combine with another tree using OR.
    pub fn or(self, other: Criteria) -> Criteria {
        Criteria::Or(Box::new(self), Box::new(other))
    }

    /// Negate this tree.
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Criteria {
        Criteria::Not(Box::new(self))
    }

    /// Visit every criterion leaf, left to right.
    pub fn for_each_criterion<'a>(&'a self, f: &mut impl FnMut(&'a Criterion)) {
        match self {
            Criteria::Criterion(c) => f(c),
            Criteria::And(a, b) | Criteria::Or(a, b) => {
                a.for_each_criterion(f);
                b.for_each_criterion(f);
            }
            Criteria::Not(inner) => inner.for_each_criterion(f),
        }
    }
}

impl From<Criterion> for Criteria {
    fn from(criterion: Criterion) -> Self {
        Criteria::Criterion(criterion)
    }
}
