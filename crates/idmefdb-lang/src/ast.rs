//! Syntax trees for criteria and selection strings.

use crate::span::{Span, Spanned};
use idmefdb_proto::CriterionOperator;

/// A parsed criteria expression.
#[derive(Debug, Clone, PartialEq)]
pub enum CriteriaExpr {
    Criterion(CriterionExpr),
    And(Box<CriteriaExpr>, Box<CriteriaExpr>),
    Or(Box<CriteriaExpr>, Box<CriteriaExpr>),
    /// `!expr`; the span covers the bang and its operand.
    Not(Box<CriteriaExpr>, Span),
}

impl CriteriaExpr {
    pub fn span(&self) -> Span {
        match self {
            CriteriaExpr::Criterion(c) => c.span,
            CriteriaExpr::And(l, r) | CriteriaExpr::Or(l, r) => l.span().merge(r.span()),
            CriteriaExpr::Not(_, span) => *span,
        }
    }
}

/// `path [operator value]`. Without an operator the criterion is a
/// presence test.
#[derive(Debug, Clone, PartialEq)]
pub struct CriterionExpr {
    /// Canonical path text, e.g. `alert.source(0).node.name`.
    pub path: Spanned<String>,
    pub operator: Option<Spanned<CriterionOperator>>,
    pub value: Option<Spanned<ValueExpr>>,
    pub span: Span,
}

/// Right-hand side of a criterion.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueExpr {
    /// A quoted string.
    Quoted(String),
    /// An unquoted run of adjacent tokens, such as `10.0.0.1` or `high`.
    Bare(String),
    /// `key:value` pairs such as `year:2024 month:3`.
    BrokenDown(Vec<(String, i64)>),
}

impl ValueExpr {
    /// The value as text, with broken-down pairs joined by spaces.
    pub fn text(&self) -> String {
        match self {
            ValueExpr::Quoted(s) | ValueExpr::Bare(s) => s.clone(),
            ValueExpr::BrokenDown(pairs) => pairs
                .iter()
                .map(|(key, value)| format!("{}:{}", key, value))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// A selectable expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectExpr {
    /// A path, or a bare word such as a time unit.
    Path(String),
    String(String),
    Int(i64),
    Function {
        name: Spanned<String>,
        args: Vec<Spanned<ObjectExpr>>,
    },
}

/// `object[/flag,flag...]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedExpr {
    pub object: Spanned<ObjectExpr>,
    pub flags: Vec<Spanned<String>>,
    pub span: Span,
}
