//! Errors of the criteria and selection front-ends.

use crate::span::{offset_to_column, Span};
use thiserror::Error;

/// Malformed criteria or selection text.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    /// Offending input.
    pub span: Span,
    /// Suggested fix, printed under the source line.
    pub hint: Option<String>,
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Format the error with the offending input underlined.
    pub fn format_with_source(&self, source: &str) -> String {
        let mut result = format!("error: {}\n", self.message);
        result.push_str(&underline(source, self.span));
        if let Some(hint) = &self.hint {
            result.push_str(&format!("   = hint: {}\n", hint));
        }
        result
    }
}

/// Error while turning a syntax tree into criteria or selections.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CompileError {
    pub message: String,
    pub span: Span,
    pub kind: CompileErrorKind,
}

/// What a [`CompileError`] rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    /// The object path does not exist in the message model.
    InvalidPath,
    /// A value does not parse as the path's leaf type.
    InvalidValue,
    /// Operator and value do not fit together.
    InvalidCriterion,
    UnknownFunction,
    /// A function was called with the wrong arguments.
    InvalidArgument,
    InvalidFlag,
    InvalidTimeUnit,
}

impl CompileError {
    pub fn new(message: impl Into<String>, span: Span, kind: CompileErrorKind) -> Self {
        Self {
            message: message.into(),
            span,
            kind,
        }
    }

    pub fn invalid_path(err: impl std::fmt::Display, span: Span) -> Self {
        Self::new(err.to_string(), span, CompileErrorKind::InvalidPath)
    }

    pub fn invalid_value(err: impl std::fmt::Display, span: Span) -> Self {
        Self::new(err.to_string(), span, CompileErrorKind::InvalidValue)
    }

    pub fn unknown_function(name: &str, span: Span) -> Self {
        Self::new(
            format!("unknown function '{}'", name),
            span,
            CompileErrorKind::UnknownFunction,
        )
    }

    pub fn invalid_flag(name: &str, span: Span) -> Self {
        Self::new(
            format!("unknown flag '{}'", name),
            span,
            CompileErrorKind::InvalidFlag,
        )
    }

    pub fn invalid_time_unit(name: &str, span: Span) -> Self {
        Self::new(
            format!("unknown time unit '{}'", name),
            span,
            CompileErrorKind::InvalidTimeUnit,
        )
    }

    /// Format the error with the offending input underlined.
    pub fn format_with_source(&self, source: &str) -> String {
        let mut result = format!("error[{:?}]: {}\n", self.kind, self.message);
        result.push_str(&underline(source, self.span));
        result
    }
}

fn underline(source: &str, span: Span) -> String {
    let col = offset_to_column(source, span.start);
    let width = source
        .get(span.start..span.end)
        .map(|s| s.chars().count())
        .unwrap_or(0)
        .max(1);
    format!(
        "  --> column {}\n   | {}\n   | {}{}\n",
        col,
        source,
        " ".repeat(col - 1),
        "^".repeat(width)
    )
}

/// Error returned by the string entry points.
#[derive(Debug, Error)]
pub enum LangError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    /// A selection string could not be turned into a selected object.
    #[error("invalid selected object string '{input}': {reason}")]
    InvalidSelectedObjectString {
        input: String,
        reason: String,
        span: Span,
    },
}

impl LangError {
    /// Format the error with source context.
    pub fn format_with_source(&self, source: &str) -> String {
        match self {
            LangError::Parse(e) => e.format_with_source(source),
            LangError::Compile(e) => e.format_with_source(source),
            LangError::InvalidSelectedObjectString { reason, span, .. } => {
                format!("error: {}\n{}", reason, underline(source, *span))
            }
        }
    }

    /// Get the span of the error.
    pub fn span(&self) -> Span {
        match self {
            LangError::Parse(e) => e.span,
            LangError::Compile(e) => e.span,
            LangError::InvalidSelectedObjectString { span, .. } => *span,
        }
    }
}
