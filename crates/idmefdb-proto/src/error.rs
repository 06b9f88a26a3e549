//! Object model error types.

use thiserror::Error;

/// Errors raised while building or interpreting object model values.
#[derive(Debug, Error)]
pub enum Error {
    /// The object path text is malformed or names an unknown element.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A value could not be parsed into the requested type.
    #[error("invalid value '{value}' for type {expected}")]
    InvalidValue { value: String, expected: String },

    /// A broken-down time string is malformed.
    #[error("invalid broken-down time: {0}")]
    InvalidBrokenDownTime(String),

    /// A criterion was built from incompatible parts.
    #[error("invalid criterion: {0}")]
    InvalidCriterion(String),
}

impl Error {
    pub(crate) fn path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn value(value: impl Into<String>, expected: impl std::fmt::Display) -> Self {
        Error::InvalidValue {
            value: value.into(),
            expected: expected.to_string(),
        }
    }
}
