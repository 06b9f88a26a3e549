//! CLI error type.

use thiserror::Error;

/// Errors surfaced to the command line.
#[derive(Debug, Error)]
pub enum CliError {
    /// Database or query compilation failure.
    #[error(transparent)]
    Db(#[from] idmefdb_core::Error),

    /// A selection or criteria string did not parse.
    #[error("{0}")]
    Lang(String),

    /// Output could not be rendered.
    #[error("output error: {0}")]
    Output(String),
}

impl CliError {
    /// Wrap a parse error, rendering it against the text it came from.
    pub fn lang(error: idmefdb_lang::LangError, source: &str) -> Self {
        CliError::Lang(error.format_with_source(source))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Output(e.to_string())
    }
}
