//! Text front-ends for idmefdb.
//!
//! Two small languages are supported:
//!
//! - **Criteria strings** filter messages:
//!   `alert.classification.text == 'ssh' && !alert.assessment.impact.severity`
//! - **Selection strings** name what a value query returns:
//!   `count(alert.create_time)/group_by,order_desc`
//!
//! # Criteria syntax
//!
//! ```text
//! alert.source(0).node.address(*).address <>* '10.0.'   # case-insensitive substring
//! alert.create_time >= year:2024 month:3                # broken-down time
//! alert.messageid                                       # IS NOT NULL
//! !alert.messageid                                      # IS NULL
//! (a == 1 || a == 2) && !(b ~ '^x')                     # grouping
//! ```
//!
//! Operators are `==` (or `=`), `!=`, `<`, `<=`, `>`, `>=`, `<>`, `!<>`, `~`
//! and `!~`; a trailing `*` makes the comparison case-insensitive.
//!
//! # Selection syntax
//!
//! ```text
//! alert.classification.text/group_by
//! extract(alert.create_time, hour)/order_asc
//! interval(alert.create_time, -1, hour)
//! timezone(alert.create_time, 'Europe/Paris')
//! ```

pub mod ast;
pub mod compiler;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod span;

pub use compiler::{compile_criteria, compile_selected};
pub use error::{CompileError, CompileErrorKind, LangError, ParseError};
pub use lexer::tokenize;
pub use parser::{parse_criteria, parse_selected, Parser};
pub use span::{Span, Spanned};

use idmefdb_core::{PathSelection, SelectedPath};
use idmefdb_proto::Criteria;

/// Parse and compile a criteria string.
pub fn criteria_from_str(source: &str) -> Result<Criteria, LangError> {
    let expr = parse_criteria(source)?;
    Ok(compile_criteria(&expr)?)
}

/// Parse and compile one selection string.
///
/// Every failure is reported as [`LangError::InvalidSelectedObjectString`].
pub fn selected_path_from_str(source: &str) -> Result<SelectedPath, LangError> {
    let invalid = |reason: String, span: Span| LangError::InvalidSelectedObjectString {
        input: source.to_string(),
        reason,
        span,
    };

    let expr = parse_selected(source).map_err(|e| invalid(e.message, e.span))?;
    compile_selected(&expr).map_err(|e| invalid(e.message, e.span))
}

/// Build a selection from several selection strings, in order.
pub fn selection_from_strs<I, S>(sources: I) -> Result<PathSelection, LangError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut selection = PathSelection::new();
    for source in sources {
        selection.add(selected_path_from_str(source.as_ref())?);
    }
    Ok(selection)
}
