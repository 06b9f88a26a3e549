//! Query compilation and session configuration.

use chrono::{Local, Offset};

/// Options shared by statement builders and the SQL session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    /// Offset from GMT, in seconds, applied to broken-down time constraints.
    pub gmt_offset: i32,

    /// Suffix top-level function columns with `AS FUNC<n>`.
    pub alias_functions: bool,

    /// Wrap single non-SELECT statements in their own transaction.
    pub internal_transactions: bool,
}

impl QueryConfig {
    /// Default for `alias_functions`.
    pub const DEFAULT_ALIAS_FUNCTIONS: bool = false;

    /// Default for `internal_transactions`.
    pub const DEFAULT_INTERNAL_TRANSACTIONS: bool = false;

    /// Create a config using the local GMT offset.
    pub fn new() -> Self {
        Self {
            gmt_offset: local_gmt_offset(),
            alias_functions: Self::DEFAULT_ALIAS_FUNCTIONS,
            internal_transactions: Self::DEFAULT_INTERNAL_TRANSACTIONS,
        }
    }

    /// Create a config pinned to UTC.
    pub fn utc() -> Self {
        Self {
            gmt_offset: 0,
            ..Self::new()
        }
    }

    /// Set the GMT offset in seconds.
    pub fn with_gmt_offset(mut self, gmt_offset: i32) -> Self {
        self.gmt_offset = gmt_offset;
        self
    }

    /// Enable or disable `AS FUNC<n>` aliases.
    pub fn with_alias_functions(mut self, enabled: bool) -> Self {
        self.alias_functions = enabled;
        self
    }

    /// Enable or disable internal transactions.
    pub fn with_internal_transactions(mut self, enabled: bool) -> Self {
        self.internal_transactions = enabled;
        self
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Current offset of the local timezone from GMT, in seconds.
pub fn local_gmt_offset() -> i32 {
    Local::now().offset().fix().local_minus_utc()
}
