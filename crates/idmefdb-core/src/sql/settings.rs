//! Connection settings string.
//!
//! Settings are whitespace separated `name=value` pairs:
//!
//! ```text
//! type=sqlite file=/var/lib/idmef.db log='/tmp/query log.txt'
//! ```
//!
//! Names are restricted to alphanumerics and underscore. Values are either
//! bare (terminated by whitespace) or quoted with `'` or `"`; a backslash
//! escapes the next character in both forms.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub const SETTING_HOST: &str = "host";
pub const SETTING_PORT: &str = "port";
pub const SETTING_NAME: &str = "name";
pub const SETTING_USER: &str = "user";
pub const SETTING_PASS: &str = "pass";
pub const SETTING_TYPE: &str = "type";
pub const SETTING_FILE: &str = "file";
pub const SETTING_LOG: &str = "log";

/// Database name used when `name` is not set.
pub const DEFAULT_NAME: &str = "prelude";

/// Parsed connection settings.
///
/// `Display` renders a string that parses back to the same settings,
/// password included. `Debug` masks the password.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    /// Create empty settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a settings string.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut settings = Settings::new();
        settings.set_from_string(text)?;
        Ok(settings)
    }

    /// Merge the pairs of a settings string into these settings.
    pub fn set_from_string(&mut self, text: &str) -> Result<(), Error> {
        let mut chars = text.chars().peekable();

        loop {
            while chars.next_if(|c| c.is_whitespace()).is_some() {}
            if chars.peek().is_none() {
                return Ok(());
            }

            let mut name = String::new();
            while let Some(c) = chars.next_if(|c| c.is_ascii_alphanumeric() || *c == '_') {
                name.push(c);
            }
            if name.is_empty() || chars.next() != Some('=') {
                return Err(Error::InvalidSettingsString(format!(
                    "expected name=value near '{}'",
                    name
                )));
            }

            let quote = chars.next_if(|c| *c == '\'' || *c == '"');
            let mut value = String::new();
            let mut escaped = false;
            let mut terminated = quote.is_none();

            for c in chars.by_ref() {
                if escaped {
                    value.push(c);
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if Some(c) == quote || (quote.is_none() && c.is_whitespace()) {
                    terminated = true;
                    break;
                } else {
                    value.push(c);
                }
            }

            if !terminated || escaped {
                return Err(Error::InvalidSettingsString(format!(
                    "unterminated value for '{}'",
                    name
                )));
            }

            self.values.insert(name, value);
        }
    }

    /// Set a value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Get a raw value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn host(&self) -> Option<&str> {
        self.get(SETTING_HOST)
    }

    pub fn port(&self) -> Option<&str> {
        self.get(SETTING_PORT)
    }

    /// Database name, `prelude` when unset.
    pub fn name(&self) -> &str {
        self.get(SETTING_NAME).unwrap_or(DEFAULT_NAME)
    }

    pub fn user(&self) -> Option<&str> {
        self.get(SETTING_USER)
    }

    pub fn pass(&self) -> Option<&str> {
        self.get(SETTING_PASS)
    }

    /// Dialect name used to pick a backend from the registry.
    pub fn dialect_type(&self) -> Option<&str> {
        self.get(SETTING_TYPE)
    }

    pub fn file(&self) -> Option<&str> {
        self.get(SETTING_FILE)
    }

    /// Path of the query log file.
    pub fn log(&self) -> Option<&str> {
        self.get(SETTING_LOG)
    }

    /// Iterate over all pairs, ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromStr for Settings {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Settings::parse(s)
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
            write!(f, "{}='{}'", name, escaped)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in &self.values {
            if name == SETTING_PASS {
                map.entry(name, &"***");
            } else {
                map.entry(name, value);
            }
        }
        map.finish()
    }
}
