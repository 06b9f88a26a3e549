//! Typed values carried by paths, criteria and query results.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Error;
use crate::schema::ValueType;

/// A point in time with the GMT offset it was recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Time {
    /// Seconds since the Unix epoch (UTC).
    pub sec: i64,
    /// Microseconds.
    pub usec: u32,
    /// Offset from GMT in seconds.
    pub gmt_offset: i32,
}

impl Time {
    /// Create a UTC time from seconds since the epoch.
    pub fn from_secs(sec: i64) -> Self {
        Self {
            sec,
            usec: 0,
            gmt_offset: 0,
        }
    }

    /// Set the microseconds.
    pub fn with_usec(mut self, usec: u32) -> Self {
        self.usec = usec;
        self
    }

    /// Set the GMT offset.
    pub fn with_gmt_offset(mut self, gmt_offset: i32) -> Self {
        self.gmt_offset = gmt_offset;
        self
    }

    /// Convert to a UTC `chrono` timestamp.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.sec, self.usec.saturating_mul(1000)).single()
    }

    /// Parse a textual timestamp.
    ///
    /// Accepts RFC 3339 (`2024-03-01T12:00:00+01:00`) and the SQL form
    /// `2024-03-01 12:00:00`, the latter read as UTC.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let text = text.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Ok(Self {
                sec: dt.timestamp(),
                usec: dt.timestamp_subsec_micros(),
                gmt_offset: dt.offset().local_minus_utc(),
            });
        }

        for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
                let dt = naive.and_utc();
                return Ok(Self {
                    sec: dt.timestamp(),
                    usec: dt.timestamp_subsec_micros(),
                    gmt_offset: 0,
                });
            }
        }

        Err(Error::value(text, ValueType::Time))
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(dt) = self.to_datetime() else {
            return write!(f, "{}", self.sec);
        };
        match FixedOffset::east_opt(self.gmt_offset) {
            Some(offset) => write!(
                f,
                "{}",
                dt.with_timezone(&offset).format("%Y-%m-%dT%H:%M:%S%.6f%:z")
            ),
            None => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.6fZ")),
        }
    }
}

/// A typed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(String),
    Enum(String),
    Time(Time),
    Data(Vec<u8>),
}

impl Value {
    /// Parse text into a value of the given type.
    pub fn parse(value_type: ValueType, text: &str) -> Result<Self, Error> {
        fn num<T: std::str::FromStr>(text: &str, ty: ValueType) -> Result<T, Error> {
            text.trim().parse::<T>().map_err(|_| Error::value(text, ty))
        }

        Ok(match value_type {
            ValueType::Int8 => Value::Int8(num(text, value_type)?),
            ValueType::UInt8 => Value::UInt8(num(text, value_type)?),
            ValueType::Int16 => Value::Int16(num(text, value_type)?),
            ValueType::UInt16 => Value::UInt16(num(text, value_type)?),
            ValueType::Int32 => Value::Int32(num(text, value_type)?),
            ValueType::UInt32 => Value::UInt32(num(text, value_type)?),
            ValueType::Int64 => Value::Int64(num(text, value_type)?),
            ValueType::UInt64 => Value::UInt64(num(text, value_type)?),
            ValueType::Float => Value::Float(num(text, value_type)?),
            ValueType::Double => Value::Double(num(text, value_type)?),
            ValueType::String => Value::String(text.to_string()),
            ValueType::Enum => Value::Enum(text.to_string()),
            ValueType::Time => Value::Time(Time::parse(text)?),
            ValueType::Data => Value::Data(text.as_bytes().to_vec()),
        })
    }

    /// The type of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Int8(_) => ValueType::Int8,
            Value::UInt8(_) => ValueType::UInt8,
            Value::Int16(_) => ValueType::Int16,
            Value::UInt16(_) => ValueType::UInt16,
            Value::Int32(_) => ValueType::Int32,
            Value::UInt32(_) => ValueType::UInt32,
            Value::Int64(_) => ValueType::Int64,
            Value::UInt64(_) => ValueType::UInt64,
            Value::Float(_) => ValueType::Float,
            Value::Double(_) => ValueType::Double,
            Value::String(_) => ValueType::String,
            Value::Enum(_) => ValueType::Enum,
            Value::Time(_) => ValueType::Time,
            Value::Data(_) => ValueType::Data,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Enum(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as an unsigned 64-bit integer.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt8(v) => Some(*v as u64),
            Value::UInt16(v) => Some(*v as u64),
            Value::UInt32(v) => Some(*v as u64),
            Value::UInt64(v) => Some(*v),
            Value::Int8(v) => u64::try_from(*v).ok(),
            Value::Int16(v) => u64::try_from(*v).ok(),
            Value::Int32(v) => u64::try_from(*v).ok(),
            Value::Int64(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Try to get as time.
    pub fn as_time(&self) -> Option<&Time> {
        match self {
            Value::Time(t) => Some(t),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int8(v) => write!(f, "{}", v),
            Value::UInt8(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::UInt16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::UInt32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::UInt64(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::String(s) | Value::Enum(s) => f.write_str(s),
            Value::Time(t) => write!(f, "{}", t),
            Value::Data(d) => f.write_str(&String::from_utf8_lossy(d)),
        }
    }
}
