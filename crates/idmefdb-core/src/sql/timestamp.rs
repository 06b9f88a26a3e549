//! Conversion between [`Time`] and SQL timestamp columns.
//!
//! Times are stored as three columns: a UTC `YYYY-MM-DD HH:MM:SS`
//! timestamp, the GMT offset in seconds, and the microseconds.

use chrono::{DateTime, NaiveDateTime};

use idmefdb_proto::{Time, ValueType};

use crate::error::Error;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Render the quoted UTC timestamp literal for a time.
pub fn time_to_timestamp(time: &Time) -> Result<String, Error> {
    let dt = DateTime::from_timestamp(time.sec, 0)
        .ok_or_else(|| Error::value(time.sec.to_string(), ValueType::Time))?;
    Ok(format!("'{}'", dt.format(TIMESTAMP_FORMAT)))
}

/// Render the timestamp, GMT offset and microseconds columns of a time.
pub fn time_to_columns(time: Option<&Time>) -> Result<(String, String, String), Error> {
    match time {
        None => Ok(("NULL".into(), "NULL".into(), "NULL".into())),
        Some(time) => Ok((
            time_to_timestamp(time)?,
            time.gmt_offset.to_string(),
            time.usec.to_string(),
        )),
    }
}

/// Build a time from a fetched UTC timestamp, GMT offset and microseconds.
pub fn time_from_timestamp(timestamp: &str, gmt_offset: i32, usec: u32) -> Result<Time, Error> {
    let text = timestamp.trim();
    // some backends append fractional seconds or a zone suffix
    let text = text.get(..19).unwrap_or(text);

    let naive = NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .map_err(|_| Error::value(timestamp, ValueType::Time))?;

    Ok(Time::from_secs(naive.and_utc().timestamp())
        .with_usec(usec)
        .with_gmt_offset(gmt_offset))
}
