//! Date normalization and backend timestamp conversion.
//!
//! Task dates are shown and compared as `YYYY-MM-DD` strings but stored as
//! backend timestamps (`{ seconds, nanos }`, midnight UTC). Hours are kept
//! separately as `HH:MM` strings.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Canonical date format used everywhere outside storage.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Accepted input formats besides RFC 3339, tried in order.
const INPUT_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y"];

/// Backend timestamp representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: i64,
    #[serde(default)]
    pub nanos: i32,
}

impl Timestamp {
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self {
            seconds: dt.timestamp(),
            nanos: dt.timestamp_subsec_nanos() as i32,
        }
    }

    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.seconds, self.nanos.max(0) as u32).single()
    }
}

pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(input, fmt).ok())
}

/// Normalize any accepted date input to `YYYY-MM-DD`.
pub fn normalize_date(input: &str) -> Option<String> {
    parse_date(input).map(|d| d.format(DATE_FORMAT).to_string())
}

/// Midnight UTC of the given date, as a backend timestamp.
pub fn date_to_timestamp(input: &str) -> Option<Timestamp> {
    let date = parse_date(input)?;
    let midnight = date.and_time(NaiveTime::MIN).and_utc();
    Some(Timestamp::from_datetime(midnight))
}

/// Calendar day (UTC) of a backend timestamp, as `YYYY-MM-DD`.
pub fn timestamp_to_date(ts: Timestamp) -> Option<String> {
    ts.to_datetime()
        .map(|dt| dt.date_naive().format(DATE_FORMAT).to_string())
}

/// Parse an `HH:MM` hour string.
pub fn parse_hour(input: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(input.trim(), "%H:%M").ok()
}

/// The instant a task is due: its end date at `hour`, or at `default_hour`
/// (0-23) when no valid hour is set.
pub fn due_instant(
    end_date: &str,
    hour: Option<&str>,
    default_hour: u32,
) -> Option<DateTime<Utc>> {
    let date = parse_date(end_date)?;
    let time = hour
        .and_then(parse_hour)
        .or_else(|| NaiveTime::from_hms_opt(default_hour.min(23), 0, 0))?;
    Some(NaiveDateTime::new(date, time).and_utc())
}

/// Serde adapter for `Option<String>` dates stored as timestamps.
///
/// Serializing normalizes the string and writes a [`Timestamp`]; invalid
/// dates are a serialization error. Deserializing accepts a timestamp object
/// or any accepted date string.
pub mod timestamp_date {
    use super::{Timestamp, date_to_timestamp, normalize_date, timestamp_to_date};
    use serde::de::Error as _;
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            None => serializer.serialize_none(),
            Some(raw) => {
                let ts = date_to_timestamp(raw)
                    .ok_or_else(|| S::Error::custom(format!("invalid date: {}", raw)))?;
                ts.serialize(serializer)
            }
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Stored {
        Timestamp(Timestamp),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        match Option::<Stored>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Stored::Timestamp(ts)) => timestamp_to_date(ts)
                .map(Some)
                .ok_or_else(|| D::Error::custom("timestamp out of range")),
            Some(Stored::Text(s)) if s.trim().is_empty() => Ok(None),
            Some(Stored::Text(s)) => normalize_date(&s)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid date: {}", s))),
        }
    }
}
