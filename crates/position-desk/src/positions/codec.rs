//! Conversion between the epoch-seconds wire representation and calendar values.
//!
//! The remote service carries every date as an integer count of seconds since
//! 1970-01-01T00:00:00 UTC with no timezone field. In memory the same values are
//! [`CalendarDateTime`]s interpreted as UTC. The serde adapters at the bottom of
//! this module are the only place the two representations meet.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

/// Calendar date/time used for display and editing. Always interpreted as UTC.
pub type CalendarDateTime = NaiveDateTime;

const FORM_DATE_FORMAT: &str = "%Y-%m-%d";

/// Interpret `epoch_seconds` as an offset from the Unix epoch.
///
/// Total over `i64`: values beyond chrono's representable range saturate to
/// [`NaiveDateTime::MIN`] / [`NaiveDateTime::MAX`].
pub fn to_calendar(epoch_seconds: i64) -> CalendarDateTime {
    match DateTime::<Utc>::from_timestamp(epoch_seconds, 0) {
        Some(value) => value.naive_utc(),
        None if epoch_seconds < 0 => NaiveDateTime::MIN,
        None => NaiveDateTime::MAX,
    }
}

/// Convert a calendar value back to whole epoch-seconds (sub-second precision is dropped).
pub fn to_epoch_seconds(value: CalendarDateTime) -> i64 {
    value.and_utc().timestamp()
}

/// Current wall-clock time as epoch-seconds.
pub fn stamp_now() -> i64 {
    Utc::now().timestamp()
}

/// Midnight UTC of a date picked in a form.
pub fn from_form_date(date: NaiveDate) -> CalendarDateTime {
    date.and_time(NaiveTime::MIN)
}

pub fn parse_form_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), FORM_DATE_FORMAT)
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub fn display_date(value: &CalendarDateTime) -> String {
    value.format(FORM_DATE_FORMAT).to_string()
}

/// Seconds as they appear on the wire. Older clients posted `Date.getTime() / 1000`
/// unrounded, so fractional values are accepted and truncated toward zero.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum WireSeconds {
    Whole(i64),
    Fractional(f64),
}

impl WireSeconds {
    fn whole(self) -> i64 {
        match self {
            WireSeconds::Whole(seconds) => seconds,
            // `as` saturates on overflow and maps NaN to 0.
            WireSeconds::Fractional(seconds) => seconds.trunc() as i64,
        }
    }
}

/// `#[serde(default, with = "epoch_seconds")]` for [`CalendarDateTime`] fields the
/// service always writes. A `null` or missing value reads as the epoch itself.
pub mod epoch_seconds {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{to_calendar, to_epoch_seconds, CalendarDateTime, WireSeconds};

    pub fn serialize<S>(value: &CalendarDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(to_epoch_seconds(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<CalendarDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<WireSeconds>::deserialize(deserializer)
            .map(|seconds| to_calendar(seconds.map_or(0, WireSeconds::whole)))
    }
}

/// `#[serde(default, with = "epoch_seconds_option")]` for optional date fields; absent
/// values travel as `null`.
pub mod epoch_seconds_option {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{to_calendar, to_epoch_seconds, CalendarDateTime, WireSeconds};

    pub fn serialize<S>(value: &Option<CalendarDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(value) => serializer.serialize_some(&to_epoch_seconds(*value)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<CalendarDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<WireSeconds>::deserialize(deserializer)
            .map(|seconds| seconds.map(|seconds| to_calendar(seconds.whole())))
    }
}
