//! Time utilities: fixed civil timezone (UTC+9), date keys, day ordinals.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RoutineError};

/// The single civil timezone every date key is computed in. Asia/Seoul has
/// no DST, so this is a fixed UTC+9 offset.
pub const ROUTINE_TZ: Tz = chrono_tz::Asia::Seoul;

const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Fall,
}

/// Calendar date of `instant` in the routine timezone.
pub fn date_key(instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&ROUTINE_TZ).date_naive()
}

/// Days since a fixed epoch (0001-01-01), for subtraction-based interval math.
pub fn day_ordinal(date: NaiveDate) -> i64 {
    i64::from(date.num_days_from_ce())
}

/// Whole days from `earlier` to `later` (negative if `later` is before).
pub fn days_between(earlier: NaiveDate, later: NaiveDate) -> i64 {
    day_ordinal(later) - day_ordinal(earlier)
}

/// Monday = 0 ... Sunday = 6.
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_monday() as u8
}

pub fn season_of(date: NaiveDate) -> Season {
    match date.month() {
        12 | 1 | 2 => Season::Winter,
        3..=5 => Season::Spring,
        6..=8 => Season::Summer,
        _ => Season::Fall,
    }
}

pub fn format_date_key(date: NaiveDate) -> String {
    date.format(DATE_KEY_FORMAT).to_string()
}

/// Parse a strict `YYYY-MM-DD` date key. chrono alone would accept
/// unpadded months and days.
pub fn parse_date_key(value: &str) -> Result<NaiveDate> {
    let invalid = || RoutineError::InvalidDate {
        value: value.to_string(),
    };
    let trimmed = value.trim();
    let shaped = trimmed.len() == 10
        && trimmed.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 => b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !shaped {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(trimmed, DATE_KEY_FORMAT).map_err(|_| invalid())
}

/// Parse an instant. Accepts RFC3339 with an offset, or a naive local
/// datetime which is interpreted in the routine timezone.
pub fn parse_instant(value: &str) -> Result<DateTime<Utc>> {
    let trimmed = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    let naive = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| RoutineError::InvalidInstant {
            value: value.to_string(),
            reason: "expected RFC3339 or YYYY-MM-DDTHH:MM[:SS]".to_string(),
        })?;

    let local = ROUTINE_TZ
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| RoutineError::InvalidInstant {
            value: value.to_string(),
            reason: "ambiguous or nonexistent local time".to_string(),
        })?;

    Ok(local.with_timezone(&Utc))
}

/// `now` rendered in the routine timezone.
pub fn now_local(now: DateTime<Utc>) -> DateTime<Tz> {
    now.with_timezone(&ROUTINE_TZ)
}

/// RFC3339 in the routine timezone, e.g. `2026-01-04T08:00:00+09:00`.
pub fn to_local_rfc3339(instant: DateTime<Utc>) -> String {
    now_local(instant).to_rfc3339()
}
