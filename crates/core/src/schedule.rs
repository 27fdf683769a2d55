//! Weekly `HH:MM` schedules.
//!
//! A [`WeekSchedule`] maps lowercase weekday names to lists of
//! [`DayInterval`]s expressed as `HH:MM` text. The text is kept verbatim
//! (it round-trips through persistence and the admin API unchanged) and is
//! parsed at the point of use; the engine skips entries that fail to parse,
//! while the admin surface refuses them up front via
//! [`validate_week_schedule`].

use std::collections::BTreeMap;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The seven valid schedule keys, Monday first.
pub const DAY_KEYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// One allowed window within a day, e.g. `09:00`-`11:00`.
///
/// `end <= start` means the window wraps past midnight into the next day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayInterval {
    /// Start of day time, `HH:MM`.
    pub start: String,
    /// End of day time, `HH:MM` (exclusive).
    pub end: String,
}

/// Weekday name -> ordered day intervals.
pub type WeekSchedule = BTreeMap<String, Vec<DayInterval>>;

/// Parse an `HH:MM` (or `H:MM`) time-of-day string.
pub fn parse_hhmm(s: &str) -> Result<(u32, u32), CoreError> {
    let invalid = || CoreError::InvalidTimeOfDay(s.to_string());

    let (hh, mm) = s.split_once(':').ok_or_else(invalid)?;
    if hh.is_empty() || !hh.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    if mm.is_empty() || !mm.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let hour: u32 = hh.parse().map_err(|_| invalid())?;
    let minute: u32 = mm.parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok((hour, minute))
}

/// The schedule key for a weekday (`Weekday::Mon` -> `"monday"`).
pub fn weekday_key(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// Validate every key and `HH:MM` string in a schedule.
///
/// Used by the admin surface so a malformed schedule is refused with a
/// user-visible message instead of being silently skipped by the engine.
pub fn validate_week_schedule(schedule: &WeekSchedule) -> Result<(), CoreError> {
    for (day, intervals) in schedule {
        if !DAY_KEYS.contains(&day.as_str()) {
            return Err(CoreError::UnknownWeekday(day.clone()));
        }
        for iv in intervals {
            parse_hhmm(&iv.start)?;
            parse_hhmm(&iv.end)?;
        }
    }
    Ok(())
}
