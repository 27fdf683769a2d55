//! The allowed-interval engine.
//!
//! [`compute_allowed_intervals`] turns a weekly schedule plus temporary
//! grants and blocks into the concrete list of allowed wall-clock intervals
//! for the next 48 hours, together with the next instant at which that list
//! changes (the long-poll wake-up boundary).
//!
//! The engine is generic over [`chrono::TimeZone`]: production composes
//! day/`HH:MM` math in the server's local zone, tests run under `Utc`.
//! It is pure -- no I/O, no clock reads, no logging.

use chrono::{DateTime, Datelike, Days, Duration, Local, NaiveDate, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

use crate::schedule::{parse_hhmm, weekday_key, WeekSchedule};

/// The computation window: today + tomorrow.
pub const WINDOW_HOURS: i64 = 48;

/// A contiguous `[start, end)` during which a user may log in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "DateTime<Tz>: Serialize",
    deserialize = "DateTime<Tz>: Deserialize<'de>"
))]
pub struct AllowedInterval<Tz: TimeZone = Local> {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl<Tz: TimeZone> PartialEq for AllowedInterval<Tz> {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.end == other.end
    }
}

/// An absolute `[start, end)` range, used for both temporary grants and
/// blocks once they have been resolved to a single user.
#[derive(Debug, Clone)]
pub struct TimeRange<Tz: TimeZone = Local> {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

/// Compute the allowed intervals and the next-change instant.
///
/// - `now` is truncated to the minute unless `include_past` is set, so
///   interval boundaries stay stable across polls.
/// - Returned intervals are sorted ascending by start, pairwise
///   non-overlapping, and (unless `include_past`) end after `now`.
/// - `next_change` is the earliest future boundary at which the result
///   would differ; `now + 48 h` when nothing changes inside the window.
///
/// Malformed `HH:MM` strings skip that one day interval and the
/// computation continues.
pub fn compute_allowed_intervals<Tz: TimeZone>(
    now: DateTime<Tz>,
    schedule: &WeekSchedule,
    temp_grants: &[TimeRange<Tz>],
    blocks: &[TimeRange<Tz>],
    include_past: bool,
) -> (Vec<AllowedInterval<Tz>>, DateTime<Tz>) {
    // Truncate to the minute for stable boundaries across polls.
    let now = if include_past {
        now
    } else {
        now.with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now)
    };

    let tz = now.timezone();
    let window_end = now.clone() + Duration::hours(WINDOW_HOURS);

    let mut intervals: Vec<AllowedInterval<Tz>> = Vec::new();

    // 1. Schedule-based intervals for today and tomorrow.
    let today = now.date_naive();
    for day_offset in 0..2u64 {
        let day = today + Days::new(day_offset);
        let Some(day_intervals) = schedule.get(weekday_key(day.weekday())) else {
            continue;
        };
        for iv in day_intervals {
            let Some((start, end)) = expand_day_interval(&tz, day, &iv.start, &iv.end) else {
                continue;
            };
            push_clipped(&mut intervals, start, end, &now, &window_end, include_past);
        }
    }

    // 2. Temporary grants.
    for grant in temp_grants {
        push_clipped(
            &mut intervals,
            grant.start.clone(),
            grant.end.clone(),
            &now,
            &window_end,
            include_past,
        );
    }

    // 3. Merge overlapping or touching intervals.
    let mut intervals = merge_intervals(intervals);

    // 4. Cut every still-active block out of the surviving intervals.
    for block in blocks {
        if block.end > now && block.start < block.end {
            intervals = subtract_block(intervals, &block.start, &block.end);
        }
    }

    // 5. Next change: the earliest strictly-future boundary.
    let mut next_change = window_end;
    for iv in &intervals {
        consider_boundary(&mut next_change, &iv.start, &now);
        consider_boundary(&mut next_change, &iv.end, &now);
    }
    for grant in temp_grants {
        consider_boundary(&mut next_change, &grant.end, &now);
    }
    for block in blocks {
        consider_boundary(&mut next_change, &block.start, &now);
        consider_boundary(&mut next_change, &block.end, &now);
    }

    (intervals, next_change)
}

/// Half-open membership test: `t` is inside some `[start, end)`.
pub fn is_within_intervals<Tz: TimeZone>(
    t: &DateTime<Tz>,
    intervals: &[AllowedInterval<Tz>],
) -> bool {
    intervals
        .iter()
        .any(|iv| *t >= iv.start && *t < iv.end)
}

/// Resolve an `HH:MM` pair on a calendar day to absolute instants.
///
/// `end <= start` is an overnight window and gets 24 h added to the end.
/// Returns `None` for malformed times or times that do not exist in the
/// zone on that date.
fn expand_day_interval<Tz: TimeZone>(
    tz: &Tz,
    day: NaiveDate,
    start: &str,
    end: &str,
) -> Option<(DateTime<Tz>, DateTime<Tz>)> {
    let (sh, sm) = parse_hhmm(start).ok()?;
    let (eh, em) = parse_hhmm(end).ok()?;
    let start = tz.from_local_datetime(&day.and_hms_opt(sh, sm, 0)?).earliest()?;
    let mut end = tz.from_local_datetime(&day.and_hms_opt(eh, em, 0)?).earliest()?;
    if end <= start {
        end = end + Duration::hours(24);
    }
    Some((start, end))
}

/// Clip `[start, end)` to the window (and to `now` when past intervals are
/// excluded) and append it if anything is left.
fn push_clipped<Tz: TimeZone>(
    intervals: &mut Vec<AllowedInterval<Tz>>,
    mut start: DateTime<Tz>,
    mut end: DateTime<Tz>,
    now: &DateTime<Tz>,
    window_end: &DateTime<Tz>,
    include_past: bool,
) {
    if !include_past && end < *now {
        return;
    }
    if start > *window_end {
        return;
    }
    if !include_past && start < *now {
        start = now.clone();
    }
    if end > *window_end {
        end = window_end.clone();
    }
    if end > start {
        intervals.push(AllowedInterval { start, end });
    }
}

/// Sort by start and coalesce any two intervals that touch or overlap.
fn merge_intervals<Tz: TimeZone>(mut intervals: Vec<AllowedInterval<Tz>>) -> Vec<AllowedInterval<Tz>> {
    if intervals.is_empty() {
        return intervals;
    }
    intervals.sort_by(|a, b| a.start.cmp(&b.start));

    let mut merged: Vec<AllowedInterval<Tz>> = Vec::with_capacity(intervals.len());
    for iv in intervals {
        match merged.last_mut() {
            Some(last) if iv.start <= last.end => {
                if iv.end > last.end {
                    last.end = iv.end;
                }
            }
            _ => merged.push(iv),
        }
    }
    merged
}

/// Cut `[block_start, block_end)` out of each interval; an interval fully
/// containing the block splits into two pieces.
fn subtract_block<Tz: TimeZone>(
    intervals: Vec<AllowedInterval<Tz>>,
    block_start: &DateTime<Tz>,
    block_end: &DateTime<Tz>,
) -> Vec<AllowedInterval<Tz>> {
    let mut result = Vec::with_capacity(intervals.len());
    for iv in intervals {
        // Disjoint: entirely before or entirely after the block.
        if iv.end <= *block_start || iv.start >= *block_end {
            result.push(iv);
            continue;
        }
        if iv.start < *block_start {
            result.push(AllowedInterval {
                start: iv.start.clone(),
                end: block_start.clone(),
            });
        }
        if iv.end > *block_end {
            result.push(AllowedInterval {
                start: block_end.clone(),
                end: iv.end.clone(),
            });
        }
    }
    result
}

/// Lower `next_change` to `candidate` if it is strictly in the future and
/// strictly earlier than the current minimum.
fn consider_boundary<Tz: TimeZone>(
    next_change: &mut DateTime<Tz>,
    candidate: &DateTime<Tz>,
    now: &DateTime<Tz>,
) {
    if *candidate > *now && *candidate < *next_change {
        *next_change = candidate.clone();
    }
}
