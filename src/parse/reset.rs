//! Reset-time phrase parsing.
//!
//! Two families appear in CLI output: relative durations ("2h 15m",
//! "6d 23h 22m") and absolute wall-clock phrasings ("4:59pm (Asia/Tokyo)",
//! "Dec 25 at 4:59am (UTC)", "Jan 15, 3:30pm"). Absolute phrasings resolve
//! against the named zone when one is present, the local zone otherwise, and
//! always to the *next* future occurrence of the given wall-clock time.

use chrono::{DateTime, Datelike, Duration, Local, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

static RELATIVE_UNIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d+)\s*([dhm])\b").expect("relative unit pattern"));

static CLOCK_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)\b").expect("clock pattern"));

static MONTH_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*\s+(\d{1,2})(?:,\s*(\d{4}))?")
        .expect("month pattern")
});

static ZONE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([A-Za-z][A-Za-z0-9_+\-/]*)\)").expect("zone pattern"));

/// Parse a reset phrase of either family into an absolute instant.
///
/// Phrases with an am/pm clock time are treated as absolute; anything else
/// is tried as a relative duration added to `now`.
pub fn parse_reset_phrase(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if CLOCK_TIME.is_match(text) {
        parse_reset_absolute(text, now)
    } else {
        parse_reset_relative(text).map(|d| now + d)
    }
}

/// Parse a relative duration like "30m", "2h 15m", or "6d 23h 22m".
pub fn parse_reset_relative(text: &str) -> Option<Duration> {
    let mut total = Duration::zero();
    let mut matched = false;
    for caps in RELATIVE_UNIT.captures_iter(text) {
        let value: i64 = caps[1].parse().ok()?;
        total = total
            + match &caps[2] {
                "d" => Duration::days(value),
                "h" => Duration::hours(value),
                _ => Duration::minutes(value),
            };
        matched = true;
    }
    matched.then_some(total)
}

/// Parse an absolute wall-clock phrase into the next future instant.
pub fn parse_reset_absolute(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let caps = CLOCK_TIME.captures(text)?;
    let raw_hour: u32 = caps[1].parse().ok()?;
    if raw_hour == 0 || raw_hour > 12 {
        return None;
    }
    let minute: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
    let pm = caps[3].eq_ignore_ascii_case("pm");
    let hour = match (raw_hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, false) => h,
        (h, true) => h + 12,
    };

    let date = MONTH_DAY.captures(text).and_then(|c| {
        let month = month_number(&c[1])?;
        let day: u32 = c[2].parse().ok()?;
        let year: Option<i32> = c.get(3).and_then(|y| y.as_str().parse().ok());
        Some((month, day, year))
    });

    match ZONE_NAME
        .captures(text)
        .and_then(|c| c[1].parse::<Tz>().ok())
    {
        Some(tz) => resolve_in_zone(&tz, now, date, hour, minute),
        None => resolve_in_zone(&Local, now, date, hour, minute),
    }
}

fn month_number(name: &str) -> Option<u32> {
    let idx = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ]
    .iter()
    .position(|m| name.to_ascii_lowercase().starts_with(m))?;
    Some(idx as u32 + 1)
}

fn resolve_in_zone<Z: TimeZone>(
    zone: &Z,
    now: DateTime<Utc>,
    date: Option<(u32, u32, Option<i32>)>,
    hour: u32,
    minute: u32,
) -> Option<DateTime<Utc>> {
    let zone_now = now.with_timezone(zone);
    match date {
        // Explicit year: taken at face value, no rollover
        Some((month, day, Some(year))) => Some(
            zone.with_ymd_and_hms(year, month, day, hour, minute, 0)
                .earliest()?
                .with_timezone(&Utc),
        ),
        // Month and day: this year, or next year if already past
        Some((month, day, None)) => {
            let year = zone_now.year();
            let candidate = zone
                .with_ymd_and_hms(year, month, day, hour, minute, 0)
                .earliest()?;
            if candidate.with_timezone(&Utc) > now {
                Some(candidate.with_timezone(&Utc))
            } else {
                Some(
                    zone.with_ymd_and_hms(year + 1, month, day, hour, minute, 0)
                        .earliest()?
                        .with_timezone(&Utc),
                )
            }
        }
        // Time of day only: today, or tomorrow if already past
        None => {
            let today = zone_now.date_naive();
            let candidate = zone
                .from_local_datetime(&today.and_hms_opt(hour, minute, 0)?)
                .earliest()?;
            if candidate.with_timezone(&Utc) > now {
                Some(candidate.with_timezone(&Utc))
            } else {
                let tomorrow = today + Duration::days(1);
                Some(
                    zone.from_local_datetime(&tomorrow.and_hms_opt(hour, minute, 0)?)
                        .earliest()?
                        .with_timezone(&Utc),
                )
            }
        }
    }
}
