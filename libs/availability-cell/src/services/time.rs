// libs/availability-cell/src/services/time.rs
//! Conversion between provider wall-clock time and canonical UTC instants.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use shared_models::scheduling::TimeInterval;

use crate::models::AvailabilityError;

pub fn parse_timezone(tz: &str) -> Result<Tz, AvailabilityError> {
    tz.trim()
        .parse::<Tz>()
        .map_err(|_| AvailabilityError::InvalidTimeZone(tz.to_string()))
}

pub fn parse_date(date: &str) -> Result<NaiveDate, AvailabilityError> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|_| {
        AvailabilityError::InvalidTimeRange(format!("date '{}' is not YYYY-MM-DD", date))
    })
}

/// Accepts `HH:MM` and `HH:MM:SS`.
pub fn parse_time(time: &str) -> Result<NaiveTime, AvailabilityError> {
    let time = time.trim();
    NaiveTime::parse_from_str(time, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M"))
        .map_err(|_| {
            AvailabilityError::InvalidTimeRange(format!("time '{}' is not HH:MM or HH:MM:SS", time))
        })
}

/// Resolves a local wall-clock time. Times skipped by a DST transition are
/// rejected; repeated times resolve to the earlier instant.
pub fn resolve_local(naive: NaiveDateTime, tz: Tz) -> Result<DateTime<Utc>, AvailabilityError> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| {
            AvailabilityError::InvalidTimeRange(format!(
                "{} does not exist in {} (daylight-saving gap)",
                naive, tz
            ))
        })
}

pub fn to_utc(date: &str, time: &str, tz: &str) -> Result<DateTime<Utc>, AvailabilityError> {
    let zone = parse_timezone(tz)?;
    let naive = NaiveDateTime::new(parse_date(date)?, parse_time(time)?);
    resolve_local(naive, zone)
}

pub fn to_local(instant: DateTime<Utc>, tz: &str) -> Result<(NaiveDate, NaiveTime), AvailabilityError> {
    let zone = parse_timezone(tz)?;
    let local = instant.with_timezone(&zone).naive_local();
    Ok((local.date(), local.time()))
}

fn is_end_of_day(time: &str) -> bool {
    matches!(time.trim(), "24:00" | "24:00:00")
}

/// Both endpoints are on the same local `date`. An end time of `24:00` is
/// the midnight that closes `date`.
pub fn to_utc_interval(
    date: &str,
    start_time: &str,
    end_time: &str,
    tz: &str,
) -> Result<TimeInterval, AvailabilityError> {
    let start = to_utc(date, start_time, tz)?;
    let end = if is_end_of_day(end_time) {
        let next_day = parse_date(date)?.succ_opt().ok_or_else(|| {
            AvailabilityError::InvalidTimeRange(format!("date '{}' has no following day", date))
        })?;
        resolve_local(NaiveDateTime::new(next_day, NaiveTime::MIN), parse_timezone(tz)?)?
    } else {
        to_utc(date, end_time, tz)?
    };

    TimeInterval::new(start, end).ok_or_else(|| {
        AvailabilityError::InvalidTimeRange(format!(
            "start time {} must be before end time {}",
            start_time, end_time
        ))
    })
}

/// Formats an instant in `tz` as (`YYYY-MM-DD`, `HH:MM`).
pub fn format_local(instant: DateTime<Utc>, tz: &str) -> Result<(String, String), AvailabilityError> {
    let (date, time) = to_local(instant, tz)?;
    Ok((date.format("%Y-%m-%d").to_string(), time.format("%H:%M").to_string()))
}
