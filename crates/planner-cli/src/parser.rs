use anyhow::{anyhow, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use chrono_english::{parse_date_string, Dialect};
use planner_core::timezone::parse_timezone;

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"];
const TIME_FORMATS: &[&str] = &["%H:%M", "%H:%M:%S", "%I:%M %p", "%I:%M%p"];

/// Parses a wall-clock date and time in `timezone`.
///
/// Accepts ISO-like forms first, then natural language such as 'tomorrow 9am'.
/// A bare date means midnight.
pub fn parse_local_datetime(input: &str, timezone: &str) -> Result<NaiveDateTime> {
    let input = input.trim();
    if let Some(at) = parse_exact_datetime(input) {
        return Ok(at);
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN));
    }

    let tz = parse_timezone(timezone)?;
    let now = Utc::now().with_timezone(&tz);
    parse_date_string(input, now, Dialect::Uk)
        .map(|at| at.naive_local())
        .map_err(|e| anyhow!("Failed to parse date '{}': {}", input, e))
}

/// Parses a calendar day, accepting the same natural language as [`parse_local_datetime`].
pub fn parse_local_date(input: &str, timezone: &str) -> Result<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d") {
        return Ok(date);
    }
    parse_local_datetime(input, timezone).map(|at| at.date())
}

pub fn parse_time_of_day(input: &str) -> Result<NaiveTime> {
    let input = input.trim();
    let upper = input.to_uppercase();
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(&upper, format).ok())
        .ok_or_else(|| anyhow!("Failed to parse time '{}'; try '9:00' or '2:30 PM'", input))
}

/// Identifies an occurrence by its scheduled time. A bare date picks the
/// occurrence at `default_time` on that day.
pub fn parse_occurrence_at(input: &str, default_time: NaiveTime) -> Result<NaiveDateTime> {
    let input = input.trim();
    if let Some(at) = parse_exact_datetime(input) {
        return Ok(at);
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map(|date| date.and_time(default_time))
        .map_err(|_| anyhow!("Expected an occurrence like '2030-01-07 09:00' or '2030-01-07', got '{}'", input))
}

/// Parses a comma-separated weekday list such as "mon,wed,fri".
pub fn parse_weekdays(input: &str) -> Result<Vec<Weekday>> {
    let days = input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<Weekday>().map_err(|_| anyhow!("Unknown weekday '{}'", s)))
        .collect::<Result<Vec<_>>>()?;
    if days.is_empty() {
        return Err(anyhow!("At least one weekday is required"));
    }
    Ok(days)
}

fn parse_exact_datetime(input: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(input, format).ok())
}
