use crate::error::CoreError;
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::str::FromStr;

/// Parse an IANA timezone name
pub fn parse_timezone(timezone: &str) -> Result<Tz, CoreError> {
    Tz::from_str(timezone).map_err(|_| CoreError::InvalidTimezone(timezone.to_string()))
}

/// Validate IANA timezone name
pub fn validate_timezone(timezone: &str) -> Result<(), CoreError> {
    parse_timezone(timezone).map(|_| ())
}

/// Converts a local wall-clock time in `timezone` to UTC.
///
/// Ambiguous times (fall back) resolve to the earliest instant. Times inside a
/// spring-forward gap move one hour later.
pub fn local_to_utc(local: NaiveDateTime, timezone: &str) -> Result<DateTime<Utc>, CoreError> {
    let tz = parse_timezone(timezone)?;
    if let Some(dt) = tz.from_local_datetime(&local).earliest() {
        return Ok(dt.with_timezone(&Utc));
    }
    local
        .checked_add_signed(Duration::hours(1))
        .and_then(|shifted| tz.from_local_datetime(&shifted).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| {
            CoreError::InvalidInput(format!("{} does not exist in timezone {}", local, timezone))
        })
}

/// Wall-clock time in `timezone` at the UTC instant `at`.
pub fn utc_to_local(at: DateTime<Utc>, timezone: &str) -> Result<NaiveDateTime, CoreError> {
    let tz = parse_timezone(timezone)?;
    Ok(at.with_timezone(&tz).naive_local())
}

/// Get timezone offset string for display (e.g., "-05:00")
pub fn get_timezone_offset(timezone: &str, at_time: DateTime<Utc>) -> Result<String, CoreError> {
    let tz = parse_timezone(timezone)?;
    Ok(at_time.with_timezone(&tz).format("%:z").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_validate_timezone() {
        assert!(validate_timezone("UTC").is_ok());
        assert!(validate_timezone("America/New_York").is_ok());
        assert!(matches!(
            validate_timezone("Invalid/Timezone"),
            Err(CoreError::InvalidTimezone(name)) if name == "Invalid/Timezone"
        ));
    }

    #[test]
    fn test_local_to_utc_standard_time() {
        let utc = local_to_utc(local(2024, 1, 15, 9, 0), "America/New_York").unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap());
    }

    #[test]
    fn test_spring_forward_gap_moves_later() {
        // 02:30 does not exist on 2024-03-10 in New York.
        let utc = local_to_utc(local(2024, 3, 10, 2, 30), "America/New_York").unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2024, 3, 10, 7, 30, 0).unwrap());
    }

    #[test]
    fn test_fall_back_takes_earliest() {
        // 01:30 happens twice on 2024-11-03 in New York; the first is EDT.
        let utc = local_to_utc(local(2024, 11, 3, 1, 30), "America/New_York").unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2024, 11, 3, 5, 30, 0).unwrap());
    }

    #[test]
    fn test_utc_to_local() {
        let at = Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap();
        assert_eq!(utc_to_local(at, "Europe/Moscow").unwrap(), local(2024, 7, 1, 15, 0));
    }

    #[test]
    fn test_timezone_offset() {
        let at = Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap();
        assert_eq!(get_timezone_offset("UTC", at).unwrap(), "+00:00");
        assert_eq!(get_timezone_offset("America/New_York", at).unwrap(), "-04:00");
    }
}
