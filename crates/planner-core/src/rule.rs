//! Recurrence rules and their compact textual encoding.
//!
//! A rule is stored as a `;`-joined list of `KEY=VALUE` tokens, a small subset of
//! RFC 5545 RRULE syntax:
//!
//! ```text
//! FREQ=WEEKLY;INTERVAL=2;BYDAY=MO,WE;COUNT=10
//! ```
//!
//! The encoding is written to disk for every recurring task, so [`RecurrenceRule::encode`]
//! must stay stable. Decoding is lenient about token order, case and unknown keys.

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::CoreError;

const WEEKDAY_CODES: [&str; 7] = ["MO", "TU", "WE", "TH", "FR", "SA", "SU"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Yearly => "YEARLY",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid frequency: {0}")]
pub struct ParseFrequencyError(String);

impl FromStr for Frequency {
    type Err = ParseFrequencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DAILY" => Ok(Frequency::Daily),
            "WEEKLY" => Ok(Frequency::Weekly),
            "MONTHLY" => Ok(Frequency::Monthly),
            "YEARLY" => Ok(Frequency::Yearly),
            _ => Err(ParseFrequencyError(s.to_string())),
        }
    }
}

/// A set of weekdays stored as a bitmask, bit 0 = Monday.
///
/// Iteration is always Monday-first, which is also the order used by the encoding
/// and by weekly expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const fn empty() -> Self {
        WeekdaySet(0)
    }

    /// Builds a set from `0..=6` indices (Monday = 0).
    pub fn from_indices<I: IntoIterator<Item = u8>>(indices: I) -> Result<Self, CoreError> {
        let mut set = WeekdaySet::empty();
        for index in indices {
            if index > 6 {
                return Err(CoreError::InvalidRule(format!(
                    "weekday index {} is out of range 0..=6",
                    index
                )));
            }
            set.0 |= 1 << index;
        }
        Ok(set)
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= 1 << day.num_days_from_monday();
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Selected weekdays in Monday-first order.
    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        (0u8..7)
            .filter(move |i| self.0 & (1 << i) != 0)
            .map(weekday_from_index)
    }

    /// Selected weekdays as `0..=6` indices.
    pub fn indices(&self) -> Vec<u8> {
        self.iter().map(|d| d.num_days_from_monday() as u8).collect()
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<T: IntoIterator<Item = Weekday>>(iter: T) -> Self {
        let mut set = WeekdaySet::empty();
        for day in iter {
            set.insert(day);
        }
        set
    }
}

impl fmt::Display for WeekdaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codes: Vec<&str> = self
            .iter()
            .map(|d| WEEKDAY_CODES[d.num_days_from_monday() as usize])
            .collect();
        f.write_str(&codes.join(","))
    }
}

pub(crate) fn weekday_from_index(index: u8) -> Weekday {
    match index {
        0 => Weekday::Mon,
        1 => Weekday::Tue,
        2 => Weekday::Wed,
        3 => Weekday::Thu,
        4 => Weekday::Fri,
        5 => Weekday::Sat,
        _ => Weekday::Sun,
    }
}

/// How a rule stops producing occurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EndCondition {
    #[default]
    Never,
    /// Last calendar date that may carry an occurrence (inclusive).
    Until(NaiveDate),
    /// Total occurrences counted from the anchor.
    Count(u32),
}

/// One repeating pattern: frequency, interval, optional weekdays and an end condition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    /// Every N units of `frequency`; must be at least 1.
    pub interval: u32,
    /// Only used by weekly rules, where it is mandatory.
    pub days_of_week: Option<WeekdaySet>,
    pub end: EndCondition,
}

impl RecurrenceRule {
    pub fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            interval: 1,
            days_of_week: None,
            end: EndCondition::Never,
        }
    }

    pub fn daily() -> Self {
        Self::new(Frequency::Daily)
    }

    pub fn weekly<I: IntoIterator<Item = Weekday>>(days: I) -> Self {
        Self::new(Frequency::Weekly).on(days)
    }

    pub fn monthly() -> Self {
        Self::new(Frequency::Monthly)
    }

    pub fn yearly() -> Self {
        Self::new(Frequency::Yearly)
    }

    pub fn every(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    pub fn on<I: IntoIterator<Item = Weekday>>(mut self, days: I) -> Self {
        self.days_of_week = Some(days.into_iter().collect());
        self
    }

    pub fn until(mut self, date: NaiveDate) -> Self {
        self.end = EndCondition::Until(date);
        self
    }

    pub fn count(mut self, count: u32) -> Self {
        self.end = EndCondition::Count(count);
        self
    }

    pub fn until_date(&self) -> Option<NaiveDate> {
        match self.end {
            EndCondition::Until(date) => Some(date),
            _ => None,
        }
    }

    pub fn max_count(&self) -> Option<u32> {
        match self.end {
            EndCondition::Count(count) => Some(count),
            _ => None,
        }
    }

    pub fn is_bounded(&self) -> bool {
        !matches!(self.end, EndCondition::Never)
    }

    /// Checks the structural invariants every stored rule must satisfy.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.interval < 1 {
            return Err(CoreError::InvalidRule("interval must be at least 1".to_string()));
        }
        if let Some(days) = &self.days_of_week {
            if days.is_empty() {
                return Err(CoreError::InvalidRule(
                    "days_of_week must not be empty when present".to_string(),
                ));
            }
        }
        if self.frequency == Frequency::Weekly && self.days_of_week.is_none() {
            return Err(CoreError::InvalidRule(
                "weekly rules must select at least one weekday".to_string(),
            ));
        }
        if let EndCondition::Count(0) = self.end {
            return Err(CoreError::InvalidRule("count must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Validation applied when a rule is created or edited: on top of [`validate`],
    /// the `until` date may not lie before the creation date.
    ///
    /// [`validate`]: RecurrenceRule::validate
    pub fn validate_for_creation(&self, created_on: NaiveDate) -> Result<(), CoreError> {
        self.validate()?;
        if let EndCondition::Until(until) = self.end {
            if until < created_on {
                return Err(CoreError::InvalidRule(format!(
                    "until date {} is before {}",
                    until, created_on
                )));
            }
        }
        Ok(())
    }

    pub fn encode(&self) -> String {
        let mut parts = vec![format!("FREQ={}", self.frequency)];
        if self.interval != 1 {
            parts.push(format!("INTERVAL={}", self.interval));
        }
        if let Some(days) = self.days_of_week.filter(|d| !d.is_empty()) {
            parts.push(format!("BYDAY={}", days));
        }
        match self.end {
            EndCondition::Never => {}
            EndCondition::Until(date) => parts.push(format!("UNTIL={}", date.format("%Y%m%d"))),
            EndCondition::Count(count) => parts.push(format!("COUNT={}", count)),
        }
        parts.join(";")
    }

    pub fn decode(text: &str) -> Result<Self, CoreError> {
        let body = text.trim();
        let body = match body.get(..6) {
            Some(prefix) if prefix.eq_ignore_ascii_case("RRULE:") => &body[6..],
            _ => body,
        };

        let mut frequency = None;
        let mut interval = None;
        let mut days_of_week = None;
        let mut until = None;
        let mut count = None;

        for token in body.split(';').map(str::trim).filter(|t| !t.is_empty()) {
            let Some((key, value)) = token.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim().to_ascii_uppercase().as_str() {
                "FREQ" => {
                    let parsed = value.parse::<Frequency>().map_err(|_| {
                        CoreError::malformed(text, format!("unrecognized FREQ '{}'", value))
                    })?;
                    frequency = Some(parsed);
                }
                "INTERVAL" => interval = Some(parse_number(text, "INTERVAL", value)?),
                "BYDAY" => days_of_week = parse_weekdays(text, value)?,
                "UNTIL" => until = Some(parse_until(text, value)?),
                "COUNT" => count = Some(parse_number(text, "COUNT", value)?),
                // Unknown keys (WKST, BYMONTH, ...) are ignored.
                _ => {}
            }
        }

        let frequency = frequency.ok_or_else(|| CoreError::malformed(text, "missing FREQ"))?;
        let end = match (until, count) {
            (Some(_), Some(_)) => {
                return Err(CoreError::InvalidRule(
                    "UNTIL and COUNT are mutually exclusive".to_string(),
                ))
            }
            (Some(date), None) => EndCondition::Until(date),
            (None, Some(count)) => EndCondition::Count(count),
            (None, None) => EndCondition::Never,
        };

        let rule = Self {
            frequency,
            interval: interval.unwrap_or(1),
            days_of_week,
            end,
        };
        rule.validate()?;
        Ok(rule)
    }
}

fn parse_number(text: &str, key: &str, value: &str) -> Result<u32, CoreError> {
    value
        .parse::<u32>()
        .map_err(|_| CoreError::malformed(text, format!("{} must be a non-negative integer, got '{}'", key, value)))
}

fn parse_weekdays(text: &str, value: &str) -> Result<Option<WeekdaySet>, CoreError> {
    let mut set = WeekdaySet::empty();
    for code in value.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        let index = WEEKDAY_CODES
            .iter()
            .position(|known| known.eq_ignore_ascii_case(code))
            .ok_or_else(|| CoreError::malformed(text, format!("unknown weekday '{}'", code)))?;
        set.insert(weekday_from_index(index as u8));
    }
    Ok(if set.is_empty() { None } else { Some(set) })
}

fn parse_until(text: &str, value: &str) -> Result<NaiveDate, CoreError> {
    // Accept YYYYMMDD and the RFC 5545 datetime form YYYYMMDDTHHMMSS[Z].
    let date_part = match value.get(..8) {
        Some(date) if value.len() == 8 || value[8..].starts_with(['T', 't']) => date,
        _ => return Err(CoreError::malformed(text, format!("UNTIL must be YYYYMMDD, got '{}'", value))),
    };
    NaiveDate::parse_from_str(date_part, "%Y%m%d")
        .map_err(|_| CoreError::malformed(text, format!("UNTIL is not a valid date: '{}'", value)))
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for RecurrenceRule {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecurrenceRule::decode(s)
    }
}

impl Serialize for RecurrenceRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for RecurrenceRule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        RecurrenceRule::decode(&text).map_err(serde::de::Error::custom)
    }
}
