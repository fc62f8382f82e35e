//! Occurrence expansion: turns a [`RecurrenceRule`] and an anchor into concrete timestamps.
//!
//! Expansion runs on local wall-clock time. [`Occurrences`] yields the full generative
//! sequence of a rule (the one `COUNT` is measured against); [`expand`] clips it to a
//! window and a result limit.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::error::CoreError;
use crate::models::Window;
use crate::rule::{weekday_from_index, EndCondition, Frequency, RecurrenceRule, WeekdaySet};

/// Upper bound on results when the caller gives no explicit limit.
pub const DEFAULT_MAX_RESULTS: usize = 1000;

/// Lazily generated, strictly increasing occurrence timestamps of one rule.
///
/// Cloning the iterator (or building a new one) restarts the sequence. The sequence
/// ends on the rule's `COUNT` or `UNTIL`, or when calendar arithmetic leaves chrono's
/// supported range; an unbounded rule is otherwise infinite.
#[derive(Debug, Clone)]
pub struct Occurrences {
    frequency: Frequency,
    interval: u32,
    days: WeekdaySet,
    end: EndCondition,
    anchor: NaiveDateTime,
    /// Monday of the anchor's week, used by weekly rules.
    week_start: Option<NaiveDate>,
    period: u32,
    slot: u8,
    emitted: u32,
    done: bool,
}

impl Occurrences {
    pub fn new(rule: &RecurrenceRule, anchor: NaiveDateTime) -> Result<Self, CoreError> {
        rule.validate()?;
        let offset = anchor.weekday().num_days_from_monday() as i64;
        Ok(Self {
            frequency: rule.frequency,
            interval: rule.interval,
            days: rule.days_of_week.unwrap_or_default(),
            end: rule.end,
            anchor,
            week_start: anchor.date().checked_sub_signed(Duration::days(offset)),
            period: 0,
            slot: 0,
            emitted: 0,
            done: false,
        })
    }

    /// Skips whole periods that end before `target`.
    ///
    /// Only used for rules without `COUNT`: skipping would otherwise lose track of how
    /// many occurrences were generated. The estimate stays one period short of `target`
    /// so no occurrence at or after it is skipped.
    pub fn fast_forward(&mut self, target: NaiveDateTime) {
        if matches!(self.end, EndCondition::Count(_)) || target <= self.anchor {
            return;
        }
        let interval = self.interval as i64;
        let elapsed_periods = match self.frequency {
            Frequency::Daily => (target.date() - self.anchor.date()).num_days(),
            Frequency::Weekly => match self.week_start {
                Some(week_start) => (target.date() - week_start).num_days() / 7,
                None => return,
            },
            Frequency::Monthly => {
                (target.year() as i64 - self.anchor.year() as i64) * 12
                    + (target.month0() as i64 - self.anchor.month0() as i64)
            }
            Frequency::Yearly => target.year() as i64 - self.anchor.year() as i64,
        };
        let period = (elapsed_periods / interval - 1).clamp(0, u32::MAX as i64) as u32;
        if period > self.period {
            self.period = period;
            self.slot = 0;
        }
    }

    fn step(&mut self) -> Option<NaiveDateTime> {
        match self.frequency {
            Frequency::Weekly => self.next_weekly(),
            Frequency::Daily => {
                let days = (self.period as i64).checked_mul(self.interval as i64)?;
                let candidate = self.anchor.checked_add_signed(Duration::try_days(days)?)?;
                self.period = self.period.checked_add(1)?;
                Some(candidate)
            }
            Frequency::Monthly | Frequency::Yearly => {
                let unit = if self.frequency == Frequency::Yearly { 12 } else { 1 };
                let months = self.period.checked_mul(self.interval)?.checked_mul(unit)?;
                let candidate = add_months_clamped(self.anchor, months)?;
                self.period = self.period.checked_add(1)?;
                Some(candidate)
            }
        }
    }

    fn next_weekly(&mut self) -> Option<NaiveDateTime> {
        let week_start = self.week_start?;
        loop {
            while self.slot < 7 {
                let slot = self.slot;
                self.slot += 1;
                if !self.days.contains(weekday_from_index(slot)) {
                    continue;
                }
                let block_days = (self.period as i64)
                    .checked_mul(self.interval as i64)?
                    .checked_mul(7)?
                    .checked_add(slot as i64)?;
                let date = week_start.checked_add_signed(Duration::try_days(block_days)?)?;
                let candidate = date.and_time(self.anchor.time());
                // Selected weekdays earlier in the anchor's own week are not occurrences.
                if candidate < self.anchor {
                    continue;
                }
                return Some(candidate);
            }
            self.slot = 0;
            self.period = self.period.checked_add(1)?;
        }
    }
}

impl Iterator for Occurrences {
    type Item = NaiveDateTime;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let EndCondition::Count(count) = self.end {
            if self.emitted >= count {
                self.done = true;
                return None;
            }
        }
        let Some(candidate) = self.step() else {
            self.done = true;
            return None;
        };
        if let EndCondition::Until(until) = self.end {
            if candidate.date() > until {
                self.done = true;
                return None;
            }
        }
        self.emitted += 1;
        Some(candidate)
    }
}

/// Adds `months` to `anchor`, clamping the day to the end of shorter months.
fn add_months_clamped(anchor: NaiveDateTime, months: u32) -> Option<NaiveDateTime> {
    let total = anchor.year() as i64 * 12 + anchor.month0() as i64 + months as i64;
    let year = i32::try_from(total.div_euclid(12)).ok()?;
    let month = (total.rem_euclid(12) + 1) as u32;
    let day = anchor.day().min(days_in_month(year, month)?);
    NaiveDate::from_ymd_opt(year, month, day).map(|date| date.and_time(anchor.time()))
}

fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let (next_year, next_month) = if month == 12 {
        (year.checked_add(1)?, 1)
    } else {
        (year, month + 1)
    };
    match NaiveDate::from_ymd_opt(next_year, next_month, 1) {
        Some(first_of_next) => first_of_next.pred_opt().map(|d| d.day()),
        // December of the last representable year.
        None => Some(31),
    }
}

/// Expands `rule` from `anchor` into an ordered list of timestamps.
///
/// # Arguments
/// * `window_start` / `window_end` - Optional inclusive bounds on the output
/// * `max_results` - Result limit; `None` means [`DEFAULT_MAX_RESULTS`]
///
/// # Behavior
/// - Output is strictly increasing and every element is `>= anchor`
/// - `COUNT` is counted from the anchor, not from `window_start`
/// - An empty result is not an error
///
/// # Errors
/// Returns `CoreError::InvalidRule` if the rule violates its invariants.
pub fn expand(
    rule: &RecurrenceRule,
    anchor: NaiveDateTime,
    window_start: Option<NaiveDateTime>,
    window_end: Option<NaiveDateTime>,
    max_results: Option<usize>,
) -> Result<Vec<NaiveDateTime>, CoreError> {
    let mut occurrences = Occurrences::new(rule, anchor)?;
    let limit = max_results.unwrap_or(DEFAULT_MAX_RESULTS);
    let mut result = Vec::new();

    if limit == 0 {
        return Ok(result);
    }
    if let (Some(start), Some(end)) = (window_start, window_end) {
        if start > end {
            return Ok(result);
        }
    }
    if let Some(start) = window_start {
        occurrences.fast_forward(start);
    }

    for at in occurrences {
        if window_end.is_some_and(|end| at > end) {
            break;
        }
        if window_start.is_some_and(|start| at < start) {
            continue;
        }
        result.push(at);
        if result.len() >= limit {
            break;
        }
    }

    debug!(rule = %rule, %anchor, found = result.len(), "expanded recurrence rule");
    Ok(result)
}

/// [`expand`] over a [`Window`].
pub fn expand_window(
    rule: &RecurrenceRule,
    anchor: NaiveDateTime,
    window: &Window,
    max_results: Option<usize>,
) -> Result<Vec<NaiveDateTime>, CoreError> {
    expand(rule, anchor, Some(window.start), Some(window.end), max_results)
}

/// The next `count` occurrences at or after `from`.
pub fn preview(
    rule: &RecurrenceRule,
    anchor: NaiveDateTime,
    from: NaiveDateTime,
    count: usize,
) -> Result<Vec<NaiveDateTime>, CoreError> {
    expand(rule, anchor, Some(from), None, Some(count))
}

/// First occurrence strictly after `after`, or `None` once the rule has ended.
pub fn next_occurrence_after(
    rule: &RecurrenceRule,
    anchor: NaiveDateTime,
    after: NaiveDateTime,
) -> Result<Option<NaiveDateTime>, CoreError> {
    let mut occurrences = Occurrences::new(rule, anchor)?;
    occurrences.fast_forward(after);
    Ok(occurrences.find(|at| *at > after))
}
