use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::error::CoreError;
use crate::rule::RecurrenceRule;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Completed,
    Cancelled,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid task status: {0}")]
pub struct ParseTaskStatusError(String);

impl FromStr for TaskStatus {
    type Err = ParseTaskStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "completed" => Ok(TaskStatus::Completed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            _ => Err(ParseTaskStatusError(s.to_string())),
        }
    }
}

/// Where a recurring task's expansion starts: a calendar date and an optional time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub date: NaiveDate,
    /// `None` means the occurrences fall at midnight.
    pub time: Option<NaiveTime>,
}

impl Anchor {
    pub fn new(date: NaiveDate, time: Option<NaiveTime>) -> Self {
        Self { date, time }
    }

    pub fn at(&self) -> NaiveDateTime {
        self.date.and_time(self.time.unwrap_or(NaiveTime::MIN))
    }
}

impl From<NaiveDateTime> for Anchor {
    fn from(value: NaiveDateTime) -> Self {
        Self {
            date: value.date(),
            time: Some(value.time()),
        }
    }
}

/// The generative template. A task without a rule is a single, non-recurring item.
///
/// All wall-clock fields (`due_at`, the anchor, occurrence times) are local to `timezone`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub notes: Option<String>,
    pub due_at: Option<NaiveDateTime>,
    pub status: TaskStatus,
    pub rule: Option<RecurrenceRule>,
    pub recurrence_start: Option<Anchor>,
    /// IANA timezone name, e.g. "Europe/Moscow"
    pub timezone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Task {
    fn default() -> Self {
        Self {
            id: Uuid::now_v7(),
            title: String::new(),
            notes: None,
            due_at: None,
            status: TaskStatus::Pending,
            rule: None,
            recurrence_start: None,
            timezone: "UTC".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

impl Task {
    pub fn is_recurring(&self) -> bool {
        self.rule.is_some()
    }

    /// The first timestamp the rule is computed from. Falls back to `due_at` when no
    /// explicit recurrence start was stored.
    pub fn anchor(&self) -> Option<NaiveDateTime> {
        self.recurrence_start.map(|a| a.at()).or(self.due_at)
    }

    /// Rule and anchor together, or an error when a recurring task cannot be expanded.
    pub fn recurrence(&self) -> Result<Option<(&RecurrenceRule, NaiveDateTime)>, CoreError> {
        match &self.rule {
            None => Ok(None),
            Some(rule) => {
                let anchor = self.anchor().ok_or_else(|| {
                    CoreError::InvalidRule(format!("task {} has a rule but no recurrence start", self.id))
                })?;
                Ok(Some((rule, anchor)))
            }
        }
    }
}

/// Derives the stable identifier of the occurrence of `task_id` scheduled at `scheduled_at`.
///
/// Re-synthesising the same occurrence always yields the same id, so expansion stays
/// free of side effects.
pub fn occurrence_id(task_id: Uuid, scheduled_at: NaiveDateTime) -> Uuid {
    let key = scheduled_at.format("%Y-%m-%dT%H:%M:%S").to_string();
    Uuid::new_v5(&task_id, key.as_bytes())
}

/// One materialized instance of a recurring task, identified by `(task_id, scheduled_at)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TaskOccurrence {
    pub id: Uuid,
    pub task_id: Uuid,
    /// Timestamp produced by the rule; never changes for the lifetime of the row.
    pub scheduled_at: NaiveDateTime,
    pub status: TaskStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub override_title: Option<String>,
    pub override_due_at: Option<NaiveDateTime>,
    /// Set on rows kept for their history after the rule stopped generating them.
    pub orphaned: bool,
}

impl TaskOccurrence {
    /// A fresh, pending occurrence with no overrides.
    pub fn pending(task_id: Uuid, scheduled_at: NaiveDateTime) -> Self {
        Self {
            id: occurrence_id(task_id, scheduled_at),
            task_id,
            scheduled_at,
            status: TaskStatus::Pending,
            completed_at: None,
            override_title: None,
            override_due_at: None,
            orphaned: false,
        }
    }

    pub fn effective_title<'a>(&'a self, template_title: &'a str) -> &'a str {
        match self.override_title.as_deref() {
            Some(title) if !title.is_empty() => title,
            _ => template_title,
        }
    }

    pub fn effective_due_at(&self) -> NaiveDateTime {
        self.override_due_at.unwrap_or(self.scheduled_at)
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// True once the user has recorded an outcome (done or cancelled) on this instance.
    pub fn has_history(&self) -> bool {
        self.status != TaskStatus::Pending
    }

    pub fn mark_completed(&mut self, at: DateTime<Utc>) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(at);
    }

    pub fn mark_pending(&mut self) {
        self.status = TaskStatus::Pending;
        self.completed_at = None;
    }
}

/// "Suppress the occurrence that would otherwise fall on this date."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RecurrenceException {
    pub task_id: Uuid,
    pub exception_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Inclusive range of local wall-clock timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Window {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, CoreError> {
        if start > end {
            return Err(CoreError::InvalidInput(format!(
                "window start {} is after window end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Whole calendar days from `first` through `last`.
    pub fn dates(first: NaiveDate, last: NaiveDate) -> Result<Self, CoreError> {
        let end = last
            .and_hms_opt(23, 59, 59)
            .ok_or_else(|| CoreError::InvalidInput(format!("invalid date {}", last)))?;
        Self::new(first.and_time(NaiveTime::MIN), end)
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        self.start <= at && at <= self.end
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewTaskData {
    pub title: String,
    pub notes: Option<String>,
    pub due_at: Option<NaiveDateTime>,
    /// When present the task becomes a recurring template.
    pub rule: Option<RecurrenceRule>,
    pub recurrence_start: Option<Anchor>,
    /// Defaults to UTC
    pub timezone: Option<String>,
}

/// Per-occurrence field overrides. `Some(None)` clears an existing override.
#[derive(Debug, Clone, Default)]
pub struct OccurrenceOverride {
    pub title: Option<Option<String>>,
    pub due_at: Option<Option<NaiveDateTime>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_occurrence_id_is_deterministic() {
        let task_id = Uuid::now_v7();
        let a = occurrence_id(task_id, at(2024, 1, 1, 9, 0));
        let b = occurrence_id(task_id, at(2024, 1, 1, 9, 0));
        let c = occurrence_id(task_id, at(2024, 1, 2, 9, 0));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, occurrence_id(Uuid::now_v7(), at(2024, 1, 1, 9, 0)));
    }

    #[test]
    fn test_effective_fields_prefer_overrides() {
        let mut occurrence = TaskOccurrence::pending(Uuid::now_v7(), at(2024, 1, 1, 9, 0));
        assert_eq!(occurrence.effective_title("Standup"), "Standup");
        assert_eq!(occurrence.effective_due_at(), at(2024, 1, 1, 9, 0));

        occurrence.override_title = Some("Standup (remote)".to_string());
        occurrence.override_due_at = Some(at(2024, 1, 1, 10, 30));
        assert_eq!(occurrence.effective_title("Standup"), "Standup (remote)");
        assert_eq!(occurrence.effective_due_at(), at(2024, 1, 1, 10, 30));
    }

    #[test]
    fn test_mark_completed_and_pending() {
        let mut occurrence = TaskOccurrence::pending(Uuid::now_v7(), at(2024, 1, 1, 9, 0));
        occurrence.mark_completed(Utc::now());
        assert!(occurrence.is_completed());
        assert!(occurrence.completed_at.is_some());
        occurrence.mark_pending();
        assert!(!occurrence.has_history());
        assert!(occurrence.completed_at.is_none());
    }

    #[test]
    fn test_anchor_falls_back_to_due_at() {
        let task = Task {
            due_at: Some(at(2024, 5, 1, 8, 0)),
            ..Default::default()
        };
        assert_eq!(task.anchor(), Some(at(2024, 5, 1, 8, 0)));

        let task = Task {
            recurrence_start: Some(Anchor::new(NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(), None)),
            due_at: Some(at(2024, 5, 1, 8, 0)),
            ..Default::default()
        };
        assert_eq!(task.anchor(), Some(at(2024, 5, 2, 0, 0)));
    }

    #[test]
    fn test_recurring_task_without_anchor_is_invalid() {
        let task = Task {
            rule: Some(RecurrenceRule::daily()),
            ..Default::default()
        };
        assert!(matches!(task.recurrence(), Err(CoreError::InvalidRule(_))));
    }

    #[test]
    fn test_window_rejects_inverted_bounds() {
        assert!(Window::new(at(2024, 1, 2, 0, 0), at(2024, 1, 1, 0, 0)).is_err());
        let window = Window::dates(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        )
        .unwrap();
        assert!(window.contains(at(2024, 1, 1, 23, 59)));
        assert!(!window.contains(at(2024, 1, 2, 0, 0)));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("Completed".parse::<TaskStatus>(), Ok(TaskStatus::Completed));
        assert!("done".parse::<TaskStatus>().is_err());
        assert_eq!(TaskStatus::Cancelled.to_string(), "cancelled");
    }
}
