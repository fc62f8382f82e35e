//! Merges expanded candidates with per-date exceptions and persisted occurrences.

use std::collections::{BTreeSet, HashMap};

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Task, TaskOccurrence, TaskStatus};

/// An occurrence as the user sees it, whether or not it has been stored yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveOccurrence {
    pub occurrence: TaskOccurrence,
    /// False for occurrences synthesized from the rule that have no stored row.
    pub materialized: bool,
    pub title: String,
    pub due_at: NaiveDateTime,
}

impl EffectiveOccurrence {
    fn new(task: &Task, occurrence: TaskOccurrence, materialized: bool) -> Self {
        let title = occurrence.effective_title(&task.title).to_string();
        let due_at = occurrence.effective_due_at();
        Self {
            occurrence,
            materialized,
            title,
            due_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.occurrence.id
    }

    pub fn scheduled_at(&self) -> NaiveDateTime {
        self.occurrence.scheduled_at
    }

    pub fn status(&self) -> TaskStatus {
        self.occurrence.status
    }
}

/// Resolves `candidates` for `task`.
///
/// A candidate whose date is in `exceptions` is dropped. Otherwise the persisted
/// occurrence at that exact timestamp is surfaced with its overrides and completion
/// state, or a pending occurrence is synthesized. Candidates are expected in
/// ascending order and the output keeps that order.
pub fn resolve(
    task: &Task,
    candidates: &[NaiveDateTime],
    exceptions: &BTreeSet<NaiveDate>,
    existing: &[TaskOccurrence],
) -> Vec<EffectiveOccurrence> {
    let persisted: HashMap<NaiveDateTime, &TaskOccurrence> =
        existing.iter().map(|o| (o.scheduled_at, o)).collect();

    candidates
        .iter()
        .filter(|at| !exceptions.contains(&at.date()))
        .map(|at| match persisted.get(at) {
            Some(stored) => EffectiveOccurrence::new(task, (*stored).clone(), true),
            None => EffectiveOccurrence::new(task, TaskOccurrence::pending(task.id, *at), false),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recurrence::expand;
    use crate::rule::RecurrenceRule;
    use chrono::{Utc, Weekday};

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn create_test_task() -> Task {
        Task {
            title: "Water plants".to_string(),
            rule: Some(RecurrenceRule::weekly([Weekday::Mon, Weekday::Wed]).count(4)),
            due_at: Some(at(2024, 1, 1, 9)),
            ..Default::default()
        }
    }

    #[test]
    fn test_exception_removes_only_that_date() {
        let task = create_test_task();
        let (rule, anchor) = task.recurrence().unwrap().unwrap();
        let candidates = expand(rule, anchor, None, None, None).unwrap();
        let exceptions = BTreeSet::from([NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()]);

        let resolved = resolve(&task, &candidates, &exceptions, &[]);
        let times: Vec<_> = resolved.iter().map(|e| e.scheduled_at()).collect();
        assert_eq!(times, vec![at(2024, 1, 1, 9), at(2024, 1, 8, 9), at(2024, 1, 10, 9)]);
    }

    #[test]
    fn test_synthesized_occurrences_are_pending_and_unmaterialized() {
        let task = create_test_task();
        let resolved = resolve(&task, &[at(2024, 1, 1, 9)], &BTreeSet::new(), &[]);
        assert_eq!(resolved.len(), 1);
        let effective = &resolved[0];
        assert!(!effective.materialized);
        assert_eq!(effective.status(), TaskStatus::Pending);
        assert_eq!(effective.title, "Water plants");
        assert_eq!(effective.due_at, at(2024, 1, 1, 9));
        assert_eq!(effective.id(), TaskOccurrence::pending(task.id, at(2024, 1, 1, 9)).id);
    }

    #[test]
    fn test_persisted_overrides_and_completion_survive() {
        let task = create_test_task();
        let mut stored = TaskOccurrence::pending(task.id, at(2024, 1, 3, 9));
        stored.override_title = Some("Water plants (balcony)".to_string());
        stored.override_due_at = Some(at(2024, 1, 3, 17));
        stored.mark_completed(Utc::now());

        let resolved = resolve(
            &task,
            &[at(2024, 1, 1, 9), at(2024, 1, 3, 9)],
            &BTreeSet::new(),
            std::slice::from_ref(&stored),
        );
        assert!(!resolved[0].materialized);
        let second = &resolved[1];
        assert!(second.materialized);
        assert_eq!(second.title, "Water plants (balcony)");
        assert_eq!(second.due_at, at(2024, 1, 3, 17));
        assert_eq!(second.status(), TaskStatus::Completed);
        assert_eq!(second.occurrence, stored);
    }

    #[test]
    fn test_persisted_row_at_other_time_is_not_matched() {
        let task = create_test_task();
        let stored = TaskOccurrence::pending(task.id, at(2024, 1, 1, 10));
        let resolved = resolve(&task, &[at(2024, 1, 1, 9)], &BTreeSet::new(), &[stored]);
        assert!(!resolved[0].materialized);
    }

    #[test]
    fn test_empty_override_title_falls_back() {
        let task = create_test_task();
        let mut stored = TaskOccurrence::pending(task.id, at(2024, 1, 1, 9));
        stored.override_title = Some(String::new());
        let resolved = resolve(&task, &[at(2024, 1, 1, 9)], &BTreeSet::new(), &[stored]);
        assert_eq!(resolved[0].title, "Water plants");
    }
}
