//! Reminder planning for recurring tasks.
//!
//! Planning is pure; delivery goes through a [`ReminderScheduler`] supplied by the host.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{Task, TaskStatus};
use crate::resolver::EffectiveOccurrence;
use crate::timezone::local_to_utc;

/// Host-side notification facility. At most one reminder is outstanding per task.
pub trait ReminderScheduler {
    fn schedule(&mut self, task_id: Uuid, fire_at: DateTime<Utc>, title: &str) -> Result<(), CoreError>;
    fn cancel(&mut self, task_id: Uuid) -> Result<(), CoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub task_id: Uuid,
    pub occurrence_id: Uuid,
    pub title: String,
    pub due_at: DateTime<Utc>,
    pub fire_at: DateTime<Utc>,
}

/// Picks the reminder for the next pending occurrence that is not yet due.
///
/// Returns `None` when there is no such occurrence or when its fire time
/// (`due - lead`) has already passed.
pub fn plan_reminder(
    task: &Task,
    effective: &[EffectiveOccurrence],
    lead: Duration,
    now: DateTime<Utc>,
) -> Result<Option<Reminder>, CoreError> {
    let mut next: Option<(&EffectiveOccurrence, DateTime<Utc>)> = None;
    for candidate in effective.iter().filter(|e| e.status() == TaskStatus::Pending) {
        let due_at = local_to_utc(candidate.due_at, &task.timezone)?;
        if due_at <= now {
            continue;
        }
        if next.map_or(true, |(_, best)| due_at < best) {
            next = Some((candidate, due_at));
        }
    }

    let Some((occurrence, due_at)) = next else {
        return Ok(None);
    };
    let fire_at = due_at - lead;
    if fire_at <= now {
        debug!(task_id = %task.id, %due_at, "reminder fire time already passed");
        return Ok(None);
    }
    Ok(Some(Reminder {
        task_id: task.id,
        occurrence_id: occurrence.id(),
        title: occurrence.title.clone(),
        due_at,
        fire_at,
    }))
}

/// Cancels the task's outstanding reminder and schedules the next one, if any.
pub fn refresh_reminder<S: ReminderScheduler + ?Sized>(
    scheduler: &mut S,
    task: &Task,
    effective: &[EffectiveOccurrence],
    lead: Duration,
    now: DateTime<Utc>,
) -> Result<Option<Reminder>, CoreError> {
    scheduler.cancel(task.id)?;
    let reminder = plan_reminder(task, effective, lead, now)?;
    if let Some(reminder) = &reminder {
        scheduler.schedule(task.id, reminder.fire_at, &reminder.title)?;
    }
    Ok(reminder)
}
