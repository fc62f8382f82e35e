//! Reconciliation of persisted occurrences against what a task's rule generates.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::time::Instant;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{Task, TaskOccurrence, Window};
use crate::recurrence::expand_window;
use crate::resolver::resolve;

/// Configuration for materialization behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterializationConfig {
    /// How far ahead of now occurrences are materialized (days)
    pub horizon_days: u32,
    /// Include near-past in the horizon (days)
    pub grace_days: u32,
    /// Expansion limit per task and pass
    pub max_results: usize,
    /// Minutes before an occurrence's due time that its reminder fires
    pub reminder_lead_minutes: u32,
}

impl Default for MaterializationConfig {
    fn default() -> Self {
        Self {
            horizon_days: 90,
            grace_days: 3,
            max_results: 500,
            reminder_lead_minutes: 15,
        }
    }
}

/// One change the storage collaborator must apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Insert(TaskOccurrence),
    Update(TaskOccurrence),
    Delete(TaskOccurrence),
}

impl Mutation {
    pub fn occurrence(&self) -> &TaskOccurrence {
        match self {
            Mutation::Insert(o) | Mutation::Update(o) | Mutation::Delete(o) => o,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::Insert(_) => "insert",
            Mutation::Update(_) => "update",
            Mutation::Delete(_) => "delete",
        }
    }
}

/// All mutations produced for one task by one reconciliation pass.
///
/// Must be applied all-or-nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationSet {
    pub task_id: Uuid,
    pub mutations: Vec<Mutation>,
}

impl MutationSet {
    pub fn empty(task_id: Uuid) -> Self {
        Self {
            task_id,
            mutations: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mutation> {
        self.mutations.iter()
    }

    pub fn inserts(&self) -> usize {
        self.count(|m| matches!(m, Mutation::Insert(_)))
    }

    pub fn updates(&self) -> usize {
        self.count(|m| matches!(m, Mutation::Update(_)))
    }

    pub fn deletes(&self) -> usize {
        self.count(|m| matches!(m, Mutation::Delete(_)))
    }

    fn count(&self, pred: impl Fn(&Mutation) -> bool) -> usize {
        self.mutations.iter().filter(|m| pred(m)).count()
    }
}

impl fmt::Display for MutationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} inserted, {} updated, {} deleted",
            self.inserts(),
            self.updates(),
            self.deletes()
        )
    }
}

/// Statistics collected during a batch reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationSummary {
    pub tasks_processed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub tasks_with_errors: usize,
    /// Detailed error messages, one per failed task
    pub errors: Vec<String>,
    /// Time taken for the operation
    pub duration_ms: u64,
}

impl ReconciliationSummary {
    pub fn record_applied(&mut self, set: &MutationSet) {
        self.tasks_processed += 1;
        self.inserted += set.inserts();
        self.updated += set.updates();
        self.deleted += set.deletes();
    }

    pub fn record_failure(&mut self, task_id: Uuid, error: &CoreError) {
        self.tasks_processed += 1;
        self.tasks_with_errors += 1;
        self.errors.push(format!("task {}: {}", task_id, error));
    }

    pub fn total_mutations(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

/// Snapshot of one task's state, read under a single logical read by the caller.
#[derive(Debug, Clone, Copy)]
pub struct ReconciliationInput<'a> {
    pub task: &'a Task,
    pub exceptions: &'a BTreeSet<NaiveDate>,
    pub persisted: &'a [TaskOccurrence],
}

#[derive(Debug)]
pub struct TaskOutcome {
    pub task_id: Uuid,
    pub result: Result<MutationSet, CoreError>,
}

/// Computes the mutations that bring persisted occurrences in line with each task's rule.
///
/// Responsibilities:
/// 1. Determine the materialization horizon from configuration
/// 2. Expand and resolve every task's rule inside a window
/// 3. Diff the expected occurrences against the persisted ones
///
/// The manager is pure: it reads nothing and writes nothing. Applying a
/// [`MutationSet`] is the storage collaborator's job.
#[derive(Debug, Clone, Default)]
pub struct MaterializationManager {
    config: MaterializationConfig,
}

impl MaterializationManager {
    pub fn new(config: MaterializationConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(MaterializationConfig::default())
    }

    pub fn config(&self) -> &MaterializationConfig {
        &self.config
    }

    pub fn update_config(&mut self, config: MaterializationConfig) {
        self.config = config;
    }

    /// The default window `[now - grace_days, now + horizon_days]` in local time.
    pub fn horizon(&self, now: NaiveDateTime) -> Window {
        let start = now
            .checked_sub_signed(Duration::days(self.config.grace_days as i64))
            .unwrap_or(NaiveDateTime::MIN);
        let end = now
            .checked_add_signed(Duration::days(self.config.horizon_days as i64))
            .unwrap_or(NaiveDateTime::MAX);
        Window { start, end }
    }

    /// Diffs what `task` should have in `window` against `persisted`.
    ///
    /// # Behavior
    /// - Expected but not persisted: `Insert` of a pending occurrence
    /// - Persisted but not expected: `Delete`, or an `Update` flagging it orphaned
    ///   when it holds a completed or cancelled outcome
    /// - An orphaned occurrence generated again: `Update` clearing the flag
    /// - When `max_results` truncates the expansion, persisted occurrences after the
    ///   last expanded one are left alone
    ///
    /// # Errors
    /// `CoreError::InvalidRule` when the task's rule cannot be expanded. Nothing is
    /// returned for the task in that case, so persisted state stays untouched.
    pub fn reconcile(
        &self,
        task: &Task,
        exceptions: &BTreeSet<NaiveDate>,
        persisted: &[TaskOccurrence],
        window: &Window,
    ) -> Result<MutationSet, CoreError> {
        let limit = self.config.max_results;
        let (expected, scope_end) = match task.recurrence()? {
            None => (Vec::new(), window.end),
            Some(_) if limit == 0 => return Ok(MutationSet::empty(task.id)),
            Some((rule, anchor)) => {
                let candidates = expand_window(rule, anchor, window, Some(limit))?;
                let scope_end = match candidates.last() {
                    Some(last) if candidates.len() >= limit => *last,
                    _ => window.end,
                };
                (resolve(task, &candidates, exceptions, persisted), scope_end)
            }
        };

        let mut mutations = Vec::new();
        for effective in &expected {
            if !effective.materialized {
                mutations.push(Mutation::Insert(effective.occurrence.clone()));
            } else if effective.occurrence.orphaned {
                let mut revived = effective.occurrence.clone();
                revived.orphaned = false;
                mutations.push(Mutation::Update(revived));
            }
        }

        let expected_at: HashSet<NaiveDateTime> = expected.iter().map(|e| e.scheduled_at()).collect();
        let in_scope = persisted
            .iter()
            .filter(|o| o.task_id == task.id)
            .filter(|o| window.contains(o.scheduled_at) && o.scheduled_at <= scope_end)
            .filter(|o| !expected_at.contains(&o.scheduled_at));
        for stored in in_scope {
            if !stored.has_history() {
                mutations.push(Mutation::Delete(stored.clone()));
            } else if !stored.orphaned {
                let mut kept = stored.clone();
                kept.orphaned = true;
                mutations.push(Mutation::Update(kept));
            }
        }

        mutations.sort_by_key(|m| m.occurrence().scheduled_at);
        let set = MutationSet {
            task_id: task.id,
            mutations,
        };
        debug!(task_id = %task.id, expected = expected.len(), persisted = persisted.len(), %set, "reconciled task");
        Ok(set)
    }

    /// Reconciles a batch of tasks. A failing task is logged and reported in its
    /// outcome; it never stops the others.
    pub fn reconcile_many<'a, I>(&self, inputs: I, window: &Window) -> (Vec<TaskOutcome>, ReconciliationSummary)
    where
        I: IntoIterator<Item = ReconciliationInput<'a>>,
    {
        let started = Instant::now();
        let mut summary = ReconciliationSummary::default();
        let mut outcomes = Vec::new();

        for input in inputs {
            let result = self.reconcile(input.task, input.exceptions, input.persisted, window);
            match &result {
                Ok(set) => summary.record_applied(set),
                Err(e) => {
                    warn!(task_id = %input.task.id, error = %e, "skipping task that failed to reconcile");
                    summary.record_failure(input.task.id, e);
                }
            }
            outcomes.push(TaskOutcome {
                task_id: input.task.id,
                result,
            });
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        (outcomes, summary)
    }
}
