use crate::db::DbPool;
use crate::error::CoreError;
use crate::materialization::{MaterializationManager, MutationSet, ReconciliationSummary};
use crate::models::{
    Anchor, NewTaskData, OccurrenceOverride, RecurrenceException, Task, TaskOccurrence, Window,
};
use crate::resolver::EffectiveOccurrence;
use crate::rule::RecurrenceRule;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::{Sqlite, Transaction};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub mod exceptions;
pub mod materialization;
pub mod occurrences;
pub mod tasks;

/// Storage collaborator consumed by the reconciliation flow.
#[async_trait]
pub trait OccurrenceStore {
    async fn load_exceptions(&self, task_id: Uuid) -> Result<BTreeSet<NaiveDate>, CoreError>;
    /// Persisted occurrences of `task_id` inside `window`, ordered by `scheduled_at`.
    async fn load_occurrences(&self, task_id: Uuid, window: &Window) -> Result<Vec<TaskOccurrence>, CoreError>;
    /// Applies every mutation or none of them.
    async fn apply_mutations(&self, mutations: &MutationSet) -> Result<(), CoreError>;
}

/// Domain-specific trait for task operations
#[async_trait]
pub trait TaskRepository {
    async fn add_task(&self, data: NewTaskData) -> Result<Task, CoreError>;
    async fn find_task_by_id(&self, id: Uuid) -> Result<Option<Task>, CoreError>;
    async fn find_tasks(&self) -> Result<Vec<Task>, CoreError>;
    /// Resolves a short id. Fails with `InvalidInput` when several tasks match.
    async fn find_task_by_id_prefix(&self, prefix: &str) -> Result<Task, CoreError>;
    async fn find_recurring_tasks(&self) -> Result<Vec<Task>, CoreError>;
    /// Replaces (or removes) the task's rule and re-reconciles its occurrences.
    async fn update_task_rule(
        &self,
        id: Uuid,
        rule: Option<RecurrenceRule>,
        recurrence_start: Option<Anchor>,
    ) -> Result<Task, CoreError>;
    async fn delete_task(&self, id: Uuid) -> Result<(), CoreError>;
}

/// Domain-specific trait for exception operations
#[async_trait]
pub trait ExceptionRepository {
    async fn add_exception(&self, task_id: Uuid, date: NaiveDate) -> Result<RecurrenceException, CoreError>;
    async fn find_exceptions(&self, task_id: Uuid) -> Result<Vec<RecurrenceException>, CoreError>;
    async fn remove_exception(&self, task_id: Uuid, date: NaiveDate) -> Result<(), CoreError>;
}

/// Domain-specific trait for operations on single occurrences
#[async_trait]
pub trait OccurrenceRepository {
    /// Effective occurrences of the task in `window`, stored or synthesized.
    async fn find_effective_occurrences(
        &self,
        task_id: Uuid,
        window: &Window,
    ) -> Result<Vec<EffectiveOccurrence>, CoreError>;
    /// Deletes the instance on `date`: records an exception and removes its row.
    async fn skip_occurrence(&self, task_id: Uuid, date: NaiveDate) -> Result<RecurrenceException, CoreError>;
    async fn complete_occurrence(&self, task_id: Uuid, scheduled_at: NaiveDateTime) -> Result<TaskOccurrence, CoreError>;
    async fn reopen_occurrence(&self, task_id: Uuid, scheduled_at: NaiveDateTime) -> Result<TaskOccurrence, CoreError>;
    async fn override_occurrence(
        &self,
        task_id: Uuid,
        scheduled_at: NaiveDateTime,
        changes: OccurrenceOverride,
    ) -> Result<TaskOccurrence, CoreError>;
}

/// Domain-specific trait for materialization operations
#[async_trait]
pub trait MaterializationRepository {
    async fn reconcile_task(&self, task_id: Uuid, window: &Window) -> Result<MutationSet, CoreError>;
    async fn reconcile_all(&self, window: &Window) -> Result<ReconciliationSummary, CoreError>;
    /// Like [`reconcile_all`](Self::reconcile_all), but each task over the default
    /// horizon in its own timezone.
    async fn reconcile_horizons(&self) -> Result<ReconciliationSummary, CoreError>;
}

/// Main repository trait that composes all domain traits
pub trait Repository:
    TaskRepository
    + ExceptionRepository
    + OccurrenceRepository
    + MaterializationRepository
    + OccurrenceStore
    + Send
    + Sync
{
}

/// SQLite implementation of the repository pattern
pub struct SqliteRepository {
    pool: DbPool,
    materialization_manager: MaterializationManager,
    task_locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl SqliteRepository {
    pub fn new(pool: DbPool, materialization_manager: MaterializationManager) -> Self {
        Self {
            pool,
            materialization_manager,
            task_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Get a reference to the database pool for internal use across modules
    pub(crate) fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn materialization_manager(&self) -> &MaterializationManager {
        &self.materialization_manager
    }

    /// Opens a transaction that holds SQLite's write lock from its first statement.
    ///
    /// A plain deferred transaction that reads before it writes cannot wait for a
    /// concurrent writer: the upgrade to the write lock fails with `SQLITE_BUSY`
    /// without consulting the busy timeout. Starting with a write means the lock is
    /// taken up front, where SQLite does wait.
    pub(crate) async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>, CoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM task_occurrences WHERE 0")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    /// Lock serializing writes to one task's occurrences.
    pub(crate) fn task_lock(&self, task_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.task_locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(task_id).or_default().clone()
    }

    pub(crate) fn forget_task_lock(&self, task_id: Uuid) {
        let mut locks = self.task_locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.remove(&task_id);
    }
}

impl Repository for SqliteRepository {}
