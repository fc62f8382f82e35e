use crate::error::CoreError;
use crate::materialization::{Mutation, MutationSet};
use crate::models::{OccurrenceOverride, RecurrenceException, Task, TaskOccurrence, Window};
use crate::recurrence::{expand, expand_window};
use crate::repository::SqliteRepository;
use crate::resolver::{resolve, EffectiveOccurrence};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use sqlx::{Sqlite, Transaction};
use std::collections::BTreeSet;
use tracing::{debug, info, instrument};
use uuid::Uuid;

fn conflict(occurrence: &TaskOccurrence, reason: &str) -> CoreError {
    CoreError::ReconciliationConflict {
        task_id: occurrence.task_id,
        scheduled_at: occurrence.scheduled_at,
        reason: reason.to_string(),
    }
}

#[async_trait]
impl super::OccurrenceStore for SqliteRepository {
    async fn load_exceptions(&self, task_id: Uuid) -> Result<BTreeSet<NaiveDate>, CoreError> {
        let mut tx = self.pool().begin().await?;
        let exceptions = Self::load_exceptions_in_transaction(&mut tx, task_id).await?;
        tx.commit().await?;
        Ok(exceptions)
    }

    async fn load_occurrences(&self, task_id: Uuid, window: &Window) -> Result<Vec<TaskOccurrence>, CoreError> {
        let mut tx = self.pool().begin().await?;
        let occurrences = Self::load_occurrences_in_transaction(&mut tx, task_id, window).await?;
        tx.commit().await?;
        Ok(occurrences)
    }

    async fn apply_mutations(&self, mutations: &MutationSet) -> Result<(), CoreError> {
        let lock = self.task_lock(mutations.task_id);
        let _guard = lock.lock().await;

        let mut tx = self.begin_write().await?;
        Self::apply_mutations_in_transaction(&mut tx, mutations).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl super::OccurrenceRepository for SqliteRepository {
    async fn find_effective_occurrences(
        &self,
        task_id: Uuid,
        window: &Window,
    ) -> Result<Vec<EffectiveOccurrence>, CoreError> {
        let mut tx = self.pool().begin().await?;
        let task = Self::require_task_in_transaction(&mut tx, task_id).await?;
        let Some((rule, anchor)) = task.recurrence()? else {
            return Ok(Vec::new());
        };
        let exceptions = Self::load_exceptions_in_transaction(&mut tx, task_id).await?;
        let persisted = Self::load_occurrences_in_transaction(&mut tx, task_id, window).await?;
        tx.commit().await?;

        let limit = self.materialization_manager().config().max_results;
        let candidates = expand_window(rule, anchor, window, Some(limit))?;
        Ok(resolve(&task, &candidates, &exceptions, &persisted))
    }

    #[instrument(skip(self))]
    async fn skip_occurrence(&self, task_id: Uuid, date: NaiveDate) -> Result<RecurrenceException, CoreError> {
        let lock = self.task_lock(task_id);
        let _guard = lock.lock().await;

        let mut tx = self.begin_write().await?;
        Self::ensure_task_exists_in_transaction(&mut tx, task_id).await?;
        let exception = Self::add_exception_in_transaction(&mut tx, task_id, date).await?;

        let day = Window::dates(date, date)?;
        let removed = sqlx::query(
            "DELETE FROM task_occurrences WHERE task_id = $1 AND scheduled_at >= $2 AND scheduled_at <= $3",
        )
        .bind(task_id)
        .bind(day.start)
        .bind(day.end)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        tx.commit().await?;

        info!(%task_id, %date, removed, "occurrence skipped");
        Ok(exception)
    }

    async fn complete_occurrence(&self, task_id: Uuid, scheduled_at: NaiveDateTime) -> Result<TaskOccurrence, CoreError> {
        self.modify_occurrence(task_id, scheduled_at, |occurrence| {
            if !occurrence.is_completed() {
                occurrence.mark_completed(Utc::now());
            }
        })
        .await
    }

    async fn reopen_occurrence(&self, task_id: Uuid, scheduled_at: NaiveDateTime) -> Result<TaskOccurrence, CoreError> {
        self.modify_occurrence(task_id, scheduled_at, TaskOccurrence::mark_pending).await
    }

    async fn override_occurrence(
        &self,
        task_id: Uuid,
        scheduled_at: NaiveDateTime,
        changes: OccurrenceOverride,
    ) -> Result<TaskOccurrence, CoreError> {
        self.modify_occurrence(task_id, scheduled_at, move |occurrence| {
            if let Some(title) = changes.title {
                occurrence.override_title = title.filter(|t| !t.trim().is_empty());
            }
            if let Some(due_at) = changes.due_at {
                occurrence.override_due_at = due_at;
            }
        })
        .await
    }
}

impl SqliteRepository {
    /// Loads (materializing if needed) the occurrence at `scheduled_at`, applies
    /// `change`, and stores it, all under the task's lock.
    async fn modify_occurrence<F>(
        &self,
        task_id: Uuid,
        scheduled_at: NaiveDateTime,
        change: F,
    ) -> Result<TaskOccurrence, CoreError>
    where
        F: FnOnce(&mut TaskOccurrence) + Send,
    {
        let lock = self.task_lock(task_id);
        let _guard = lock.lock().await;

        let mut tx = self.begin_write().await?;
        let task = Self::require_task_in_transaction(&mut tx, task_id).await?;
        let mut occurrence = Self::materialize_in_transaction(&mut tx, &task, scheduled_at).await?;
        change(&mut occurrence);
        Self::update_occurrence_in_transaction(&mut tx, &occurrence).await?;
        tx.commit().await?;

        debug!(%task_id, %scheduled_at, status = %occurrence.status, "occurrence updated");
        Ok(occurrence)
    }

    pub(crate) async fn require_task_in_transaction<'a>(
        tx: &mut Transaction<'a, Sqlite>,
        task_id: Uuid,
    ) -> Result<Task, CoreError> {
        Self::find_task_by_id_in_transaction(tx, task_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Task with id {} not found", task_id)))
    }

    /// Returns the stored occurrence at `scheduled_at`, inserting it first when the
    /// rule generates that timestamp but it has not been materialized yet.
    async fn materialize_in_transaction<'a>(
        tx: &mut Transaction<'a, Sqlite>,
        task: &Task,
        scheduled_at: NaiveDateTime,
    ) -> Result<TaskOccurrence, CoreError> {
        let stored: Option<TaskOccurrence> =
            sqlx::query_as("SELECT * FROM task_occurrences WHERE task_id = $1 AND scheduled_at = $2")
                .bind(task.id)
                .bind(scheduled_at)
                .fetch_optional(&mut **tx)
                .await?;
        if let Some(occurrence) = stored {
            return Ok(occurrence);
        }

        let not_found = || CoreError::NotFound(format!("Task {} has no occurrence at {}", task.id, scheduled_at));
        let (rule, anchor) = task.recurrence()?.ok_or_else(not_found)?;
        let exceptions = Self::load_exceptions_in_transaction(tx, task.id).await?;
        if exceptions.contains(&scheduled_at.date()) {
            return Err(not_found());
        }
        let hits = expand(rule, anchor, Some(scheduled_at), Some(scheduled_at), Some(1))?;
        if hits.first() != Some(&scheduled_at) {
            return Err(not_found());
        }

        let occurrence = TaskOccurrence::pending(task.id, scheduled_at);
        Self::insert_occurrence_in_transaction(tx, &occurrence).await?;
        Ok(occurrence)
    }

    pub(crate) async fn load_occurrences_in_transaction<'a>(
        tx: &mut Transaction<'a, Sqlite>,
        task_id: Uuid,
        window: &Window,
    ) -> Result<Vec<TaskOccurrence>, CoreError> {
        let occurrences = sqlx::query_as(
            r#"SELECT * FROM task_occurrences
            WHERE task_id = $1 AND scheduled_at >= $2 AND scheduled_at <= $3
            ORDER BY scheduled_at"#,
        )
        .bind(task_id)
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&mut **tx)
        .await?;
        Ok(occurrences)
    }

    pub(crate) async fn apply_mutations_in_transaction<'a>(
        tx: &mut Transaction<'a, Sqlite>,
        mutations: &MutationSet,
    ) -> Result<(), CoreError> {
        for mutation in mutations.iter() {
            match mutation {
                Mutation::Insert(occurrence) => Self::insert_occurrence_in_transaction(tx, occurrence).await?,
                Mutation::Update(occurrence) => Self::update_occurrence_in_transaction(tx, occurrence).await?,
                Mutation::Delete(occurrence) => {
                    let result = sqlx::query("DELETE FROM task_occurrences WHERE id = $1 AND task_id = $2")
                        .bind(occurrence.id)
                        .bind(occurrence.task_id)
                        .execute(&mut **tx)
                        .await?;
                    if result.rows_affected() == 0 {
                        return Err(conflict(occurrence, "occurrence was already removed"));
                    }
                }
            }
        }
        Ok(())
    }

    async fn insert_occurrence_in_transaction<'a>(
        tx: &mut Transaction<'a, Sqlite>,
        occurrence: &TaskOccurrence,
    ) -> Result<(), CoreError> {
        let result = sqlx::query(
            r#"INSERT INTO task_occurrences (id, task_id, scheduled_at, status, completed_at, override_title, override_due_at, orphaned)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(occurrence.id)
        .bind(occurrence.task_id)
        .bind(occurrence.scheduled_at)
        .bind(occurrence.status)
        .bind(occurrence.completed_at)
        .bind(&occurrence.override_title)
        .bind(occurrence.override_due_at)
        .bind(occurrence.orphaned)
        .execute(&mut **tx)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(conflict(occurrence, "occurrence already exists"))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_occurrence_in_transaction<'a>(
        tx: &mut Transaction<'a, Sqlite>,
        occurrence: &TaskOccurrence,
    ) -> Result<(), CoreError> {
        let result = sqlx::query(
            r#"UPDATE task_occurrences
            SET status = $1, completed_at = $2, override_title = $3, override_due_at = $4, orphaned = $5
            WHERE id = $6 AND task_id = $7"#,
        )
        .bind(occurrence.status)
        .bind(occurrence.completed_at)
        .bind(&occurrence.override_title)
        .bind(occurrence.override_due_at)
        .bind(occurrence.orphaned)
        .bind(occurrence.id)
        .bind(occurrence.task_id)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(conflict(occurrence, "occurrence no longer exists"));
        }
        Ok(())
    }
}
