use crate::error::CoreError;
use crate::materialization::{MutationSet, ReconciliationSummary};
use crate::models::{Task, Window};
use crate::repository::{MaterializationRepository, SqliteRepository};
use crate::timezone::utc_to_local;
use async_trait::async_trait;
use chrono::Utc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[async_trait]
impl MaterializationRepository for SqliteRepository {
    /// Snapshots the task's state, diffs it and applies the result inside one
    /// transaction while holding the task's lock.
    #[instrument(skip(self, window), fields(start = %window.start, end = %window.end))]
    async fn reconcile_task(&self, task_id: Uuid, window: &Window) -> Result<MutationSet, CoreError> {
        let lock = self.task_lock(task_id);
        let _guard = lock.lock().await;

        let mut tx = self.begin_write().await?;
        let task = Self::require_task_in_transaction(&mut tx, task_id).await?;
        let exceptions = Self::load_exceptions_in_transaction(&mut tx, task_id).await?;
        let persisted = Self::load_occurrences_in_transaction(&mut tx, task_id, window).await?;

        let mutations = self
            .materialization_manager()
            .reconcile(&task, &exceptions, &persisted, window)?;
        if !mutations.is_empty() {
            Self::apply_mutations_in_transaction(&mut tx, &mutations).await?;
        }
        tx.commit().await?;

        if !mutations.is_empty() {
            info!(%task_id, %mutations, "applied reconciliation");
        }
        Ok(mutations)
    }

    #[instrument(skip(self, window), fields(start = %window.start, end = %window.end))]
    async fn reconcile_all(&self, window: &Window) -> Result<ReconciliationSummary, CoreError> {
        self.reconcile_each(|_| Ok(*window)).await
    }

    #[instrument(skip(self))]
    async fn reconcile_horizons(&self) -> Result<ReconciliationSummary, CoreError> {
        self.reconcile_each(|timezone| self.horizon_in(timezone)).await
    }
}

impl SqliteRepository {
    /// The configured horizon around the current wall-clock time in the task's timezone.
    pub fn default_window(&self, task: &Task) -> Result<Window, CoreError> {
        self.horizon_in(&task.timezone)
    }

    fn horizon_in(&self, timezone: &str) -> Result<Window, CoreError> {
        let now = utc_to_local(Utc::now(), timezone)?;
        Ok(self.materialization_manager().horizon(now))
    }

    /// Reconciles every task that has a rule or stored occurrences, each over the
    /// window `window_for` picks from its timezone. A failing task is recorded in
    /// the summary and the pass moves on.
    async fn reconcile_each<F>(&self, window_for: F) -> Result<ReconciliationSummary, CoreError>
    where
        F: Fn(&str) -> Result<Window, CoreError> + Send + Sync,
    {
        let started = Instant::now();
        // Tasks whose rule was removed still need their leftover occurrences reconciled.
        let tasks: Vec<(Uuid, String)> = sqlx::query_as(
            r#"SELECT id, timezone FROM tasks
            WHERE rule IS NOT NULL
            OR EXISTS (SELECT 1 FROM task_occurrences o WHERE o.task_id = tasks.id)
            ORDER BY created_at, id"#,
        )
        .fetch_all(self.pool())
        .await?;

        let mut summary = ReconciliationSummary::default();
        for (task_id, timezone) in tasks {
            let result = match window_for(&timezone) {
                Ok(window) => self.reconcile_task(task_id, &window).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(mutations) => summary.record_applied(&mutations),
                Err(e) => {
                    warn!(%task_id, error = %e, "skipping task that failed to reconcile");
                    summary.record_failure(task_id, &e);
                }
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            tasks = summary.tasks_processed,
            inserted = summary.inserted,
            updated = summary.updated,
            deleted = summary.deleted,
            failed = summary.tasks_with_errors,
            "reconciliation pass finished"
        );
        Ok(summary)
    }
}
