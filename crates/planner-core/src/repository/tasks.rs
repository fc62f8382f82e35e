use crate::error::CoreError;
use crate::models::{Anchor, NewTaskData, Task, TaskStatus};
use crate::repository::{MaterializationRepository, SqliteRepository};
use crate::rule::RecurrenceRule;
use crate::timezone::{utc_to_local, validate_timezone};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::{FromRow, Sqlite, Transaction};
use tracing::{info, instrument};
use uuid::Uuid;

/// Row shape of the `tasks` table. The rule is kept as text until a caller needs it,
/// so one malformed rule fails only the task that carries it.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct TaskRow {
    pub id: Uuid,
    pub title: String,
    pub notes: Option<String>,
    pub due_at: Option<NaiveDateTime>,
    pub status: TaskStatus,
    pub rule: Option<String>,
    pub recurrence_date: Option<NaiveDate>,
    pub recurrence_time: Option<NaiveTime>,
    pub timezone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = CoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let rule = row.rule.as_deref().map(RecurrenceRule::decode).transpose()?;
        Ok(Task {
            id: row.id,
            title: row.title,
            notes: row.notes,
            due_at: row.due_at,
            status: row.status,
            rule,
            recurrence_start: row.recurrence_date.map(|date| Anchor::new(date, row.recurrence_time)),
            timezone: row.timezone,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Checks a task before it is written: non-blank title, known timezone, and a rule
/// that is valid today and has something to be anchored on.
fn validate_task(task: &Task) -> Result<(), CoreError> {
    if task.title.trim().is_empty() {
        return Err(CoreError::InvalidInput("Task title cannot be empty".to_string()));
    }
    validate_timezone(&task.timezone)?;
    if let Some(rule) = &task.rule {
        let today = utc_to_local(Utc::now(), &task.timezone)?.date();
        rule.validate_for_creation(today)?;
        task.recurrence()?;
    }
    Ok(())
}

/// A one-off task is only accepted when it is due now or later in its own timezone.
/// Recurring tasks are exempt: their due date is where the series starts.
fn validate_new_task(task: &Task) -> Result<(), CoreError> {
    validate_task(task)?;
    if let (None, Some(due_at)) = (&task.rule, task.due_at) {
        if due_at < utc_to_local(Utc::now(), &task.timezone)? {
            return Err(CoreError::InvalidInput("Due date cannot be in the past".to_string()));
        }
    }
    Ok(())
}

#[async_trait]
impl super::TaskRepository for SqliteRepository {
    #[instrument(skip(self, data), fields(title = %data.title))]
    async fn add_task(&self, data: NewTaskData) -> Result<Task, CoreError> {
        let now = Utc::now();
        let task = Task {
            id: Uuid::now_v7(),
            title: data.title.trim().to_string(),
            notes: data.notes,
            due_at: data.due_at,
            status: TaskStatus::Pending,
            rule: data.rule,
            recurrence_start: data.recurrence_start,
            timezone: data.timezone.unwrap_or_else(|| "UTC".to_string()),
            created_at: now,
            updated_at: now,
        };
        validate_new_task(&task)?;

        let mut tx = self.pool().begin().await?;
        Self::add_task_in_transaction(&mut tx, &task).await?;
        tx.commit().await?;
        info!(task_id = %task.id, recurring = task.is_recurring(), "task created");

        if task.is_recurring() {
            let window = self.default_window(&task)?;
            self.reconcile_task(task.id, &window).await?;
        }
        Ok(task)
    }

    async fn find_task_by_id(&self, id: Uuid) -> Result<Option<Task>, CoreError> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.map(Task::try_from).transpose()
    }

    async fn find_tasks(&self) -> Result<Vec<Task>, CoreError> {
        let rows: Vec<TaskRow> = sqlx::query_as("SELECT * FROM tasks ORDER BY created_at, id")
            .fetch_all(self.pool())
            .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn find_recurring_tasks(&self) -> Result<Vec<Task>, CoreError> {
        let rows: Vec<TaskRow> =
            sqlx::query_as("SELECT * FROM tasks WHERE rule IS NOT NULL ORDER BY created_at, id")
                .fetch_all(self.pool())
                .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    #[instrument(skip(self, rule, recurrence_start))]
    async fn update_task_rule(
        &self,
        id: Uuid,
        rule: Option<RecurrenceRule>,
        recurrence_start: Option<Anchor>,
    ) -> Result<Task, CoreError> {
        let mut tx = self.begin_write().await?;
        let mut task = Self::find_task_by_id_in_transaction(&mut tx, id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Task with id {} not found", id)))?;

        task.rule = rule;
        if recurrence_start.is_some() {
            task.recurrence_start = recurrence_start;
        }
        task.updated_at = Utc::now();
        validate_task(&task)?;

        sqlx::query(
            r#"UPDATE tasks SET rule = $1, recurrence_date = $2, recurrence_time = $3, updated_at = $4
            WHERE id = $5"#,
        )
        .bind(task.rule.as_ref().map(RecurrenceRule::encode))
        .bind(task.recurrence_start.map(|a| a.date))
        .bind(task.recurrence_start.and_then(|a| a.time))
        .bind(task.updated_at)
        .bind(task.id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        info!(task_id = %task.id, rule = ?task.rule.as_ref().map(RecurrenceRule::encode), "task rule updated");

        let window = self.default_window(&task)?;
        self.reconcile_task(task.id, &window).await?;
        Ok(task)
    }

    async fn find_task_by_id_prefix(&self, prefix: &str) -> Result<Task, CoreError> {
        let ids: Vec<(Uuid,)> = sqlx::query_as("SELECT id FROM tasks").fetch_all(self.pool()).await?;
        let prefix = prefix.to_lowercase();
        let mut matches = ids.into_iter().filter(|(id,)| id.to_string().starts_with(&prefix));

        let (id,) = matches
            .next()
            .ok_or_else(|| CoreError::NotFound(format!("No task matches '{}'", prefix)))?;
        if matches.next().is_some() {
            return Err(CoreError::InvalidInput(format!(
                "Ambiguous id '{}': more than one task matches",
                prefix
            )));
        }
        let row: TaskRow = sqlx::query_as("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_one(self.pool())
            .await?;
        Task::try_from(row)
    }

    async fn delete_task(&self, id: Uuid) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("Task with id {} not found", id)));
        }
        self.forget_task_lock(id);
        Ok(())
    }
}

impl SqliteRepository {
    pub(crate) async fn add_task_in_transaction<'a>(
        tx: &mut Transaction<'a, Sqlite>,
        task: &Task,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"INSERT INTO tasks (id, title, notes, due_at, status, rule, recurrence_date, recurrence_time, timezone, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"#,
        )
        .bind(task.id)
        .bind(&task.title)
        .bind(&task.notes)
        .bind(task.due_at)
        .bind(task.status)
        .bind(task.rule.as_ref().map(RecurrenceRule::encode))
        .bind(task.recurrence_start.map(|a| a.date))
        .bind(task.recurrence_start.and_then(|a| a.time))
        .bind(&task.timezone)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub(crate) async fn find_task_by_id_in_transaction<'a>(
        tx: &mut Transaction<'a, Sqlite>,
        id: Uuid,
    ) -> Result<Option<Task>, CoreError> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
        row.map(Task::try_from).transpose()
    }
}
