use crate::error::CoreError;
use crate::models::RecurrenceException;
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::{Sqlite, Transaction};
use std::collections::BTreeSet;
use uuid::Uuid;

#[async_trait]
impl super::ExceptionRepository for SqliteRepository {
    async fn add_exception(&self, task_id: Uuid, date: NaiveDate) -> Result<RecurrenceException, CoreError> {
        let mut tx = self.begin_write().await?;
        Self::ensure_task_exists_in_transaction(&mut tx, task_id).await?;
        let exception = Self::add_exception_in_transaction(&mut tx, task_id, date).await?;
        tx.commit().await?;
        Ok(exception)
    }

    async fn find_exceptions(&self, task_id: Uuid) -> Result<Vec<RecurrenceException>, CoreError> {
        let exceptions = sqlx::query_as(
            "SELECT * FROM recurrence_exceptions WHERE task_id = $1 ORDER BY exception_date",
        )
        .bind(task_id)
        .fetch_all(self.pool())
        .await?;
        Ok(exceptions)
    }

    async fn remove_exception(&self, task_id: Uuid, date: NaiveDate) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM recurrence_exceptions WHERE task_id = $1 AND exception_date = $2")
            .bind(task_id)
            .bind(date)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!(
                "Exception not found for task {} on {}",
                task_id, date
            )));
        }
        Ok(())
    }
}

impl SqliteRepository {
    /// Records an exception; adding the same date twice keeps the first record.
    pub(crate) async fn add_exception_in_transaction<'a>(
        tx: &mut Transaction<'a, Sqlite>,
        task_id: Uuid,
        date: NaiveDate,
    ) -> Result<RecurrenceException, CoreError> {
        sqlx::query(
            r#"INSERT INTO recurrence_exceptions (task_id, exception_date, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (task_id, exception_date) DO NOTHING"#,
        )
        .bind(task_id)
        .bind(date)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await?;

        let exception = sqlx::query_as(
            "SELECT * FROM recurrence_exceptions WHERE task_id = $1 AND exception_date = $2",
        )
        .bind(task_id)
        .bind(date)
        .fetch_one(&mut **tx)
        .await?;
        Ok(exception)
    }

    pub(crate) async fn load_exceptions_in_transaction<'a>(
        tx: &mut Transaction<'a, Sqlite>,
        task_id: Uuid,
    ) -> Result<BTreeSet<NaiveDate>, CoreError> {
        let dates: Vec<(NaiveDate,)> =
            sqlx::query_as("SELECT exception_date FROM recurrence_exceptions WHERE task_id = $1")
                .bind(task_id)
                .fetch_all(&mut **tx)
                .await?;
        Ok(dates.into_iter().map(|(date,)| date).collect())
    }

    pub(crate) async fn ensure_task_exists_in_transaction<'a>(
        tx: &mut Transaction<'a, Sqlite>,
        task_id: Uuid,
    ) -> Result<(), CoreError> {
        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM tasks WHERE id = $1")
            .bind(task_id)
            .fetch_optional(&mut **tx)
            .await?;
        match exists {
            Some(_) => Ok(()),
            None => Err(CoreError::NotFound(format!("Task with id {} not found", task_id))),
        }
    }
}
