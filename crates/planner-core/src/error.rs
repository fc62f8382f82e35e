use chrono::NaiveDateTime;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum CoreError {
    /// The rule text could not be parsed at all (missing or unknown FREQ, bad values).
    #[error("Malformed recurrence rule '{rule}': {reason}")]
    MalformedRule { rule: String, reason: String },

    /// The rule parsed but describes an impossible or contradictory pattern.
    #[error("Invalid recurrence rule: {0}")]
    InvalidRule(String),

    /// The storage collaborator rejected a mutation while applying a reconciliation.
    #[error("Reconciliation conflict for task {task_id} at {scheduled_at}: {reason}")]
    ReconciliationConflict {
        task_id: Uuid,
        scheduled_at: NaiveDateTime,
        reason: String,
    },

    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("Migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),
}

impl CoreError {
    pub(crate) fn malformed(rule: &str, reason: impl Into<String>) -> Self {
        CoreError::MalformedRule {
            rule: rule.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors caused by the rule itself rather than by storage.
    pub fn is_rule_error(&self) -> bool {
        matches!(self, CoreError::MalformedRule { .. } | CoreError::InvalidRule(_))
    }
}
