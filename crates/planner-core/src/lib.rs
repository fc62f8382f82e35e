//! # Planner Core Library
//!
//! The recurrence engine of the planner: recurring task templates expanded into
//! concrete occurrences and kept in sync with what has already been stored.
//!
//! ## Core Modules
//!
//! - [`rule`]: `RecurrenceRule` and its compact `FREQ=...;BYDAY=...` text codec
//! - [`recurrence`]: Occurrence expansion over a window
//! - [`resolver`]: Merges candidates with exceptions and stored overrides
//! - [`materialization`]: Reconciliation of stored occurrences against the rule
//! - [`reminder`]: Next-reminder planning and the scheduler collaborator
//! - [`repository`]: Storage collaborator traits and the SQLite implementation
//! - [`db`]: Database connection and migration management
//! - [`models`]: Core data structures
//! - [`timezone`]: Timezone validation and local/UTC conversion
//! - [`error`]: Error types
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use planner_core::{
//!     db,
//!     materialization::MaterializationManager,
//!     models::NewTaskData,
//!     repository::{SqliteRepository, TaskRepository},
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), planner_core::error::CoreError> {
//!     let pool = db::establish_connection("planner.db").await?;
//!     let repo = SqliteRepository::new(pool, MaterializationManager::with_defaults());
//!
//!     let task = repo
//!         .add_task(NewTaskData {
//!             title: "Weekly review".to_string(),
//!             rule: Some("FREQ=WEEKLY;BYDAY=FR".parse()?),
//!             due_at: chrono::NaiveDate::from_ymd_opt(2030, 1, 4)
//!                 .and_then(|d| d.and_hms_opt(16, 0, 0)),
//!             timezone: Some("Europe/Berlin".to_string()),
//!             ..Default::default()
//!         })
//!         .await?;
//!     println!("Created task: {}", task.title);
//!     Ok(())
//! }
//! ```

pub mod db;
pub mod error;
pub mod materialization;
pub mod models;
pub mod recurrence;
pub mod reminder;
pub mod repository;
pub mod resolver;
pub mod rule;
pub mod timezone;
