use anyhow::Result;
use chrono::{Duration, Utc};
use chrono_humanize::Humanize;
use planner_core::reminder::plan_reminder;
use planner_core::repository::Repository;

use crate::cli::RemindCommand;
use crate::config::Config;
use crate::util::{horizon, resolve_task};

pub async fn next_reminder(repo: &impl Repository, command: RemindCommand, config: &Config) -> Result<()> {
    let task = resolve_task(repo, &command.id).await?;
    let window = horizon(&config.materialization, &task.timezone)?;
    let effective = repo.find_effective_occurrences(task.id, &window).await?;
    let lead = Duration::minutes(i64::from(config.materialization.reminder_lead_minutes));

    match plan_reminder(&task, &effective, lead, Utc::now())? {
        Some(reminder) => println!(
            "'{}' is due {} ({}); reminder fires {}",
            reminder.title,
            reminder.due_at.to_rfc3339(),
            reminder.due_at.humanize(),
            reminder.fire_at.humanize()
        ),
        None => println!("No upcoming reminder for '{}'.", task.title),
    }
    Ok(())
}
