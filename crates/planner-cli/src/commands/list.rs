use anyhow::Result;
use chrono::Utc;
use planner_core::models::Window;
use planner_core::recurrence::next_occurrence_after;
use planner_core::repository::Repository;
use planner_core::timezone::utc_to_local;

use crate::cli::ListCommand;
use crate::config::Config;
use crate::parser::parse_local_datetime;
use crate::util::{horizon, resolve_task};
use crate::views::table::{display_occurrences, display_tasks, ViewTask};

pub async fn list_tasks(repo: &impl Repository, command: ListCommand, config: &Config) -> Result<()> {
    let Some(id) = &command.id else {
        let tasks = repo.find_tasks().await?;
        let mut view_tasks = Vec::with_capacity(tasks.len());
        for task in tasks {
            let next_at = match task.recurrence()? {
                Some((rule, anchor)) => {
                    // Occurrences due right now still count as next.
                    let now = utc_to_local(Utc::now(), &task.timezone)? - chrono::Duration::seconds(1);
                    next_occurrence_after(rule, anchor, now)?
                }
                None => task.due_at,
            };
            view_tasks.push(ViewTask {
                id: task.id,
                title: task.title,
                status: task.status,
                rule: task.rule.map(|r| r.encode()),
                next_at,
                timezone: task.timezone,
            });
        }
        display_tasks(&view_tasks);
        return Ok(());
    };

    let task = resolve_task(repo, id).await?;
    let default = horizon(&config.materialization, &task.timezone)?;
    let start = command.from.as_deref().map(|s| parse_local_datetime(s, &task.timezone)).transpose()?;
    let end = command.to.as_deref().map(|s| parse_local_datetime(s, &task.timezone)).transpose()?;
    let window = Window::new(start.unwrap_or(default.start), end.unwrap_or(default.end))?;

    let occurrences = repo.find_effective_occurrences(task.id, &window).await?;
    println!(
        "{} from {} to {}",
        task.title,
        window.start.format("%Y-%m-%d %H:%M"),
        window.end.format("%Y-%m-%d %H:%M")
    );
    display_occurrences(&occurrences, &task.timezone);
    Ok(())
}
