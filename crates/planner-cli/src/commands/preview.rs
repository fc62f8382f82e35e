use anyhow::{anyhow, Result};
use chrono::Utc;
use planner_core::recurrence::preview;
use planner_core::repository::Repository;
use planner_core::rule::RecurrenceRule;
use planner_core::timezone::utc_to_local;

use crate::cli::PreviewCommand;
use crate::config::Config;
use crate::parser::parse_local_datetime;
use crate::util::resolve_task;

pub async fn preview_occurrences(repo: &impl Repository, command: PreviewCommand, config: &Config) -> Result<()> {
    let (title, rule, anchor, timezone) = match (&command.id, &command.rule) {
        (Some(id), _) => {
            let task = resolve_task(repo, id).await?;
            let (rule, anchor) = task
                .recurrence()?
                .map(|(rule, anchor)| (rule.clone(), anchor))
                .ok_or_else(|| anyhow!("Task '{}' does not repeat", task.title))?;
            (task.title.clone(), rule, anchor, task.timezone.clone())
        }
        (None, Some(text)) => {
            let timezone = config.default_timezone.clone();
            let start = command.start.as_deref().ok_or_else(|| anyhow!("--rule needs --start"))?;
            let anchor = parse_local_datetime(start, &timezone)?;
            (text.clone(), RecurrenceRule::decode(text)?, anchor, timezone)
        }
        (None, None) => return Err(anyhow!("Give a task ID or --rule")),
    };

    let from = match &command.from {
        Some(from) => parse_local_datetime(from, &timezone)?,
        None if command.id.is_some() => utc_to_local(Utc::now(), &timezone)?,
        None => anchor,
    };
    let upcoming = preview(&rule, anchor, from, command.count)?;

    println!("{} ({})", title, rule.encode());
    if upcoming.is_empty() {
        println!("  No occurrences from {}.", from.format("%Y-%m-%d %H:%M"));
    }
    for (i, at) in upcoming.iter().enumerate() {
        println!("  {:>3}. {}", i + 1, at.format("%a %Y-%m-%d %H:%M"));
    }
    Ok(())
}
