use anyhow::Result;
use owo_colors::{OwoColorize, Style};
use planner_core::repository::Repository;

use crate::cli::SkipCommand;
use crate::parser::parse_local_date;
use crate::util::resolve_task;

pub async fn skip_occurrence(repo: &impl Repository, command: SkipCommand) -> Result<()> {
    let task = resolve_task(repo, &command.id).await?;
    let date = parse_local_date(&command.date, &task.timezone)?;
    let exception = repo.skip_occurrence(task.id, date).await?;
    println!(
        "{} Skipped '{}' on {}",
        "✓".style(Style::new().green().bold()),
        task.title,
        exception.exception_date.format("%a %Y-%m-%d").cyan()
    );
    Ok(())
}
