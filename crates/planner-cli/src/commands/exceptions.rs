use anyhow::Result;
use owo_colors::{OwoColorize, Style};
use planner_core::repository::Repository;

use crate::cli::ExceptionsCommand;
use crate::parser::parse_local_date;
use crate::util::resolve_task;
use crate::views::table::display_exceptions;

pub async fn exceptions(repo: &impl Repository, command: ExceptionsCommand) -> Result<()> {
    let task = resolve_task(repo, &command.id).await?;

    if let Some(date) = &command.remove {
        let date = parse_local_date(date, &task.timezone)?;
        repo.remove_exception(task.id, date).await?;
        println!(
            "{} '{}' occurs on {} again",
            "✓".style(Style::new().green().bold()),
            task.title,
            date.format("%a %Y-%m-%d").cyan()
        );
        return Ok(());
    }

    let exceptions = repo.find_exceptions(task.id).await?;
    display_exceptions(&exceptions);
    Ok(())
}
