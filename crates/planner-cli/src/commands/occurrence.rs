use anyhow::{anyhow, Result};
use owo_colors::{OwoColorize, Style};
use planner_core::models::OccurrenceOverride;
use planner_core::repository::Repository;

use crate::cli::{OccurrenceCommand, OverrideCommand};
use crate::parser::{parse_local_datetime, parse_occurrence_at};
use crate::util::{occurrence_time, resolve_task};

pub async fn complete_occurrence(repo: &impl Repository, command: OccurrenceCommand) -> Result<()> {
    let task = resolve_task(repo, &command.id).await?;
    let scheduled_at = parse_occurrence_at(&command.at, occurrence_time(&task))?;
    let occurrence = repo.complete_occurrence(task.id, scheduled_at).await?;
    println!(
        "{} Completed '{}' for {}",
        "✓".style(Style::new().green().bold()),
        occurrence.effective_title(&task.title),
        occurrence.scheduled_at.format("%a %Y-%m-%d %H:%M")
    );
    Ok(())
}

pub async fn reopen_occurrence(repo: &impl Repository, command: OccurrenceCommand) -> Result<()> {
    let task = resolve_task(repo, &command.id).await?;
    let scheduled_at = parse_occurrence_at(&command.at, occurrence_time(&task))?;
    let occurrence = repo.reopen_occurrence(task.id, scheduled_at).await?;
    println!(
        "{} Reopened '{}' for {}",
        "↺".style(Style::new().yellow().bold()),
        occurrence.effective_title(&task.title),
        occurrence.scheduled_at.format("%a %Y-%m-%d %H:%M")
    );
    Ok(())
}

pub async fn override_occurrence(repo: &impl Repository, command: OverrideCommand) -> Result<()> {
    let task = resolve_task(repo, &command.id).await?;
    let scheduled_at = parse_occurrence_at(&command.at, occurrence_time(&task))?;

    let changes = OccurrenceOverride {
        title: match (command.title, command.clear_title) {
            (Some(title), _) => Some(Some(title)),
            (None, true) => Some(None),
            (None, false) => None,
        },
        due_at: match (command.due, command.clear_due) {
            (Some(due), _) => Some(Some(parse_local_datetime(&due, &task.timezone)?)),
            (None, true) => Some(None),
            (None, false) => None,
        },
    };
    if changes.title.is_none() && changes.due_at.is_none() {
        return Err(anyhow!("Nothing to change; pass --title, --due or one of the --clear flags"));
    }

    let occurrence = repo.override_occurrence(task.id, scheduled_at, changes).await?;
    println!(
        "{} Updated the {} occurrence: '{}' due {}",
        "✓".style(Style::new().green().bold()),
        occurrence.scheduled_at.format("%a %Y-%m-%d %H:%M"),
        occurrence.effective_title(&task.title),
        occurrence.effective_due_at().format("%Y-%m-%d %H:%M").cyan()
    );
    Ok(())
}
