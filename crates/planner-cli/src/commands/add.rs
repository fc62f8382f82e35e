use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use owo_colors::{OwoColorize, Style};
use planner_core::models::{Anchor, NewTaskData};
use planner_core::repository::Repository;
use planner_core::timezone::{get_timezone_offset, utc_to_local, validate_timezone};

use crate::cli::AddCommand;
use crate::config::Config;
use crate::parser::{parse_local_date, parse_local_datetime, parse_time_of_day};
use crate::util::build_rule;

pub async fn add_task(repo: &impl Repository, command: AddCommand, config: &Config) -> Result<()> {
    let timezone = command.timezone.clone().unwrap_or_else(|| config.default_timezone.clone());
    validate_timezone(&timezone)?;

    let due_at = command.due.as_deref().map(|d| parse_local_datetime(d, &timezone)).transpose()?;
    let at = command.at.as_deref().map(parse_time_of_day).transpose()?;
    let starts = command.starts.as_deref().map(|s| parse_local_date(s, &timezone)).transpose()?;

    let (rule, recurrence_start) = if command.recurrence.is_present() || command.recurrence.has_modifiers() {
        let today = utc_to_local(Utc::now(), &timezone)?.date();
        let start = recurrence_anchor(starts, at, due_at, today);
        let first_day = start.map_or_else(|| due_at.map_or(today, |d| d.date()), |a| a.date);
        (build_rule(&command.recurrence, first_day, &timezone)?, start)
    } else {
        (None, None)
    };

    let task = repo
        .add_task(NewTaskData {
            title: command.title,
            notes: command.notes,
            due_at,
            rule,
            recurrence_start,
            timezone: Some(timezone),
        })
        .await?;

    let success_style = Style::new().green().bold();
    let info_style = Style::new().blue();
    let label = if task.is_recurring() { "Created recurring task:" } else { "Created task:" };
    println!("{} {} {}", "✓".style(success_style), label, task.title.bright_white().bold());
    println!("  {} Task ID: {}", "→".style(info_style), task.id.to_string().yellow());
    if let Some(rule) = &task.rule {
        println!("  {} Rule: {}", "→".style(info_style), rule.encode().cyan());
    }
    if let Some(anchor) = task.anchor() {
        let label = if task.is_recurring() { "Starts" } else { "Due" };
        let offset = get_timezone_offset(&task.timezone, Utc::now())?;
        println!(
            "  {} {}: {} ({}, currently UTC{})",
            "→".style(info_style),
            label,
            anchor.format("%a %Y-%m-%d %H:%M"),
            task.timezone,
            offset
        );
    }
    Ok(())
}

/// Where a new rule starts. `None` lets the due time serve as the anchor.
fn recurrence_anchor(
    starts: Option<NaiveDate>,
    at: Option<NaiveTime>,
    due_at: Option<NaiveDateTime>,
    today: NaiveDate,
) -> Option<Anchor> {
    match (starts, due_at) {
        (Some(date), due) => Some(Anchor::new(date, at.or(due.map(|d| d.time())))),
        (None, Some(_)) if at.is_none() => None,
        (None, Some(due)) => Some(Anchor::new(due.date(), at)),
        (None, None) => Some(Anchor::new(today, at)),
    }
}
