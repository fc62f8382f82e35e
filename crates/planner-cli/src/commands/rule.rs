use anyhow::{anyhow, Result};
use chrono::{NaiveDate, Utc};
use owo_colors::{OwoColorize, Style};
use planner_core::models::Anchor;
use planner_core::repository::Repository;
use planner_core::rule::{EndCondition, Frequency, RecurrenceRule};
use planner_core::timezone::utc_to_local;

use crate::cli::RuleCommand;
use crate::config::Config;
use crate::util::{build_rule, resolve_task};

pub async fn rule_command(repo: &impl Repository, command: RuleCommand, config: &Config) -> Result<()> {
    let success_style = Style::new().green().bold();

    let Some(id) = &command.task else {
        let today = utc_to_local(Utc::now(), &config.default_timezone)?.date();
        let rule = rule_from(&command, today, &config.default_timezone)?;
        println!("{}", rule.encode());
        println!("  {}", describe(&rule).bright_black());
        return Ok(());
    };

    let task = resolve_task(repo, id).await?;
    if command.clear {
        let updated = repo.update_task_rule(task.id, None, None).await?;
        println!("{} Removed the rule of '{}'", "✓".style(success_style), updated.title);
        return Ok(());
    }

    let today = utc_to_local(Utc::now(), &task.timezone)?.date();
    let first_day = task.anchor().map_or(today, |at| at.date());
    let rule = rule_from(&command, first_day, &task.timezone)?;
    let start = task.anchor().is_none().then(|| Anchor::new(today, None));

    let updated = repo.update_task_rule(task.id, Some(rule), start).await?;
    println!(
        "{} Task {} now repeats {}",
        "✓".style(success_style),
        updated.id.to_string().yellow(),
        updated.rule.as_ref().map(RecurrenceRule::encode).unwrap_or_default().cyan()
    );
    Ok(())
}

fn rule_from(command: &RuleCommand, first_day: NaiveDate, timezone: &str) -> Result<RecurrenceRule> {
    let mut args = command.recurrence.clone();
    if let Some(text) = &command.text {
        if args.is_present() {
            return Err(anyhow!("Give the rule either as text or with --rule/--every, not both"));
        }
        args.rule = Some(text.clone());
    }
    build_rule(&args, first_day, timezone)?.ok_or_else(|| anyhow!("No rule given; pass rule text or --every"))
}

/// Plain-language summary, e.g. "every 2 weeks on MO,FR, 6 times".
pub fn describe(rule: &RecurrenceRule) -> String {
    let unit = match rule.frequency {
        Frequency::Daily => "day",
        Frequency::Weekly => "week",
        Frequency::Monthly => "month",
        Frequency::Yearly => "year",
    };
    let mut text = if rule.interval == 1 {
        format!("every {}", unit)
    } else {
        format!("every {} {}s", rule.interval, unit)
    };
    if let Some(days) = rule.days_of_week {
        text.push_str(&format!(" on {}", days));
    }
    match rule.end {
        EndCondition::Never => {}
        EndCondition::Until(date) => text.push_str(&format!(", until {}", date)),
        EndCondition::Count(1) => text.push_str(", once"),
        EndCondition::Count(count) => text.push_str(&format!(", {} times", count)),
    }
    text
}
