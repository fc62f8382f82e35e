use anyhow::{anyhow, Result};
use chrono::{Datelike, NaiveDate, NaiveTime, Utc};
use planner_core::error::CoreError;
use planner_core::materialization::{MaterializationConfig, MaterializationManager};
use planner_core::models::{Task, Window};
use planner_core::repository::Repository;
use planner_core::rule::RecurrenceRule;
use planner_core::timezone::utc_to_local;

use crate::cli::{RecurrenceShortcut, RuleArgs};
use crate::parser::{parse_local_date, parse_weekdays};

pub async fn resolve_task(repo: &impl Repository, short_id: &str) -> Result<Task> {
    if short_id.len() < 2 {
        return Err(anyhow!(CoreError::InvalidInput(
            "Short ID must be at least 2 characters long.".to_string()
        )));
    }
    Ok(repo.find_task_by_id_prefix(short_id).await?)
}

/// The configured materialization horizon around "now" in `timezone`.
pub fn horizon(config: &MaterializationConfig, timezone: &str) -> Result<Window> {
    let now = utc_to_local(Utc::now(), timezone)?;
    Ok(MaterializationManager::new(config.clone()).horizon(now))
}

/// Builds a rule from either `--rule` text or the `--every` shortcut options.
///
/// `start` supplies the weekday of a plain `--every weekly` rule. Returns
/// `Ok(None)` when no rule option was given at all; `--on`, `--until` or
/// `--count` on their own are an error.
pub fn build_rule(args: &RuleArgs, start: NaiveDate, timezone: &str) -> Result<Option<RecurrenceRule>> {
    let mut rule = match (&args.rule, args.every) {
        (Some(text), _) => RecurrenceRule::decode(text)?,
        (None, Some(shortcut)) => shortcut_rule(shortcut, args, start)?,
        (None, None) if args.has_modifiers() => {
            return Err(anyhow!("--on/--until/--count need a rule to apply to; add --rule or --every"))
        }
        (None, None) => return Ok(None),
    };

    if let Some(until) = &args.until {
        rule = rule.until(parse_local_date(until, timezone)?);
    }
    if let Some(count) = args.count {
        rule = rule.count(count);
    }
    rule.validate()?;
    Ok(Some(rule))
}

fn shortcut_rule(shortcut: RecurrenceShortcut, args: &RuleArgs, start: NaiveDate) -> Result<RecurrenceRule> {
    use chrono::Weekday::*;

    let days = args.on.as_deref().map(parse_weekdays).transpose()?;
    if days.is_some() && !matches!(shortcut, RecurrenceShortcut::Weekly) {
        return Err(anyhow!("--on can only be combined with --every weekly"));
    }

    let rule = match shortcut {
        RecurrenceShortcut::Daily => RecurrenceRule::daily(),
        RecurrenceShortcut::Weekly => match days {
            Some(days) => RecurrenceRule::weekly(days),
            None => RecurrenceRule::weekly([start.weekday()]),
        },
        RecurrenceShortcut::Monthly => RecurrenceRule::monthly(),
        RecurrenceShortcut::Yearly => RecurrenceRule::yearly(),
        RecurrenceShortcut::Weekdays => RecurrenceRule::weekly([Mon, Tue, Wed, Thu, Fri]),
        RecurrenceShortcut::Weekends => RecurrenceRule::weekly([Sat, Sun]),
    };
    Ok(rule.every(args.interval.unwrap_or(1)))
}

/// Time of day used when an occurrence is named by its date alone.
pub fn occurrence_time(task: &Task) -> NaiveTime {
    task.anchor().map(|at| at.time()).unwrap_or(NaiveTime::MIN)
}
