use chrono::{NaiveDateTime, Utc};
use chrono_humanize::Humanize;
use comfy_table::{Attribute, Cell, Color, Row, Table};
use planner_core::materialization::MutationSet;
use planner_core::models::{RecurrenceException, TaskStatus};
use planner_core::resolver::EffectiveOccurrence;
use planner_core::timezone::{local_to_utc, utc_to_local};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ViewTask {
    pub id: Uuid,
    pub title: String,
    pub status: TaskStatus,
    pub rule: Option<String>,
    pub next_at: Option<NaiveDateTime>,
    pub timezone: String,
}

pub fn display_tasks(tasks: &[ViewTask]) {
    if tasks.is_empty() {
        println!("No tasks found.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Title", "Status", "Rule", "Next", "Timezone"]);

    for task in tasks {
        let mut row = Row::new();
        row.add_cell(Cell::new(task.id));

        let mut title = String::new();
        if task.rule.is_some() {
            title.push_str("↻ ");
        }
        title.push_str(&task.title);
        let title_cell = match task.status {
            TaskStatus::Completed | TaskStatus::Cancelled => Cell::new(title)
                .add_attribute(Attribute::CrossedOut)
                .fg(Color::DarkGrey),
            TaskStatus::Pending => Cell::new(title),
        };
        row.add_cell(title_cell);
        row.add_cell(status_cell(task.status));
        row.add_cell(Cell::new(task.rule.as_deref().unwrap_or("-")));
        row.add_cell(match task.next_at {
            Some(at) => due_cell(at, &task.timezone, TaskStatus::Pending),
            None => Cell::new("-"),
        });
        row.add_cell(Cell::new(&task.timezone));
        table.add_row(row);
    }

    println!("{table}");
}

pub fn display_occurrences(occurrences: &[EffectiveOccurrence], timezone: &str) {
    if occurrences.is_empty() {
        println!("No occurrences in range.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["Scheduled", "Title", "Status", "Due", ""]);

    for occurrence in occurrences {
        let mut row = Row::new();
        row.add_cell(Cell::new(occurrence.scheduled_at().format("%a %Y-%m-%d %H:%M")));

        let title = Cell::new(&occurrence.title);
        row.add_cell(match occurrence.status() {
            TaskStatus::Pending => title,
            _ => title.add_attribute(Attribute::CrossedOut).fg(Color::DarkGrey),
        });
        row.add_cell(status_cell(occurrence.status()));
        row.add_cell(due_cell(occurrence.due_at, timezone, occurrence.status()));

        let mut flags = Vec::new();
        if !occurrence.materialized {
            flags.push("projected");
        }
        if occurrence.occurrence.override_title.is_some() || occurrence.occurrence.override_due_at.is_some() {
            flags.push("modified");
        }
        if occurrence.occurrence.orphaned {
            flags.push("orphaned");
        }
        row.add_cell(Cell::new(flags.join(", ")).fg(Color::DarkGrey));
        table.add_row(row);
    }

    println!("{table}");
}

pub fn display_exceptions(exceptions: &[RecurrenceException]) {
    if exceptions.is_empty() {
        println!("No skipped days.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["Skipped day", "Recorded"]);
    for exception in exceptions {
        table.add_row(vec![
            Cell::new(exception.exception_date.format("%a %Y-%m-%d")),
            Cell::new(exception.created_at.humanize()),
        ]);
    }
    println!("{table}");
}

pub fn display_mutations(mutations: &MutationSet) {
    if mutations.is_empty() {
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["Change", "Scheduled"]);
    for mutation in mutations.iter() {
        let color = match mutation.kind() {
            "insert" => Color::Green,
            "delete" => Color::Red,
            _ => Color::Yellow,
        };
        table.add_row(vec![
            Cell::new(mutation.kind()).fg(color),
            Cell::new(mutation.occurrence().scheduled_at.format("%a %Y-%m-%d %H:%M")),
        ]);
    }
    println!("{table}");
}

fn status_cell(status: TaskStatus) -> Cell {
    let cell = Cell::new(status.to_string());
    match status {
        TaskStatus::Completed => cell.fg(Color::Green),
        TaskStatus::Cancelled => cell.fg(Color::DarkGrey),
        TaskStatus::Pending => cell,
    }
}

/// Relative due time; overdue pending items in red, today's in yellow.
fn due_cell(local: NaiveDateTime, timezone: &str, status: TaskStatus) -> Cell {
    let Ok(due_at) = local_to_utc(local, timezone) else {
        return Cell::new(local.format("%Y-%m-%d %H:%M"));
    };
    let text = format!("{} ({})", local.format("%Y-%m-%d %H:%M"), due_at.humanize());
    if status != TaskStatus::Pending {
        return Cell::new(text);
    }

    let now = Utc::now();
    let is_today = utc_to_local(now, timezone).is_ok_and(|today| today.date() == local.date());
    if due_at < now {
        Cell::new(text).fg(Color::Red)
    } else if is_today {
        Cell::new(text).fg(Color::Yellow)
    } else {
        Cell::new(text)
    }
}
