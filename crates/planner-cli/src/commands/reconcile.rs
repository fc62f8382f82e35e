use anyhow::Result;
use owo_colors::{OwoColorize, Style};
use planner_core::repository::Repository;

use crate::cli::ReconcileCommand;
use crate::config::Config;
use crate::util::{horizon, resolve_task};
use crate::views::table::display_mutations;

pub async fn reconcile(repo: &impl Repository, command: ReconcileCommand, config: &Config) -> Result<()> {
    let success_style = Style::new().green().bold();

    if let Some(id) = &command.id {
        let task = resolve_task(repo, id).await?;
        let window = horizon(&config.materialization, &task.timezone)?;
        let mutations = repo.reconcile_task(task.id, &window).await?;
        if mutations.is_empty() {
            println!("{} '{}' is up to date", "✓".style(success_style), task.title);
        } else {
            println!("{} '{}': {}", "✓".style(success_style), task.title, mutations);
            display_mutations(&mutations);
        }
        return Ok(());
    }

    // Each task is reconciled over the horizon in its own timezone.
    let summary = repo.reconcile_horizons().await?;
    println!(
        "{} Reconciled {} task(s): {} inserted, {} updated, {} deleted in {} ms",
        "✓".style(success_style),
        summary.tasks_processed,
        summary.inserted,
        summary.updated,
        summary.deleted,
        summary.duration_ms
    );
    if summary.tasks_with_errors > 0 {
        println!("{} {} task(s) failed:", "!".yellow().bold(), summary.tasks_with_errors);
        for error in &summary.errors {
            println!("  {}", error.yellow());
        }
    }
    Ok(())
}
