use clap::Parser;
use owo_colors::{OwoColorize, Style};
use planner_core::db;
use planner_core::error::CoreError;
use planner_core::materialization::MaterializationManager;
use planner_core::repository::SqliteRepository;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;
mod parser;
mod util;
mod views;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();
    init_tracing();

    let config = match config::Config::new() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unreadable configuration");
            config::Config::default()
        }
    };
    let db_pool = match db::establish_connection(&config.database_path).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };
    let materialization_manager = MaterializationManager::new(config.materialization.clone());
    let repository = SqliteRepository::new(db_pool, materialization_manager);

    let result = match cli.command {
        cli::Commands::Add(command) => commands::add::add_task(&repository, command, &config).await,
        cli::Commands::Rule(command) => commands::rule::rule_command(&repository, command, &config).await,
        cli::Commands::Preview(command) => {
            commands::preview::preview_occurrences(&repository, command, &config).await
        }
        cli::Commands::List(command) => commands::list::list_tasks(&repository, command, &config).await,
        cli::Commands::Reconcile(command) => {
            commands::reconcile::reconcile(&repository, command, &config).await
        }
        cli::Commands::Skip(command) => commands::skip::skip_occurrence(&repository, command).await,
        cli::Commands::Done(command) => {
            commands::occurrence::complete_occurrence(&repository, command).await
        }
        cli::Commands::Undo(command) => commands::occurrence::reopen_occurrence(&repository, command).await,
        cli::Commands::Override(command) => {
            commands::occurrence::override_occurrence(&repository, command).await
        }
        cli::Commands::Exceptions(command) => {
            commands::exceptions::exceptions(&repository, command).await
        }
        cli::Commands::Remind(command) => {
            commands::remind::next_reminder(&repository, command, &config).await
        }
        cli::Commands::Delete(command) => commands::delete::delete_task(&repository, command).await,
    };

    if let Err(e) = result {
        handle_error(e);
        std::process::exit(1);
    }
}

/// Logs go to stderr so they never mix with command output. `PLANNER_LOG` takes
/// the usual filter directives, e.g. `PLANNER_LOG=planner_core=debug`.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("PLANNER_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn handle_error(err: anyhow::Error) {
    let error_style = Style::new().red().bold();

    match err.downcast_ref::<CoreError>() {
        Some(CoreError::NotFound(s)) => {
            eprintln!("{} {}", "Error:".style(error_style), s);
        }
        Some(CoreError::InvalidInput(s)) => {
            eprintln!("{} Invalid input: {}", "Error:".style(error_style), s);
        }
        Some(CoreError::MalformedRule { rule, reason }) => {
            eprintln!(
                "{} Cannot read rule '{}': {}",
                "Error:".style(error_style),
                rule.yellow(),
                reason
            );
        }
        Some(CoreError::InvalidRule(s)) => {
            eprintln!("{} Invalid rule: {}", "Error:".style(error_style), s);
        }
        Some(CoreError::InvalidTimezone(s)) => {
            eprintln!(
                "{} Unknown timezone '{}'. Use IANA names like 'America/New_York'",
                "Error:".style(error_style),
                s.yellow()
            );
        }
        Some(CoreError::ReconciliationConflict { .. }) => {
            eprintln!("{} {} (run 'planner reconcile' and retry)", "Error:".style(error_style), err);
        }
        _ => eprintln!("{} {}", "Error:".style(error_style), err),
    }
}
