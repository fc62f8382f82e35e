use anyhow::Result;
use planner_core::repository::Repository;

use crate::cli::DeleteCommand;
use crate::util::resolve_task;

pub async fn delete_task(repo: &impl Repository, command: DeleteCommand) -> Result<()> {
    let task = resolve_task(repo, &command.id).await?;
    repo.delete_task(task.id).await?;
    println!("Deleted task: '{}'", task.title);
    Ok(())
}
