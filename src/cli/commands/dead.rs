//! Dead-letter command implementations.

use super::Context;
use crate::cli::args::{DeadCommands, OutputFormat};
use crate::error::SyncError;
use crate::output::{format_dead_letters, to_json};

/// Execute dead-letter subcommands.
///
/// # Errors
///
/// Returns an error if the store fails or the id is unknown.
pub fn dead(ctx: &Context, cmd: DeadCommands) -> Result<String, SyncError> {
    let mut queue = ctx.open_queue()?;

    match cmd {
        DeadCommands::List => format_dead_letters(&queue.dead_letters()?, ctx.format),
        DeadCommands::Retry { id } => {
            let request = queue.requeue_dead_letter(&id)?;
            match ctx.format {
                OutputFormat::Json => to_json(&request),
                OutputFormat::Pretty => Ok(format!(
                    "Requeued {} {} (ID: {})",
                    request.method, request.url, request.id
                )),
            }
        }
        DeadCommands::Purge { force } => {
            if !force {
                return Err(SyncError::Config(
                    "Use --force to delete all dead letters".to_string(),
                ));
            }
            let count = queue.purge_dead_letters()?;
            match ctx.format {
                OutputFormat::Json => to_json(&serde_json::json!({ "purged": count })),
                OutputFormat::Pretty => Ok(format!("Purged {count} dead letters")),
            }
        }
    }
}
