//! routesale CLI - order lifecycle and offline sync from the terminal

mod cli;
mod commands;
mod error;

#[cfg(test)]
mod tests;

use clap::{CommandFactory, Parser};

use crate::cli::{Cli, Commands, QueueCommands, SyncCommands};
use crate::commands::common::Session;
use crate::commands::completions::run_completions;
use crate::commands::order::run_order;
use crate::commands::queue::{run_queue_clear, run_queue_enqueue, run_queue_flush, run_queue_list};
use crate::commands::sync::{run_sync_changes, run_sync_push};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "routesale=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    if let Commands::Completions { shell, output } = &command {
        return run_completions(*shell, output.as_deref());
    }

    let session = Session::resolve(cli.db_path, cli.config, cli.business, cli.user, cli.role)?;
    tracing::debug!(db_path = %session.db_path.display(), "Resolved session");

    match command {
        Commands::Sync { command } => match command {
            SyncCommands::Push { file } => run_sync_push(&session, file.as_deref())?,
            SyncCommands::Changes { since, limit } => {
                run_sync_changes(&session, since.as_deref(), limit)?;
            }
        },
        Commands::Order { command } => run_order(&session, command)?,
        Commands::Queue { command } => match command {
            QueueCommands::List { failed, json } => run_queue_list(&session, failed, json).await?,
            QueueCommands::Enqueue {
                entity,
                action,
                entity_id,
                file,
            } => {
                run_queue_enqueue(&session, &entity, &action, entity_id, file.as_deref()).await?;
            }
            QueueCommands::Flush { no_pull } => run_queue_flush(&session, !no_pull).await?,
            QueueCommands::Clear => run_queue_clear(&session).await?,
        },
        Commands::Completions { .. } => {}
    }

    Ok(())
}
