mod cli;
mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use commands::scaffold::Target;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries command output
    hookwarden_engine::init_logging();

    let cli = Cli::parse();

    // Handle init command early (doesn't need config)
    if let Commands::Init { path } = &cli.command {
        return commands::init::run_init(path);
    }

    let config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init { .. } => unreachable!(),
        Commands::Scaffold {
            event,
            workspace,
            global,
        } => {
            let target = if global {
                Target::Global
            } else {
                Target::Workspace(workspace)
            };
            commands::scaffold::execute(&event, target, &config)?;
        }
        Commands::List { workspaces } => {
            let roots = config::workspace_roots(&workspaces)?;
            commands::list::execute(&roots, &config)?;
        }
        Commands::Fire {
            event,
            workspaces,
            payload,
            timeout_ms,
        } => {
            let roots = config::workspace_roots(&workspaces)?;
            commands::fire::execute(&event, roots, payload.as_deref(), timeout_ms, &config).await?;
        }
    }

    Ok(())
}
