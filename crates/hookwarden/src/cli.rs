use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hookwarden")]
#[command(about = "hookwarden - lifecycle hooks for agent tasks", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file (defaults to ./hookwarden.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new config file
    Init {
        /// Path for new config file
        #[arg(default_value = "hookwarden.toml")]
        path: PathBuf,
    },
    /// Create a template hook script for an event
    Scaffold {
        /// Event name, e.g. PreToolUse
        event: String,
        /// Workspace root to add the hook to
        #[arg(long, default_value = ".", conflicts_with = "global")]
        workspace: PathBuf,
        /// Add the hook to the user-global hook directory instead
        #[arg(long)]
        global: bool,
    },
    /// Show which hooks would run for a workspace
    List {
        /// Workspace roots, in order (defaults to the current directory)
        #[arg(long = "workspace")]
        workspaces: Vec<PathBuf>,
    },
    /// Run the hooks for one event and print the aggregated outcome
    Fire {
        /// Event name, e.g. PreToolUse
        event: String,
        /// Workspace roots, in order (defaults to the current directory)
        #[arg(long = "workspace")]
        workspaces: Vec<PathBuf>,
        /// JSON object for the event payload
        #[arg(long)]
        payload: Option<String>,
        /// Override the per-hook timeout
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}
