use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "homestead", about = "Manage a Homestead VM through vagrant")]
pub struct Cli {
    /// Path to config file (default: ~/.config/homestead/homestead.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only show progress, not driver output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Auto, global = true)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Interactive on a terminal, plain otherwise
    Auto,
    Interactive,
    Plain,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Find the VM and show whether it is running
    Status,

    /// Start the VM (restarts it when already running)
    Up,

    /// Stop the VM
    Halt,

    /// Re-provision the VM
    Provision {
        /// Provision even when the VM is not flagged as stale
        #[arg(long)]
        force: bool,
    },

    /// Restart the VM and reload its configuration
    Reload,

    /// Flag the VM as needing re-provisioning
    Stale,

    /// Print the VM's site config
    Config,

    /// Check that the driver is installed
    Check,

    /// Show operation logs
    Log {
        /// Show the latest failed operation
        #[arg(long)]
        failed: bool,

        /// List all operation logs
        #[arg(long, conflicts_with = "failed")]
        all: bool,
    },
}
